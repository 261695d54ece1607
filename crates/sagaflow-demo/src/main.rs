mod error;
mod output;
mod services;
mod workflow;

use std::process::ExitCode;

use clap::Parser;
use futures::future::try_join_all;
use sagaflow::{RollbackStatus, TransactionStatus, WorkflowResult};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::error::{CliError, IssueError};
use crate::output::{Format, RunReport};
use crate::services::{Faults, Issue, Services};
use crate::workflow::{NewIssue, StepName, create_issue_workflow};

const EXIT_REVERTED: u8 = 3;
const EXIT_ROLLBACK_INCOMPLETE: u8 = 4;

#[derive(Parser)]
#[command(name = "sagaflow-demo")]
#[command(about = "Run the create-issue saga against in-memory services", long_about = None)]
struct Cli {
    /// Title of the issue to create
    #[arg(long, default_value = "Crash when saving settings")]
    title: String,

    /// User the issue is assigned to
    #[arg(long)]
    assignee: Option<String>,

    /// Notify the assignee once the issue is created
    #[arg(long, requires = "assignee")]
    notify: bool,

    /// Make the forward phase of this step fail
    #[arg(long, value_enum, env = "SAGAFLOW_FAIL_AT")]
    fail_at: Option<StepName>,

    /// Make the compensation of this step fail
    #[arg(long, value_enum, env = "SAGAFLOW_FAIL_COMPENSATION")]
    fail_compensation: Option<StepName>,

    /// Number of runs started at the same time
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    concurrent_runs: u16,

    /// Log filter directives, e.g. `debug` or `sagaflow=trace`
    #[arg(long, env = "SAGAFLOW_LOG", default_value = "warn")]
    log_level: String,

    /// Report format
    #[arg(long, value_enum, default_value_t = Format::Plain)]
    format: Format,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_level) {
        print_error(&e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            print_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(directives: &str) -> Result<(), CliError> {
    let filter = EnvFilter::try_new(directives)?;
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()?;
    Ok(())
}

async fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let services = Services::default();
    let faults = Faults {
        fail_at: cli.fail_at,
        fail_compensation: cli.fail_compensation,
    };
    let runner = create_issue_workflow().bind(services.container(faults).into_shared());

    let handles = requests(&cli).map(|request| {
        let runner = runner.clone();
        tokio::spawn(async move { runner.run(request).await })
    });
    let results = try_join_all(handles).await?;
    info!(runs = results.len(), "all runs finished");

    let reports: Vec<RunReport> = results.iter().map(RunReport::new).collect();
    let rendered = cli.format.formatter().format(&reports, &services.totals())?;
    println!("{rendered}");

    Ok(exit_code(&results))
}

fn requests(cli: &Cli) -> impl Iterator<Item = NewIssue> + '_ {
    (1..=cli.concurrent_runs).map(move |n| NewIssue {
        title: if cli.concurrent_runs > 1 {
            format!("{} #{n}", cli.title)
        } else {
            cli.title.clone()
        },
        assignee: cli.assignee.clone(),
        notify: cli.notify,
    })
}

/// The worst outcome across all runs decides the exit code.
fn exit_code(results: &[WorkflowResult<Issue, IssueError>]) -> ExitCode {
    let worst = results
        .iter()
        .map(|result| match (result.transaction_status(), result.rollback_status()) {
            (TransactionStatus::Done, _) => 0,
            (TransactionStatus::Reverted, RollbackStatus::Incomplete) => EXIT_ROLLBACK_INCOMPLETE,
            (TransactionStatus::Reverted, _) => EXIT_REVERTED,
        })
        .max()
        .unwrap_or(0);
    ExitCode::from(worst)
}

fn print_error(error: &CliError) {
    eprintln!("error: {error}");

    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        eprintln!("caused by: {cause}");
        source = std::error::Error::source(cause);
    }
}

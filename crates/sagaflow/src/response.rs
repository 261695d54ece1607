/// What a step's forward operation hands back to the engine.
///
/// `output` flows to the caller of the step. `compensation_input` is stored
/// and handed to the step's compensation if the run is rolled back, which
/// lets rollback work from a small identifier instead of the full result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResponse<O, C = O> {
    output: O,
    compensation_input: C,
}

impl<O: Clone> StepResponse<O, O> {
    /// A response whose output doubles as the compensation input.
    #[must_use]
    pub fn new(output: O) -> Self {
        Self {
            compensation_input: output.clone(),
            output,
        }
    }
}

impl<O, C> StepResponse<O, C> {
    /// A response that hands `compensation_input` to rollback instead of the output.
    #[must_use]
    pub fn with_compensation_input(output: O, compensation_input: C) -> Self {
        Self {
            output,
            compensation_input,
        }
    }

    #[must_use]
    pub fn output(&self) -> &O {
        &self.output
    }

    #[must_use]
    pub fn compensation_input(&self) -> &C {
        &self.compensation_input
    }

    #[must_use]
    pub fn into_parts(self) -> (O, C) {
        (self.output, self.compensation_input)
    }
}

/// Final value produced by an orchestration function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowResponse<O>(O);

impl<O> WorkflowResponse<O> {
    #[must_use]
    pub fn new(output: O) -> Self {
        Self(output)
    }

    #[must_use]
    pub fn get(&self) -> &O {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> O {
        self.0
    }
}

impl<O> From<O> for WorkflowResponse<O> {
    fn from(output: O) -> Self {
        Self(output)
    }
}

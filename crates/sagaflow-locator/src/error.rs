use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResolveError {
    #[error("no service registered under key '{key}'")]
    NotRegistered { key: String },

    #[error("service '{key}' is not of the requested type '{expected}'")]
    TypeMismatch { key: String, expected: &'static str },
}

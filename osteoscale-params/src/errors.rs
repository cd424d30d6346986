use thiserror::Error;

/// Error type for parameter file handling.
#[derive(Error, Debug)]
pub enum ParamsError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid parameter file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Convenience type for `Result<T, ParamsError>`.
pub type ParamsResult<T> = Result<T, ParamsError>;

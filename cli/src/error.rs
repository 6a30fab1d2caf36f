use drivecord::DriveError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Drive(#[from] DriveError),
    #[error("{0}")]
    UnexpectedInput(String),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

pub type CliResult<T> = Result<T, CliError>;

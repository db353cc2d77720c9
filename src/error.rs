// ABOUTME: Error types with structured exit codes for CLI
// ABOUTME: Maps the export/import/sync failure taxonomy to specific exit codes

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    UserInput(String),

    #[error("{0}")]
    Precondition(String),

    #[error("No content matched the export filter")]
    NoContent,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Sync error for {target}: {message}")]
    RemoteSync { target: String, message: String },

    #[error("Repository error: {0}")]
    Persistence(String),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(String),
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::UserInput(_) => 2,
            Error::Precondition(_) | Error::NoContent => 3,
            Error::Network(_) => 4,
            Error::RemoteSync { .. } => 5,
            Error::Persistence(_) => 6,
            Error::Parse(_) => 7,
            Error::Filesystem(_) => 8,
            Error::Archive(_) => 9,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

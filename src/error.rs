/**
 * Error types shared by the device bridge, the chat index and the remediation loop
 */

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed (exit code {code:?}): {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Interrupted by user")]
    Cancelled,

    #[error("Unsupported media kind: {0}. Must be 'image' or 'video'")]
    UnsupportedKind(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

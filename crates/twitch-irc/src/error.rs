//! IRC codec error types.

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, IrcError>;

/// Errors that can occur while decoding IRC lines.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IrcError {
    /// The line was empty after trimming.
    #[error("Empty IRC line")]
    Empty,

    /// The line had a tag or prefix section but no command.
    #[error("Missing IRC command in line: {0}")]
    MissingCommand(String),

    /// A command was missing a parameter it requires.
    #[error("{command} is missing parameter {index}")]
    MissingParam { command: String, index: usize },
}

impl IrcError {
    pub fn missing_param(command: impl Into<String>, index: usize) -> Self {
        Self::MissingParam {
            command: command.into(),
            index,
        }
    }
}

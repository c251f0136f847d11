use crate::config::CommandConfigBuilderError;
use crate::result::ExecutionResult;
use thiserror::Error;

/// Error types for command execution.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("failed to launch '{program}': {source}")]
    LaunchFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("process exited with code {}", result.exit_code)]
    NonZeroExit { result: ExecutionResult },

    #[error("process wrote to standard error")]
    DirtyStderr { result: ExecutionResult },

    #[error("execution was cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl CommandError {
    /// The full result attached to a validation failure, for diagnostics.
    pub fn result(&self) -> Option<&ExecutionResult> {
        match self {
            CommandError::NonZeroExit { result } | CommandError::DirtyStderr { result } => {
                Some(result)
            }
            _ => None,
        }
    }

    /// Whether the run itself completed and only the outcome was rejected.
    pub fn is_validation_failure(&self) -> bool {
        matches!(
            self,
            CommandError::NonZeroExit { .. } | CommandError::DirtyStderr { .. }
        )
    }
}

impl From<CommandConfigBuilderError> for CommandError {
    fn from(err: CommandConfigBuilderError) -> Self {
        CommandError::InvalidConfig(err.to_string())
    }
}

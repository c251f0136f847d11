use crate::error::CommandError;
use crate::result::ExecutionResult;

/// Post-completion validation policy.
///
/// Converts an otherwise-successful result into a failure when the enabled
/// checks reject it. The exit-code check runs first and short-circuits, so a
/// run that fails both checks reports only the exit-code failure.
pub fn validate(
    result: ExecutionResult,
    validate_exit_code: bool,
    validate_stderr: bool,
) -> Result<ExecutionResult, CommandError> {
    if validate_exit_code && result.exit_code != 0 {
        return Err(CommandError::NonZeroExit { result });
    }
    if validate_stderr && !result.standard_error.trim().is_empty() {
        return Err(CommandError::DirtyStderr { result });
    }
    Ok(result)
}

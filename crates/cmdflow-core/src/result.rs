use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable outcome record of one completed execution.
///
/// Created exactly once after process exit and stream drain; a non-zero exit
/// code here is data, not an error. Validation policy decides afterwards
/// whether it becomes one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub standard_output: String,
    pub standard_error: String,
    pub started_at: DateTime<Utc>,
    pub exited_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Wall-clock time between start and exit.
    pub fn duration(&self) -> chrono::Duration {
        self.exited_at - self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExecutionResult {
        let started_at = Utc::now();
        ExecutionResult {
            exit_code: 0,
            standard_output: "hello\n".to_string(),
            standard_error: String::new(),
            started_at,
            exited_at: started_at + chrono::Duration::milliseconds(12),
        }
    }

    #[test]
    fn success_tracks_exit_code() {
        let mut result = sample();
        assert!(result.success());
        result.exit_code = 2;
        assert!(!result.success());
    }

    #[test]
    fn duration_is_exit_minus_start() {
        let result = sample();
        assert_eq!(result.duration(), chrono::Duration::milliseconds(12));
    }

    #[test]
    fn serde_round_trip() {
        let result = sample();
        let json = serde_json::to_string(&result).unwrap();
        let back: ExecutionResult = serde_json::from_str(&json).unwrap();
        assert_eq!(result, back);
    }
}

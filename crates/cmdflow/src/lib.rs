//! cmdflow - run external executables with captured output, cancellation,
//! and post-hoc validation
//!
//! ```no_run
//! use cmdflow::{CommandConfig, CommandExecutor};
//!
//! # async fn demo() -> Result<(), cmdflow::CommandError> {
//! let config = CommandConfig::builder()
//!     .program("git")
//!     .args(["status", "--short"])
//!     .build()?;
//!
//! let result = CommandExecutor::new(config).execute().await?;
//! println!("{}", result.standard_output);
//! # Ok(())
//! # }
//! ```

mod executor;

pub use executor::CommandExecutor;

// Re-export core functionality
pub use cmdflow_core::*;

//! cmdflow core - primitives for supervised child-process execution
//!
//! This crate provides the configuration, error, and result types together
//! with the two building blocks everything else is assembled from: the
//! [`CompletionSignal`] rendezvous primitive and the [`ProcessSupervisor`]
//! that owns one child process end-to-end.

mod config;
mod error;
mod result;
mod signal;
mod supervisor;
mod validation;

pub use config::*;
pub use error::*;
pub use result::*;
pub use signal::*;
pub use supervisor::*;
pub use validation::*;

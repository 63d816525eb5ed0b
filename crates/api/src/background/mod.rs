//! Background tasks and scheduled jobs.
//!
//! Each submodule provides a long-running async task intended to be spawned
//! via `tokio::spawn`. All tasks accept a [`CancellationToken`] for graceful
//! shutdown.
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod retention;

pub use retention::{RetentionSweeper, SweepReport};

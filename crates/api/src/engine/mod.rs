//! Job lifecycle engine.
//!
//! Drives one conversion job from `pending` to a terminal state, persisting
//! each transition before it is broadcast to observers.

pub mod lifecycle;

pub use lifecycle::{ConversionError, JobLifecycle};

//! Live observers of job-status events.
//!
//! Provides the observer registry, the job event wire format, heartbeat
//! monitoring, and the HTTP upgrade handler used by Axum routes.

pub mod event;
mod handler;
mod heartbeat;
pub mod registry;

pub use event::JobEvent;
pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
pub use registry::{BroadcastReport, ObserverId, ObserverRegistry, ObserverSink, SinkError};

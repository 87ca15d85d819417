//! Per-job push-streams.
//!
//! A [`StreamOutputAdapter`] moves through `open → draining → closed` and
//! never closes its transport before the terminal `stream_end` frame has been
//! flushed. The [`StreamManager`] keeps at most one active stream per job.

pub mod adapter;
pub mod error;
pub mod health;
pub mod manager;
pub mod transport;

#[cfg(test)]
mod tests;

pub use adapter::{StreamOutputAdapter, StreamSettings};
pub use error::{StreamError, StreamResult};
pub use health::HealthLedger;
pub use manager::StreamManager;
pub use transport::{sse_body_stream, SseTransport, StreamTransport};

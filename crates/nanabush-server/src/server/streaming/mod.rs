//! Chunked bidirectional translation streams.
//!
//! - [`session`] - Transport-independent state machine for one exchange.
//! - [`coordinator`] - Drives a session from an inbound chunk stream to the
//!   response channel.

pub mod coordinator;
pub mod session;

//! gRPC service implementation and call lifecycle.
//!
//! ## Structure
//!
//! - [`handler`] - gRPC service entry point (`NanabushService`).
//! - [`state`] - Call admission and in-flight accounting for shutdown.

pub mod handler;
pub mod state;

//! Shared protocol bindings, error definitions and constants.
//!
//! ## Submodules
//!
//! - [`error`] - Service error type and its `tonic::Status` mapping.
//! - [`types`] - Default lifecycle timings and placeholder markers.
//! - [`proto`] - Generated `nanabush.v1` messages and service bindings.

pub mod error;
pub mod types;

pub use error::{Error, Result};

/// gRPC service and message definitions generated from
/// `proto/nanabush/v1/translation.proto`.
///
/// ## Service
///
/// - `RegisterClient` / `Heartbeat` - client session lifecycle.
/// - `CheckTitle` - pre-flight readiness probe.
/// - `Translate` - title or full document translation.
/// - `TranslateStream` - bidirectional chunked translation.
#[allow(clippy::all, clippy::pedantic)]
pub mod proto {
    tonic::include_proto!("nanabush.v1");

    /// Encoded descriptor set for `tonic-reflection`.
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("nanabush_descriptor");
}

//! # Shared Lifecycle Timings and Placeholder Markers
//!
//! Defaults for the client session lifecycle and the markers produced by the
//! placeholder translation policy. The server exposes every timing as a
//! runtime flag; these values are what it falls back to.
//!
//! ## Session timings
//!
//! - [`HEARTBEAT_INTERVAL`] - how often clients are told to heartbeat
//! - [`REGISTRATION_TTL`] - how long a registration stays valid
//! - [`MAX_IDLE`] - idle window after which silent clients are reaped
//!
//! ## Maintenance timings
//!
//! - [`CLEANUP_INTERVAL`] - how often the idle sweep runs
//! - [`METRICS_INTERVAL`] - how often registry metrics are logged
//! - [`SHUTDOWN_TIMEOUT`] - hard deadline for draining in-flight calls
//!
//! > ⚠️ The placeholder markers are not translations. They only exist so the
//! > service is operable before a real inference backend is wired in.

use core::time::Duration;

/// Interval clients are asked to heartbeat at.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Validity window of a registration, measured from registration time.
pub const REGISTRATION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Sessions without a heartbeat for longer than this are removed by cleanup.
pub const MAX_IDLE: Duration = Duration::from_secs(15 * 60);

/// Period of the idle-session cleanup task.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Period of the registry metrics logging task.
pub const METRICS_INTERVAL: Duration = Duration::from_secs(60);

/// Grace period given to in-flight calls during shutdown.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound accepted for any configured timing. Keeps deadline and
/// expiry arithmetic far away from `Instant`/`SystemTime` overflow.
pub const MAX_TIMING: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Lower bound of the title-check time estimate, in seconds.
pub const MIN_ESTIMATE_SECS: i32 = 5;

/// Upper bound of the title-check time estimate, in seconds.
pub const MAX_ESTIMATE_SECS: i32 = 60;

/// Suffix appended to titles by the placeholder backend.
pub const PLACEHOLDER_TITLE_MARKER: &str = " [translated]";

/// Content of the terminal chunk of a translation stream.
pub const STREAM_COMPLETED_MARKER: &str = "[Stream completed]";

/// Bucket used for sessions with an empty namespace or version.
pub const UNKNOWN_BUCKET: &str = "unknown";

use anyhow::bail;
use clap::{Parser, ValueEnum};
use core::time::Duration;
use nanabush_core::types;

/// Translation engine selected at startup.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Non-production stand-in that echoes input with a marker.
    Placeholder,
}

/// Runtime configuration for the `nanabush-server` binary.
///
/// These settings control the client session lifecycle, the background
/// maintenance cadence and shutdown behavior. All values are parsed from CLI
/// arguments or environment variables (a `.env` file is loaded first), with
/// defaults matching the documented protocol behavior.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "nanabush-server",
    version,
    about = "A gRPC service for dispatching translation requests"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix
    /// socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/nanabush.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a
    /// file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Interval, in seconds, clients are told to heartbeat at.
    ///
    /// Environment variable: `HEARTBEAT_INTERVAL_SECS`
    #[arg(long, env = "HEARTBEAT_INTERVAL_SECS", default_value_t = types::HEARTBEAT_INTERVAL.as_secs())]
    pub heartbeat_interval_secs: u64,

    /// How long, in seconds, a registration stays valid. Heartbeats after
    /// this window evict the session and ask the client to register again.
    ///
    /// Environment variable: `REGISTRATION_TTL_SECS`
    #[arg(long, env = "REGISTRATION_TTL_SECS", default_value_t = types::REGISTRATION_TTL.as_secs())]
    pub registration_ttl_secs: u64,

    /// Sessions without a heartbeat for this many seconds are removed by the
    /// cleanup task.
    ///
    /// Environment variable: `MAX_IDLE_SECS`
    #[arg(long, env = "MAX_IDLE_SECS", default_value_t = types::MAX_IDLE.as_secs())]
    pub max_idle_secs: u64,

    /// Period, in seconds, of the idle-session cleanup task.
    ///
    /// Environment variable: `CLEANUP_INTERVAL_SECS`
    #[arg(long, env = "CLEANUP_INTERVAL_SECS", default_value_t = types::CLEANUP_INTERVAL.as_secs())]
    pub cleanup_interval_secs: u64,

    /// Period, in seconds, of the registry metrics log.
    ///
    /// Environment variable: `METRICS_INTERVAL_SECS`
    #[arg(long, env = "METRICS_INTERVAL_SECS", default_value_t = types::METRICS_INTERVAL.as_secs())]
    pub metrics_interval_secs: u64,

    /// Seconds in-flight calls get to finish once shutdown starts. The server
    /// is stopped forcibly afterwards.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECS`
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = types::SHUTDOWN_TIMEOUT.as_secs())]
    pub shutdown_timeout_secs: u64,

    /// Server-side deadline, in seconds, for a single call. Also caps how long
    /// a backend translation may run.
    ///
    /// Environment variable: `REQUEST_TIMEOUT_SECS`
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 300)]
    pub request_timeout_secs: u64,

    /// Capacity of the response buffer of a translation stream.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 8)]
    pub stream_buffer_size: usize,

    /// Translation backend.
    ///
    /// Environment variable: `TRANSLATION_BACKEND`
    #[arg(long, env = "TRANSLATION_BACKEND", value_enum, default_value_t = BackendKind::Placeholder)]
    pub backend: BackendKind,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub heartbeat_interval: Duration,
    pub registration_ttl: Duration,
    pub max_idle: Duration,
    pub cleanup_interval: Duration,
    pub metrics_interval: Duration,
    pub shutdown_timeout: Duration,
    pub request_timeout: Duration,
    pub stream_buffer_size: usize,
    pub backend: BackendKind,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        for (name, value) in [
            ("HEARTBEAT_INTERVAL_SECS", args.heartbeat_interval_secs),
            ("REGISTRATION_TTL_SECS", args.registration_ttl_secs),
            ("MAX_IDLE_SECS", args.max_idle_secs),
            ("CLEANUP_INTERVAL_SECS", args.cleanup_interval_secs),
            ("METRICS_INTERVAL_SECS", args.metrics_interval_secs),
            ("SHUTDOWN_TIMEOUT_SECS", args.shutdown_timeout_secs),
            ("REQUEST_TIMEOUT_SECS", args.request_timeout_secs),
        ] {
            if value == 0 {
                bail!("{name} must be greater than 0");
            }
            if value > types::MAX_TIMING.as_secs() {
                bail!(
                    "{name} ({value}) must not exceed {} seconds",
                    types::MAX_TIMING.as_secs()
                );
            }
        }

        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        // The reported heartbeat interval goes out as an int32.
        if i32::try_from(args.heartbeat_interval_secs).is_err() {
            bail!(
                "HEARTBEAT_INTERVAL_SECS ({}) is too large",
                args.heartbeat_interval_secs
            );
        }

        if args.max_idle_secs < args.heartbeat_interval_secs {
            bail!(
                "MAX_IDLE_SECS ({}) must not be shorter than HEARTBEAT_INTERVAL_SECS ({})",
                args.max_idle_secs,
                args.heartbeat_interval_secs
            );
        }

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            heartbeat_interval: Duration::from_secs(args.heartbeat_interval_secs),
            registration_ttl: Duration::from_secs(args.registration_ttl_secs),
            max_idle: Duration::from_secs(args.max_idle_secs),
            cleanup_interval: Duration::from_secs(args.cleanup_interval_secs),
            metrics_interval: Duration::from_secs(args.metrics_interval_secs),
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
            request_timeout: Duration::from_secs(args.request_timeout_secs),
            stream_buffer_size: args.stream_buffer_size,
            backend: args.backend,
        })
    }
}

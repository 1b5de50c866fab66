pub mod backend;
pub mod config;
pub mod dispatch;
pub mod maintenance;
pub mod metrics;
pub mod registry;
pub mod service;
pub mod streaming;
pub mod telemetry;

//! Periodic registry maintenance.
//!
//! Two background tasks run independently of any call:
//!
//! - **cleanup** - every `cleanup_interval`, removes sessions idle for longer
//!   than `max_idle`.
//! - **metrics** - every `metrics_interval`, aggregates a registry snapshot
//!   and logs it.
//!
//! Both share one [`CancellationToken`] and are stopped and joined together by
//! [`Maintenance::shutdown`].

use crate::server::{
    metrics::aggregate,
    registry::{ClientRegistry, Clock},
    telemetry::record_registered_clients,
};
use core::time::Duration;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

/// Number of individual clients included in each metrics log.
const CLIENTS_LOGGED: usize = 5;

#[derive(Clone, Copy, Debug)]
pub struct MaintenanceSettings {
    pub cleanup_interval: Duration,
    pub max_idle: Duration,
    pub metrics_interval: Duration,
}

/// Handles to the running maintenance tasks.
pub struct Maintenance {
    token: CancellationToken,
    cleanup: JoinHandle<()>,
    metrics: JoinHandle<()>,
}

impl Maintenance {
    /// Spawns the cleanup and metrics tasks on the current runtime.
    pub fn spawn<C: Clock + 'static>(
        registry: Arc<ClientRegistry<C>>,
        settings: MaintenanceSettings,
    ) -> Self {
        let token = CancellationToken::new();

        let cleanup = tokio::spawn(every(
            settings.cleanup_interval,
            token.clone(),
            {
                let registry = Arc::clone(&registry);
                move || {
                    registry.cleanup(settings.max_idle);
                    record_registered_clients(registry.count());
                }
            },
        ));
        tracing::info!(
            interval_secs = settings.cleanup_interval.as_secs(),
            max_idle_secs = settings.max_idle.as_secs(),
            "Started client cleanup task"
        );

        let metrics = tokio::spawn(every(settings.metrics_interval, token.clone(), move || {
            log_registry_metrics(&registry);
        }));
        tracing::info!(
            interval_secs = settings.metrics_interval.as_secs(),
            "Started metrics logging task"
        );

        Self {
            token,
            cleanup,
            metrics,
        }
    }

    /// Asks both tasks to stop without waiting for them.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancels both tasks and waits for them to exit.
    pub async fn shutdown(self) {
        self.cancel();
        for (name, handle) in [("cleanup", self.cleanup), ("metrics", self.metrics)] {
            if let Err(e) = handle.await {
                tracing::error!("Maintenance task {name} ended abnormally: {e}");
            }
        }
        tracing::debug!("Maintenance tasks stopped");
    }
}

/// Runs `tick` every `period` until `token` is cancelled. The first run
/// happens one full period after start.
async fn every<F>(period: Duration, token: CancellationToken, mut tick: F)
where
    F: FnMut() + Send + 'static,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            _ = ticker.tick() => tick(),
        }
    }
}

/// Logs an aggregate of the current registry contents.
pub fn log_registry_metrics<C: Clock>(registry: &ClientRegistry<C>) {
    let clients = registry.snapshot();
    let metrics = aggregate(&clients);
    record_registered_clients(metrics.total_clients);
    tracing::info!(total_registered = metrics.total_clients, "Client metrics");

    let (Some(oldest), Some(newest)) = (metrics.oldest_heartbeat, metrics.newest_heartbeat) else {
        return;
    };

    for (namespace, count) in &metrics.clients_by_namespace {
        tracing::info!(namespace = %namespace, count, "  By namespace");
    }
    for (version, count) in &metrics.clients_by_version {
        tracing::info!(version = %version, count, "  By version");
    }

    let now = registry.now();
    tracing::info!(
        oldest_secs_ago = secs_since(now, oldest),
        newest_secs_ago = secs_since(now, newest),
        "  Heartbeat stats"
    );

    for (i, client) in clients.iter().take(CLIENTS_LOGGED).enumerate() {
        tracing::info!(
            id = %client.id,
            name = %client.name,
            last_heartbeat_secs_ago = secs_since(now, client.last_heartbeat),
            "  Client[{i}]"
        );
    }
    if clients.len() > CLIENTS_LOGGED {
        tracing::info!("  ... and {} more clients", clients.len() - CLIENTS_LOGGED);
    }
}

fn secs_since(now: SystemTime, then: SystemTime) -> u64 {
    now.duration_since(then).unwrap_or_default().as_secs()
}

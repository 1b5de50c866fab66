#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use core::time::Duration;
use futures::Stream;
use nanabush_core::proto::{
    FILE_DESCRIPTOR_SET, translation_service_server::TranslationServiceServer,
};
use server::backend::{PlaceholderBackend, TranslatorBackend};
use server::config::{BackendKind, CliArgs, ServerConfig};
use server::dispatch::Dispatcher;
use server::maintenance::{Maintenance, MaintenanceSettings};
use server::registry::{ClientRegistry, SessionPolicy};
use server::service::handler::NanabushService;
use server::telemetry::{TelemetryProviders, init_telemetry};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::oneshot;
use tokio::time::{Instant, sleep_until};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::server::Connected;
use tonic::{codec::CompressionEncoding, transport::Server};
use tonic_health::server::HealthReporter;
use tonic_reflection::server::Builder;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;

    if config.uds {
        #[cfg(unix)]
        {
            use tokio::net::UnixListener;
            use tokio_stream::wrappers::UnixListenerStream;
            let uds_path = config.server_addr.clone();
            let uds = UnixListener::bind(&uds_path)?;
            let incoming = UnixListenerStream::new(uds);
            log_startup_info(&uds_path, &config);
            let res = run_server_with_incoming(providers, incoming, config).await;
            // Best effort; a panic may still leave the socket file behind.
            let _ = std::fs::remove_file(&uds_path);
            res
        }
        #[cfg(not(unix))]
        {
            anyhow::bail!("Unix domain sockets are not supported on this platform");
        }
    } else {
        let tcp_path = config.server_addr.clone();
        let tcp = TcpListener::bind(&tcp_path).await?;
        let incoming = TcpListenerStream::new(tcp);
        log_startup_info(&tcp_path, &config);
        run_server_with_incoming(providers, incoming, config).await
    }
}

async fn run_server_with_incoming<I, IO, IE>(
    providers: TelemetryProviders,
    incoming: I,
    config: ServerConfig,
) -> anyhow::Result<()>
where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<tower::BoxError>,
{
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<TranslationServiceServer<NanabushService>>()
        .await;

    let registry = Arc::new(ClientRegistry::new(SessionPolicy {
        heartbeat_interval: config.heartbeat_interval,
        registration_ttl: config.registration_ttl,
    }));
    let service = NanabushService::new(
        Arc::clone(&registry),
        Dispatcher::new(select_backend(config.backend)),
        config.stream_buffer_size,
    );
    let maintenance = Maintenance::spawn(
        registry,
        MaintenanceSettings {
            cleanup_interval: config.cleanup_interval,
            max_idle: config.max_idle,
            metrics_interval: config.metrics_interval,
        },
    );

    let reflection = Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    let (deadline_tx, deadline_rx) = oneshot::channel();
    let serve = Server::builder()
        .accept_http1(true)
        .http2_adaptive_window(Some(true))
        .timeout(config.request_timeout)
        .layer(
            ServiceBuilder::new()
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(GrpcWebLayer::new()),
        )
        .add_service(health_service)
        .add_service(reflection)
        .add_service(build_translation_service(service.clone()))
        .serve_with_incoming_shutdown(
            incoming,
            shutdown_signal(
                async {
                    match wait_for_signal().await {
                        Ok(name) => tracing::info!("Received {name} signal"),
                        Err(e) => tracing::error!("Failed to listen for shutdown signals: {e}"),
                    }
                },
                &service,
                &maintenance,
                health_reporter,
                config.shutdown_timeout,
                deadline_tx,
            ),
        );

    // Graceful shutdown waits for open connections; past the deadline the
    // server future is dropped, which closes them.
    let result = tokio::select! {
        res = serve => res.map_err(anyhow::Error::from),
        () = hard_deadline(deadline_rx) => {
            tracing::warn!("Graceful shutdown timed out, closing remaining connections");
            Ok(())
        }
    };

    maintenance.shutdown().await;
    shutdown_telemetry(providers);

    if result.is_ok() {
        tracing::info!("Service shut down successfully");
    }
    result
}

fn select_backend(kind: BackendKind) -> Arc<dyn TranslatorBackend> {
    match kind {
        BackendKind::Placeholder => {
            tracing::warn!("Using placeholder translation backend; output is not translated");
            Arc::new(PlaceholderBackend)
        }
    }
}

fn log_startup_info(addr: &str, config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting translation service on {} with full config: {:#?}",
            addr,
            config
        );
    } else {
        tracing::info!(
            "Starting translation service on {} (heartbeat {}s, backend {:?})",
            addr,
            config.heartbeat_interval.as_secs(),
            config.backend
        );
    }
}

fn build_translation_service(service: NanabushService) -> TranslationServiceServer<NanabushService> {
    TranslationServiceServer::new(service)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
}

/// Waits for `trigger`, then stops the service in order. Resolves once every
/// in-flight call finished or `grace` ran out.
async fn shutdown_signal(
    trigger: impl Future<Output = ()>,
    service: &NanabushService,
    maintenance: &Maintenance,
    health_reporter: HealthReporter,
    grace: Duration,
    deadline_tx: oneshot::Sender<Instant>,
) {
    trigger.await;

    tracing::info!("Shutdown signal received, terminating gracefully...");
    let deadline = Instant::now() + grace;
    let _ = deadline_tx.send(deadline);

    // 1. Publish the status and refuse new calls
    health_reporter
        .set_not_serving::<TranslationServiceServer<NanabushService>>()
        .await;
    service.begin_shutdown();

    // 2. Stop periodic maintenance
    maintenance.cancel();

    // 3. Let in-flight calls finish
    if service.drain(deadline).await {
        tracing::info!("All in-flight calls completed");
    }
}

/// Resolves once shutdown has started and its deadline has passed. Never
/// resolves if shutdown never starts.
async fn hard_deadline(deadline_rx: oneshot::Receiver<Instant>) {
    match deadline_rx.await {
        Ok(deadline) => sleep_until(deadline).await,
        Err(_) => std::future::pending().await,
    }
}

async fn wait_for_signal() -> anyhow::Result<&'static str> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            res = signal::ctrl_c() => res.map(|()| "Ctrl+C").map_err(Into::into),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        Ok("Ctrl+C")
    }
}

fn shutdown_telemetry(_providers: TelemetryProviders) {
    #[cfg(feature = "otel")]
    {
        if let Err(err) = _providers.tracer_provider.force_flush() {
            eprintln!("Error flushing traces: {:#?}", err);
        }
        if let Err(err) = _providers.tracer_provider.shutdown() {
            eprintln!("Error shutting down tracer: {:#?}", err);
        }
    }

    #[cfg(feature = "metrics")]
    {
        if let Err(err) = _providers.meter_provider.force_flush() {
            eprintln!("Error flushing metrics: {:#?}", err);
        }
        if let Err(err) = _providers.meter_provider.shutdown() {
            eprintln!("Error shutting down meter: {:#?}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nanabush_core::proto::{HeartbeatRequest, translation_service_server::TranslationService};
    use tokio::time::sleep;
    use tonic::server::NamedService;
    use tonic::{Code, Request};
    use tonic_health::pb::{
        HealthCheckRequest, health_check_response::ServingStatus, health_server::Health,
    };
    use tonic_health::server::HealthService;

    const GRACE: Duration = Duration::from_secs(30);

    fn components() -> (NanabushService, Maintenance) {
        let registry = Arc::new(ClientRegistry::new(SessionPolicy::default()));
        let service = NanabushService::new(
            Arc::clone(&registry),
            Dispatcher::new(Arc::new(PlaceholderBackend)),
            8,
        );
        let maintenance = Maintenance::spawn(
            registry,
            MaintenanceSettings {
                cleanup_interval: Duration::from_secs(300),
                max_idle: Duration::from_secs(900),
                metrics_interval: Duration::from_secs(60),
            },
        );
        (service, maintenance)
    }

    async fn health_status(health: &HealthService) -> i32 {
        health
            .check(Request::new(HealthCheckRequest {
                service: <TranslationServiceServer<NanabushService> as NamedService>::NAME.into(),
            }))
            .await
            .unwrap()
            .into_inner()
            .status
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flips_health_and_gives_up_after_grace() {
        let (service, maintenance) = components();
        let reporter = HealthReporter::new();
        reporter
            .set_serving::<TranslationServiceServer<NanabushService>>()
            .await;
        let health = HealthService::from_health_reporter(reporter.clone());
        assert_eq!(health_status(&health).await, ServingStatus::Serving as i32);

        // A call that never finishes.
        let guard = service.admit("translate").unwrap();

        let (trigger_tx, trigger_rx) = oneshot::channel::<()>();
        let (deadline_tx, deadline_rx) = oneshot::channel();
        let start = Instant::now();

        let shutdown = async {
            shutdown_signal(
                async {
                    let _ = trigger_rx.await;
                },
                &service,
                &maintenance,
                reporter,
                GRACE,
                deadline_tx,
            )
            .await;
            Instant::now()
        };
        let deadline = async {
            hard_deadline(deadline_rx).await;
            Instant::now()
        };
        let observe = async {
            // Nothing changes until the trigger fires.
            sleep(Duration::from_secs(3600)).await;
            assert_eq!(health_status(&health).await, ServingStatus::Serving as i32);

            let fired_at = Instant::now();
            trigger_tx.send(()).unwrap();
            sleep(Duration::from_secs(1)).await;

            assert_eq!(health_status(&health).await, ServingStatus::NotServing as i32);
            let status = service
                .heartbeat(Request::new(HeartbeatRequest {
                    client_id: "client-1".into(),
                    client_name: "late".into(),
                }))
                .await
                .unwrap_err();
            assert_eq!(status.code(), Code::Unavailable);
            fired_at
        };

        let (drained_at, hard_at, fired_at) = tokio::join!(shutdown, deadline, observe);
        assert!(fired_at >= start + Duration::from_secs(3600));
        // The held call keeps drain busy until the grace period is spent.
        assert!(drained_at >= fired_at + GRACE);
        assert!(hard_at >= fired_at + GRACE);
        assert!(hard_at < fired_at + GRACE + Duration::from_secs(1));

        drop(guard);
        maintenance.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_returns_early_once_calls_finish() {
        let (service, maintenance) = components();
        let guard = service.admit("translate").unwrap();
        let (deadline_tx, _deadline_rx) = oneshot::channel();

        tokio::spawn(async move {
            sleep(Duration::from_secs(2)).await;
            drop(guard);
        });

        let start = Instant::now();
        shutdown_signal(
            async {},
            &service,
            &maintenance,
            HealthReporter::new(),
            GRACE,
            deadline_tx,
        )
        .await;
        assert!(Instant::now() < start + GRACE);

        maintenance.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn hard_deadline_never_fires_without_shutdown() {
        let (deadline_tx, deadline_rx) = oneshot::channel::<Instant>();
        drop(deadline_tx);
        let res = tokio::time::timeout(Duration::from_secs(3600), hard_deadline(deadline_rx)).await;
        assert!(res.is_err());
    }
}

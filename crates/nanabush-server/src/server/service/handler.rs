//! gRPC service implementation for translation dispatch.
//!
//! This module defines [`NanabushService`], the concrete implementation of the
//! [`TranslationService`] gRPC service defined in the protobuf schema.
//!
//! ## Responsibilities
//!
//! - Register clients and answer their heartbeats through the
//!   [`ClientRegistry`].
//! - Hand title checks and translations to the [`Dispatcher`].
//! - Drive chunked translation streams via [`feed_chunks`].
//! - Refuse new calls once shutdown has begun and keep admitted calls counted
//!   until they finish.

use crate::server::{
    dispatch::Dispatcher,
    registry::{ClientRegistry, RegisterParams},
    service::state::{CallGuard, ServiceState},
    streaming::coordinator::feed_chunks,
    telemetry::{
        decrement_streams_inflight, increment_request_errors, increment_requests,
        increment_streams_inflight, record_registered_clients, record_stream_duration,
    },
};
use core::pin::Pin;
use nanabush_core::{
    Error,
    proto::{
        HeartbeatRequest, HeartbeatResponse, RegisterClientRequest, RegisterClientResponse,
        TitleCheckRequest, TitleCheckResponse, TranslateChunk, TranslateRequest,
        TranslateResponse, translation_service_server::TranslationService,
    },
};
use prost_types::Timestamp;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tonic::{Request, Response, Status, Streaming};
use tracing::Instrument;

/// gRPC front end of the translation dispatch service.
///
/// Cheap to clone; all clones share the same registry and admission state.
#[derive(Clone)]
pub struct NanabushService {
    registry: Arc<ClientRegistry>,
    dispatcher: Dispatcher,
    state: Arc<ServiceState>,
    stream_buffer_size: usize,
}

impl NanabushService {
    pub fn new(
        registry: Arc<ClientRegistry>,
        dispatcher: Dispatcher,
        stream_buffer_size: usize,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            state: Arc::new(ServiceState::default()),
            stream_buffer_size,
        }
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Stops admitting calls. New calls fail with `UNAVAILABLE`; calls already
    /// running continue until they finish or [`drain`] gives up.
    ///
    /// [`drain`]: NanabushService::drain
    pub fn begin_shutdown(&self) {
        self.state.begin_shutdown();
        tracing::info!(inflight = self.state.inflight(), "No longer accepting calls");
    }

    /// Waits for in-flight calls until `deadline`. Returns whether all of them
    /// finished in time.
    pub async fn drain(&self, deadline: tokio::time::Instant) -> bool {
        let drained = self.state.drain(deadline).await;
        if !drained {
            tracing::warn!(
                inflight = self.state.inflight(),
                "Shutdown deadline reached with calls still in flight"
            );
        }
        drained
    }

    /// Counts one call of `rpc` as in flight, or refuses it during shutdown.
    pub(crate) fn admit(&self, rpc: &'static str) -> Result<CallGuard, Status> {
        increment_requests(rpc);
        self.state.admit().map_err(|e| {
            increment_request_errors(rpc);
            tracing::debug!(rpc, "Refusing call during shutdown");
            Status::from(e)
        })
    }
}

/// Converts a handler result into a gRPC response, counting failures.
fn respond<T>(rpc: &'static str, res: Result<T, Error>) -> Result<Response<T>, Status> {
    res.map(Response::new).map_err(|e| {
        increment_request_errors(rpc);
        tracing::warn!(rpc, "Call failed: {e}");
        Status::from(e)
    })
}

fn heartbeat_interval_secs(registry: &ClientRegistry) -> i32 {
    // Bounded at startup; see `ServerConfig`.
    i32::try_from(registry.policy().heartbeat_interval.as_secs()).unwrap_or(i32::MAX)
}

#[tonic::async_trait]
impl TranslationService for NanabushService {
    type TranslateStreamStream = Pin<Box<dyn Stream<Item = Result<TranslateChunk, Status>> + Send>>;

    #[tracing::instrument(skip_all, fields(client_name = %req.get_ref().client_name))]
    async fn register_client(
        &self,
        req: Request<RegisterClientRequest>,
    ) -> Result<Response<RegisterClientResponse>, Status> {
        const RPC: &str = "register_client";
        let _guard = self.admit(RPC)?;

        let req = req.into_inner();
        let name = req.client_name.clone();
        let res = self
            .registry
            .register(RegisterParams {
                name: req.client_name,
                version: req.client_version,
                namespace: req.namespace,
                metadata: req.metadata,
            })
            .map(|registration| {
                record_registered_clients(self.registry.count());
                RegisterClientResponse {
                    client_id: registration.session_id,
                    success: true,
                    message: format!("Client \"{name}\" registered successfully"),
                    heartbeat_interval_seconds: heartbeat_interval_secs(&self.registry),
                    expires_at: Some(Timestamp::from(registration.expires_at)),
                }
            });

        respond(RPC, res)
    }

    #[tracing::instrument(skip_all, fields(client_id = %req.get_ref().client_id))]
    async fn heartbeat(
        &self,
        req: Request<HeartbeatRequest>,
    ) -> Result<Response<HeartbeatResponse>, Status> {
        const RPC: &str = "heartbeat";
        let _guard = self.admit(RPC)?;

        let req = req.into_inner();
        let res = self
            .registry
            .heartbeat(&req.client_id, &req.client_name)
            .map(|outcome| HeartbeatResponse {
                success: outcome.accepted(),
                message: outcome.message().to_string(),
                received_at: Some(Timestamp::from(self.registry.now())),
                heartbeat_interval_seconds: heartbeat_interval_secs(&self.registry),
                re_register_required: outcome.re_register_required(),
            });

        respond(RPC, res)
    }

    #[tracing::instrument(skip_all, fields(language_tag = %req.get_ref().language_tag))]
    async fn check_title(
        &self,
        req: Request<TitleCheckRequest>,
    ) -> Result<Response<TitleCheckResponse>, Status> {
        const RPC: &str = "check_title";
        let _guard = self.admit(RPC)?;

        let res = self.dispatcher.check_title(req.get_ref()).await;
        respond(RPC, res)
    }

    #[tracing::instrument(
        skip_all,
        fields(
            job_id = %req.get_ref().job_id,
            primitive = req.get_ref().primitive,
            namespace = %req.get_ref().namespace,
        )
    )]
    async fn translate(
        &self,
        req: Request<TranslateRequest>,
    ) -> Result<Response<TranslateResponse>, Status> {
        const RPC: &str = "translate";
        let _guard = self.admit(RPC)?;

        let res = self.dispatcher.translate(req.into_inner()).await;
        respond(RPC, res)
    }

    /// Bidirectional chunked translation.
    ///
    /// The exchange runs on its own task so the response stream can be
    /// returned immediately. The call guard moves into that task and keeps the
    /// stream counted as in flight until it ends.
    async fn translate_stream(
        &self,
        req: Request<Streaming<TranslateChunk>>,
    ) -> Result<Response<Self::TranslateStreamStream>, Status> {
        const RPC: &str = "translate_stream";
        let guard = self.admit(RPC)?;

        let start = std::time::Instant::now();
        let inbound = req.into_inner();
        let (resp_tx, resp_rx) =
            mpsc::channel::<Result<TranslateChunk, Status>>(self.stream_buffer_size);
        let dispatcher = self.dispatcher.clone();

        increment_streams_inflight();
        let fut = async move {
            let _guard = guard;
            if let Err(e) = feed_chunks(inbound, dispatcher, resp_tx).await {
                increment_request_errors(RPC);
                tracing::warn!("Translation stream aborted: {e}");
            }
            decrement_streams_inflight();
            record_stream_duration(start.elapsed().as_secs_f64() * 1000.0);
        };
        tokio::spawn(fut.instrument(tracing::info_span!("translate_stream")));

        Ok(Response::new(Box::pin(ReceiverStream::new(resp_rx))))
    }
}

//! Request validation and backend dispatch for translation calls.
//!
//! The [`Dispatcher`] turns validated requests into calls on the configured
//! [`TranslatorBackend`] and shapes the responses. Malformed requests are
//! rejected with [`Error::InvalidRequest`] before the backend is touched;
//! backend failures are business outcomes and come back in-band with
//! `success = false`.

use crate::server::{
    backend::{BackendError, TranslatorBackend},
    telemetry::increment_translation_failures,
};
use nanabush_core::{
    Error, Result,
    proto::{
        PrimitiveType, TitleCheckRequest, TitleCheckResponse, TranslateRequest,
        TranslateResponse, translate_request::Payload,
    },
    types::{MAX_ESTIMATE_SECS, MIN_ESTIMATE_SECS},
};
use prost_types::Timestamp;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

/// Validates translation requests and forwards them to a backend.
#[derive(Clone)]
pub struct Dispatcher {
    backend: Arc<dyn TranslatorBackend>,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn TranslatorBackend>) -> Self {
        Self { backend }
    }

    /// Pre-flight readiness probe.
    ///
    /// An unhealthy backend is reported as `ready = false` with a zero
    /// estimate, never as an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the title, target language tag or
    /// source language is empty.
    pub async fn check_title(&self, req: &TitleCheckRequest) -> Result<TitleCheckResponse> {
        Error::require("title", &req.title)?;
        Error::require("language_tag", &req.language_tag)?;
        Error::require("source_language", &req.source_language)?;

        if let Err(e) = self.backend.check_health().await {
            tracing::warn!("Backend health check failed: {e}");
            return Ok(TitleCheckResponse {
                ready: false,
                message: format!("Backend not ready: {e}"),
                estimated_time_seconds: 0,
            });
        }

        let estimated_time_seconds = estimate_seconds(&req.title);
        tracing::debug!(estimated_time_seconds, "Title check passed");

        Ok(TitleCheckResponse {
            ready: true,
            message: "Ready to handle translation request".to_string(),
            estimated_time_seconds,
        })
    }

    /// Translates a title or a document, depending on `req.primitive`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] when the job id or either language is
    /// missing, when the primitive is not `PRIMITIVE_TITLE` or
    /// `PRIMITIVE_DOC_TRANSLATE`, or when the payload does not match the
    /// primitive. The backend is not called in any of these cases.
    pub async fn translate(&self, req: TranslateRequest) -> Result<TranslateResponse> {
        let start = Instant::now();

        Error::require("job_id", &req.job_id)?;
        Error::require("target_language", &req.target_language)?;
        Error::require("source_language", &req.source_language)?;

        let src = req.source_language.as_str();
        let dst = req.target_language.as_str();

        let outcome = match PrimitiveType::try_from(req.primitive) {
            Ok(PrimitiveType::PrimitiveTitle) => {
                let title = match &req.payload {
                    Some(Payload::Title(title)) if !title.is_empty() => title,
                    _ => return Err(Error::invalid("title is required for PRIMITIVE_TITLE")),
                };
                self.backend
                    .translate_title(title, src, dst)
                    .await
                    .map(|title| (title, String::new()))
            }
            Ok(PrimitiveType::PrimitiveDocTranslate) => {
                let Some(Payload::Doc(doc)) = &req.payload else {
                    return Err(Error::invalid(
                        "doc is required for PRIMITIVE_DOC_TRANSLATE",
                    ));
                };
                self.backend
                    .translate_document(doc, src, dst)
                    .await
                    .map(|doc| (doc.title, doc.markdown))
            }
            _ => {
                return Err(Error::invalid(format!(
                    "unsupported primitive type: {}",
                    req.primitive
                )));
            }
        };

        let inference_time_seconds = start.elapsed().as_secs_f64();
        let completed_at = Some(Timestamp::from(SystemTime::now()));

        match outcome {
            Ok((translated_title, translated_markdown)) => {
                tracing::info!(
                    job_id = %req.job_id,
                    inference_time_seconds,
                    "Translation completed"
                );
                Ok(TranslateResponse {
                    job_id: req.job_id,
                    success: true,
                    translated_title,
                    translated_markdown,
                    tokens_used: 0,
                    inference_time_seconds,
                    completed_at,
                    error_message: String::new(),
                })
            }
            Err(e) => {
                tracing::warn!(job_id = %req.job_id, "Translation failed: {e}");
                increment_translation_failures();
                Ok(TranslateResponse {
                    job_id: req.job_id,
                    success: false,
                    inference_time_seconds,
                    completed_at,
                    error_message: format!("Translation failed: {e}"),
                    ..Default::default()
                })
            }
        }
    }

    /// Translates one streamed chunk.
    pub async fn translate_chunk(
        &self,
        job_id: &str,
        index: u32,
        content: &str,
    ) -> core::result::Result<String, BackendError> {
        self.backend.translate_chunk(job_id, index, content).await
    }
}

/// Rough completion estimate for a title, clamped to
/// `[MIN_ESTIMATE_SECS, MAX_ESTIMATE_SECS]`.
///
/// Budgets 0.3s per character on top of a fixed 5s of queueing and setup.
pub fn estimate_seconds(title: &str) -> i32 {
    let chars = i32::try_from(title.chars().count()).unwrap_or(i32::MAX);
    chars
        .saturating_mul(3)
        .saturating_div(10)
        .saturating_add(MIN_ESTIMATE_SECS)
        .clamp(MIN_ESTIMATE_SECS, MAX_ESTIMATE_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::backend::{PlaceholderBackend, mock::MockBackend};
    use nanabush_core::proto::DocumentContent;
    use tonic::Code;

    fn placeholder() -> Dispatcher {
        Dispatcher::new(Arc::new(PlaceholderBackend))
    }

    fn title_check(title: &str) -> TitleCheckRequest {
        TitleCheckRequest {
            title: title.to_string(),
            source_language: "en".to_string(),
            language_tag: "fr-CA".to_string(),
        }
    }

    fn translate(primitive: i32, payload: Option<Payload>) -> TranslateRequest {
        TranslateRequest {
            job_id: "job-1".to_string(),
            primitive,
            namespace: "docs".to_string(),
            source_language: "en".to_string(),
            target_language: "fr".to_string(),
            payload,
        }
    }

    fn doc() -> DocumentContent {
        DocumentContent {
            title: "Intro".into(),
            markdown: "Hello".into(),
            slug: "intro".into(),
            ..Default::default()
        }
    }

    #[test]
    fn estimate_is_clamped() {
        assert_eq!(estimate_seconds(""), 5);
        assert_eq!(estimate_seconds("a"), 5);
        assert_eq!(estimate_seconds(&"a".repeat(100)), 35);
        assert_eq!(estimate_seconds(&"a".repeat(200)), 60);
        assert_eq!(estimate_seconds(&"a".repeat(100_000)), 60);
    }

    #[tokio::test]
    async fn check_title_requires_every_field() {
        let dispatcher = placeholder();
        for req in [
            title_check(""),
            TitleCheckRequest {
                language_tag: String::new(),
                ..title_check("t")
            },
            TitleCheckRequest {
                source_language: String::new(),
                ..title_check("t")
            },
        ] {
            let err = dispatcher.check_title(&req).await.unwrap_err();
            assert_eq!(tonic::Status::from(err).code(), Code::InvalidArgument);
        }
    }

    #[tokio::test]
    async fn check_title_with_long_title_caps_estimate() {
        let resp = placeholder()
            .check_title(&title_check(&"x".repeat(200)))
            .await
            .unwrap();
        assert!(resp.ready);
        assert_eq!(resp.estimated_time_seconds, 60);
    }

    #[tokio::test]
    async fn unhealthy_backend_is_reported_not_raised() {
        let dispatcher = Dispatcher::new(Arc::new(MockBackend::unhealthy("gpu warming up")));
        let resp = dispatcher.check_title(&title_check("Intro")).await.unwrap();
        assert!(!resp.ready);
        assert_eq!(resp.estimated_time_seconds, 0);
        assert!(resp.message.contains("gpu warming up"), "{}", resp.message);
    }

    #[tokio::test]
    async fn translate_title_with_placeholder() {
        let resp = placeholder()
            .translate(translate(
                PrimitiveType::PrimitiveTitle as i32,
                Some(Payload::Title("Intro".into())),
            ))
            .await
            .unwrap();
        assert!(resp.success);
        assert_eq!(resp.job_id, "job-1");
        assert_eq!(resp.translated_title, "Intro [translated]");
        assert!(resp.completed_at.is_some());
        assert!(resp.inference_time_seconds >= 0.0);
    }

    #[tokio::test]
    async fn translate_document_with_placeholder() {
        let resp = placeholder()
            .translate(translate(
                PrimitiveType::PrimitiveDocTranslate as i32,
                Some(Payload::Doc(doc())),
            ))
            .await
            .unwrap();
        assert!(resp.success);
        assert_eq!(resp.translated_title, "Intro [translated]");
        assert_eq!(
            resp.translated_markdown,
            "Hello\n\n*[Translated from en to fr]*"
        );
    }

    #[tokio::test]
    async fn translate_rejects_missing_identification() {
        let dispatcher = placeholder();
        let base = translate(PrimitiveType::PrimitiveTitle as i32, Some(Payload::Title("t".into())));
        for req in [
            TranslateRequest {
                job_id: String::new(),
                ..base.clone()
            },
            TranslateRequest {
                target_language: String::new(),
                ..base.clone()
            },
            TranslateRequest {
                source_language: String::new(),
                ..base.clone()
            },
        ] {
            assert!(matches!(
                dispatcher.translate(req).await,
                Err(Error::InvalidRequest { .. })
            ));
        }
    }

    #[tokio::test]
    async fn unsupported_primitive_never_reaches_backend() {
        let backend = Arc::new(MockBackend::default());
        let dispatcher = Dispatcher::new(backend.clone());

        for primitive in [PrimitiveType::PrimitiveUnspecified as i32, 42] {
            let err = dispatcher
                .translate(translate(primitive, Some(Payload::Title("t".into()))))
                .await
                .unwrap_err();
            assert_eq!(tonic::Status::from(err).code(), Code::InvalidArgument);
        }
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn payload_must_match_primitive() {
        let backend = Arc::new(MockBackend::default());
        let dispatcher = Dispatcher::new(backend.clone());

        let cases = [
            translate(PrimitiveType::PrimitiveTitle as i32, None),
            translate(PrimitiveType::PrimitiveTitle as i32, Some(Payload::Title(String::new()))),
            translate(PrimitiveType::PrimitiveTitle as i32, Some(Payload::Doc(doc()))),
            translate(PrimitiveType::PrimitiveDocTranslate as i32, None),
            translate(
                PrimitiveType::PrimitiveDocTranslate as i32,
                Some(Payload::Title("t".into())),
            ),
        ];
        for req in cases {
            assert!(matches!(
                dispatcher.translate(req).await,
                Err(Error::InvalidRequest { .. })
            ));
        }
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn backend_failure_is_folded_into_response() {
        let backend = Arc::new(MockBackend::failing("model not loaded"));
        let dispatcher = Dispatcher::new(backend.clone());

        let resp = dispatcher
            .translate(translate(
                PrimitiveType::PrimitiveDocTranslate as i32,
                Some(Payload::Doc(doc())),
            ))
            .await
            .unwrap();

        assert!(!resp.success);
        assert_eq!(resp.job_id, "job-1");
        assert_eq!(resp.error_message, "Translation failed: model not loaded");
        assert!(resp.completed_at.is_some());
        assert!(resp.translated_title.is_empty());
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn uses_configured_backend() {
        let backend = Arc::new(MockBackend::default());
        let resp = Dispatcher::new(backend.clone())
            .translate(translate(
                PrimitiveType::PrimitiveTitle as i32,
                Some(Payload::Title("Intro".into())),
            ))
            .await
            .unwrap();
        assert_eq!(resp.translated_title, "Intro (fr)");
        assert_eq!(backend.calls(), 1);
    }
}

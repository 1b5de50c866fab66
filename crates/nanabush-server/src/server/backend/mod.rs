//! Translation backend contract.
//!
//! The inference engine that actually translates text lives outside this
//! service. [`TranslatorBackend`] is the capability the dispatcher consumes;
//! which implementation is used is decided once, when the server starts.
//!
//! ## Implementations
//!
//! - [`PlaceholderBackend`] - non-production stand-in that echoes its input
//!   with a marker. Selected with `--backend placeholder`.

#[cfg(test)]
pub mod mock;
mod placeholder;

pub use placeholder::PlaceholderBackend;

use nanabush_core::proto::DocumentContent;

/// Failure reported by a translation backend.
///
/// These are business outcomes: the dispatcher folds them into responses with
/// `success = false` instead of failing the call.
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum BackendError {
    /// The backend cannot take requests right now.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The backend accepted the request but could not translate it.
    #[error("{0}")]
    Failed(String),
}

/// An engine capable of translating titles and documents.
///
/// Implementations must be cancel-safe: when a caller goes away, the future
/// returned by any method is dropped and must not leave shared state behind.
#[tonic::async_trait]
pub trait TranslatorBackend: Send + Sync + 'static {
    /// Translates a title only.
    async fn translate_title(
        &self,
        title: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, BackendError>;

    /// Translates a full document.
    async fn translate_document(
        &self,
        doc: &DocumentContent,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<DocumentContent, BackendError>;

    /// Translates one chunk of a streamed document.
    ///
    /// `index` is the position of the chunk within its stream, starting at 0.
    async fn translate_chunk(
        &self,
        job_id: &str,
        index: u32,
        content: &str,
    ) -> Result<String, BackendError>;

    /// Reports whether the backend is ready to take requests.
    async fn check_health(&self) -> Result<(), BackendError>;
}

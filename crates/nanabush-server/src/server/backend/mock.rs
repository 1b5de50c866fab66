use super::{BackendError, TranslatorBackend};
use nanabush_core::proto::DocumentContent;
use portable_atomic::{AtomicUsize, Ordering};

/// Test backend that counts calls and can be told to fail.
#[derive(Default)]
pub struct MockBackend {
    pub calls: AtomicUsize,
    pub unhealthy: Option<String>,
    pub failure: Option<String>,
}

impl MockBackend {
    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Default::default()
        }
    }

    pub fn unhealthy(reason: &str) -> Self {
        Self {
            unhealthy: Some(reason.to_string()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn outcome<T>(&self, ok: T) -> Result<T, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(reason) => Err(BackendError::Failed(reason.clone())),
            None => Ok(ok),
        }
    }
}

#[tonic::async_trait]
impl TranslatorBackend for MockBackend {
    async fn translate_title(
        &self,
        title: &str,
        _source_lang: &str,
        target_lang: &str,
    ) -> Result<String, BackendError> {
        self.outcome(format!("{title} ({target_lang})"))
    }

    async fn translate_document(
        &self,
        doc: &DocumentContent,
        _source_lang: &str,
        target_lang: &str,
    ) -> Result<DocumentContent, BackendError> {
        self.outcome(DocumentContent {
            title: format!("{} ({target_lang})", doc.title),
            markdown: format!("{} ({target_lang})", doc.markdown),
            slug: doc.slug.clone(),
            metadata: doc.metadata.clone(),
        })
    }

    async fn translate_chunk(
        &self,
        _job_id: &str,
        index: u32,
        content: &str,
    ) -> Result<String, BackendError> {
        self.outcome(format!("{content}#{index}"))
    }

    async fn check_health(&self) -> Result<(), BackendError> {
        match &self.unhealthy {
            Some(reason) => Err(BackendError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

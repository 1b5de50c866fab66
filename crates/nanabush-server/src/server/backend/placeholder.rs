use super::{BackendError, TranslatorBackend};
use nanabush_core::{proto::DocumentContent, types::PLACEHOLDER_TITLE_MARKER};

/// Backend used when no inference engine is configured.
///
/// **Not a translator.** It returns the input annotated with a marker so the
/// rest of the service can be deployed and exercised before a real backend is
/// wired in. It is always healthy and never fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlaceholderBackend;

#[tonic::async_trait]
impl TranslatorBackend for PlaceholderBackend {
    async fn translate_title(
        &self,
        title: &str,
        _source_lang: &str,
        _target_lang: &str,
    ) -> Result<String, BackendError> {
        Ok(format!("{title}{PLACEHOLDER_TITLE_MARKER}"))
    }

    async fn translate_document(
        &self,
        doc: &DocumentContent,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<DocumentContent, BackendError> {
        Ok(DocumentContent {
            title: format!("{}{PLACEHOLDER_TITLE_MARKER}", doc.title),
            markdown: format!(
                "{}\n\n*[Translated from {source_lang} to {target_lang}]*",
                doc.markdown
            ),
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
        Ok(format!("{content} [translated chunk {index}]"))
    }

    async fn check_health(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

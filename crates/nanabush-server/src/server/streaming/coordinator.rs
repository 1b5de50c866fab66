use super::session::{Action, StreamSession, StreamState};
use crate::server::{dispatch::Dispatcher, telemetry::increment_chunks_translated};
use futures::{Stream, StreamExt};
use nanabush_core::{Error, proto::TranslateChunk};
use tokio::sync::mpsc;
use tonic::Status;

/// Drives one translation stream from `inbound` to `resp_tx`.
///
/// Reads chunks until a terminal chunk has been answered or the client closes
/// its side, translating each non-terminal chunk through the [`Dispatcher`].
/// Closing without a terminal chunk simply ends the exchange; no terminal
/// chunk is made up.
///
/// # Arguments
///
/// - `inbound`: Chunks sent by the client.
/// - `dispatcher`: Source of the per-chunk translation primitive.
/// - `resp_tx`: Channel feeding the response stream.
///
/// # Errors
///
/// A receive failure or a failed chunk translation is surfaced to the client
/// as `Internal` (best effort) and returned. A send failure means the client
/// is gone; it is returned without further attempts to write. Chunks already
/// sent stay sent. Returns the final [`StreamState`] on success.
pub async fn feed_chunks<S>(
    mut inbound: S,
    dispatcher: Dispatcher,
    resp_tx: mpsc::Sender<Result<TranslateChunk, Status>>,
) -> nanabush_core::Result<StreamState>
where
    S: Stream<Item = Result<TranslateChunk, Status>> + Unpin,
{
    let mut session = StreamSession::new();

    while let Some(received) = inbound.next().await {
        let chunk = match received {
            Ok(chunk) => chunk,
            Err(status) => {
                session.fail();
                let err = Error::Transport {
                    context: format!("failed to receive chunk: {}", status.message()),
                };
                return Err(surface(&resp_tx, err).await);
            }
        };

        match session.accept(chunk)? {
            Action::Translate { index, content } => {
                let translated = tokio::select! {
                    res = dispatcher.translate_chunk(session.job_id(), index, &content) => res,
                    () = resp_tx.closed() => {
                        session.fail();
                        return Err(Error::RequestCancelled);
                    }
                };

                let translated = match translated {
                    Ok(translated) => translated,
                    Err(e) => {
                        session.fail();
                        let err = Error::Transport {
                            context: format!("failed to translate chunk {index}: {e}"),
                        };
                        return Err(surface(&resp_tx, err).await);
                    }
                };

                if let Err(e) = resp_tx.send(Ok(session.translated(index, translated))).await {
                    session.fail();
                    return Err(Error::ChannelError {
                        context: format!("failed to send chunk: {e}"),
                    });
                }
                increment_chunks_translated();
            }
            Action::Complete(last) => {
                if let Err(e) = resp_tx.send(Ok(last)).await {
                    session.fail();
                    return Err(Error::ChannelError {
                        context: format!("failed to send final chunk: {e}"),
                    });
                }
                break;
            }
        }
    }

    tracing::info!(
        job_id = %session.job_id(),
        chunks = session.chunks_accepted(),
        state = ?session.state(),
        "Translation stream ended"
    );
    Ok(session.state())
}

// On an internal error we make a best effort to tell the client. It may
// already have disconnected, in which case only the log remains.
async fn surface(resp_tx: &mpsc::Sender<Result<TranslateChunk, Status>>, err: Error) -> Error {
    if let Err(_e) = resp_tx.send(Err(err.clone().into())).await {
        tracing::warn!("Failed to forward stream error: {err}");
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::backend::{PlaceholderBackend, mock::MockBackend};
    use futures::stream;
    use nanabush_core::types::STREAM_COMPLETED_MARKER;
    use std::sync::Arc;
    use tonic::Code;

    fn chunk(job_id: &str, content: &str, is_final: bool) -> Result<TranslateChunk, Status> {
        Ok(TranslateChunk {
            job_id: job_id.to_string(),
            chunk_index: 0,
            content: content.to_string(),
            is_final,
        })
    }

    fn placeholder() -> Dispatcher {
        Dispatcher::new(Arc::new(PlaceholderBackend))
    }

    async fn run(
        inbound: Vec<Result<TranslateChunk, Status>>,
        dispatcher: Dispatcher,
    ) -> (
        nanabush_core::Result<StreamState>,
        Vec<Result<TranslateChunk, Status>>,
    ) {
        let (tx, mut rx) = mpsc::channel(16);
        let res = feed_chunks(stream::iter(inbound), dispatcher, tx).await;
        let mut out = Vec::new();
        while let Some(item) = rx.recv().await {
            out.push(item);
        }
        (res, out)
    }

    #[tokio::test]
    async fn one_chunk_then_final() {
        let (res, out) = run(
            vec![chunk("job-1", "x", false), chunk("", "y", true)],
            placeholder(),
        )
        .await;

        assert_eq!(res.unwrap(), StreamState::Completed);
        assert_eq!(out.len(), 2);

        let first = out[0].as_ref().unwrap();
        assert_eq!(first.chunk_index, 0);
        assert!(!first.is_final);
        assert_eq!(first.job_id, "job-1");
        assert_eq!(first.content, "x [translated chunk 0]");

        let last = out[1].as_ref().unwrap();
        assert_eq!(last.chunk_index, 1);
        assert!(last.is_final);
        assert_eq!(last.content, STREAM_COMPLETED_MARKER);
    }

    #[tokio::test]
    async fn nothing_is_read_after_final_chunk() {
        let (res, out) = run(
            vec![
                chunk("job", "a", false),
                chunk("job", "b", false),
                chunk("job", "", true),
                chunk("job", "late", false),
                chunk("job", "", true),
            ],
            placeholder(),
        )
        .await;

        assert_eq!(res.unwrap(), StreamState::Completed);
        let indices: Vec<_> = out.iter().map(|c| c.as_ref().unwrap().chunk_index).collect();
        assert_eq!(indices, [0, 1, 2]);
        assert_eq!(out.iter().filter(|c| c.as_ref().unwrap().is_final).count(), 1);
        assert!(out.last().unwrap().as_ref().unwrap().is_final);
    }

    #[tokio::test]
    async fn closing_without_final_emits_no_terminal_chunk() {
        let (res, out) = run(
            vec![chunk("job", "a", false), chunk("job", "b", false)],
            placeholder(),
        )
        .await;

        assert_eq!(res.unwrap(), StreamState::Streaming);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|c| !c.as_ref().unwrap().is_final));
    }

    #[tokio::test]
    async fn empty_stream_ends_quietly() {
        let (res, out) = run(vec![], placeholder()).await;
        assert_eq!(res.unwrap(), StreamState::AwaitingFirstChunk);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn receive_failure_surfaces_internal_and_stops() {
        let (res, out) = run(
            vec![
                chunk("job", "a", false),
                Err(Status::unknown("connection reset")),
                chunk("job", "b", false),
            ],
            placeholder(),
        )
        .await;

        assert!(matches!(res, Err(Error::Transport { .. })));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap().chunk_index, 0);
        let status = out[1].as_ref().unwrap_err();
        assert_eq!(status.code(), Code::Internal);
        assert!(status.message().contains("connection reset"));
    }

    #[tokio::test]
    async fn send_failure_aborts() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let res = feed_chunks(
            stream::iter(vec![chunk("job", "a", false)]),
            placeholder(),
            tx,
        )
        .await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn backend_chunk_failure_surfaces_internal() {
        let backend = Arc::new(MockBackend::failing("oom"));
        let (res, out) = run(
            vec![chunk("job", "a", false), chunk("job", "", true)],
            Dispatcher::new(backend.clone()),
        )
        .await;

        assert!(res.is_err());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap_err().code(), Code::Internal);
        assert_eq!(backend.calls(), 1);
    }
}

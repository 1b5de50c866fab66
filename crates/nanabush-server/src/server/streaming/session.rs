//! State machine for one chunked translation exchange.
//!
//! ```text
//! AwaitingFirstChunk ──chunk──▶ Streaming ──final chunk──▶ Completed
//!          │                        │
//!          └────── failure ─────────┴──────────────────▶ Errored
//! ```
//!
//! [`StreamSession`] knows nothing about transports. It decides what each
//! inbound chunk turns into and guarantees that output indices increase by one
//! per translated chunk and that exactly one terminal chunk is produced, after
//! which no further input is accepted.

use nanabush_core::{Error, Result, proto::TranslateChunk, types::STREAM_COMPLETED_MARKER};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    AwaitingFirstChunk,
    Streaming,
    Completed,
    Errored,
}

/// What the driver has to do with an accepted inbound chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Translate `content` and emit it under `index`.
    Translate { index: u32, content: String },
    /// Emit this terminal chunk and end the exchange.
    Complete(TranslateChunk),
}

/// Per-call streaming state. Nothing survives between calls.
#[derive(Debug)]
pub struct StreamSession {
    state: StreamState,
    job_id: String,
    next_index: u32,
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSession {
    pub const fn new() -> Self {
        Self {
            state: StreamState::AwaitingFirstChunk,
            job_id: String::new(),
            next_index: 0,
        }
    }

    pub const fn state(&self) -> StreamState {
        self.state
    }

    /// Job identifier latched from the first chunk.
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Number of non-terminal chunks accepted so far.
    pub const fn chunks_accepted(&self) -> u32 {
        self.next_index
    }

    /// Feeds one inbound chunk.
    ///
    /// The first chunk latches the job identifier; later chunks are assumed to
    /// belong to the same job. The inbound `chunk_index` is ignored: output
    /// indices are assigned here, starting at 0.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] once the session is completed or
    /// errored.
    pub fn accept(&mut self, chunk: TranslateChunk) -> Result<Action> {
        match self.state {
            StreamState::Completed | StreamState::Errored => {
                return Err(Error::invalid("stream already finished"));
            }
            StreamState::AwaitingFirstChunk => {
                self.job_id = chunk.job_id;
                self.state = StreamState::Streaming;
                tracing::info!(job_id = %self.job_id, "Translation stream started");
            }
            StreamState::Streaming => {
                if !chunk.job_id.is_empty() && chunk.job_id != self.job_id {
                    tracing::warn!(
                        job_id = %self.job_id,
                        got = %chunk.job_id,
                        "Ignoring mismatched job id on stream chunk"
                    );
                }
            }
        }

        if chunk.is_final {
            self.state = StreamState::Completed;
            tracing::info!(job_id = %self.job_id, chunks = self.next_index, "Final chunk received");
            return Ok(Action::Complete(TranslateChunk {
                job_id: self.job_id.clone(),
                chunk_index: self.next_index,
                content: STREAM_COMPLETED_MARKER.to_string(),
                is_final: true,
            }));
        }

        let index = self.next_index;
        self.next_index += 1;
        Ok(Action::Translate {
            index,
            content: chunk.content,
        })
    }

    /// Builds the outbound chunk for a translated `index`.
    pub fn translated(&self, index: u32, content: String) -> TranslateChunk {
        TranslateChunk {
            job_id: self.job_id.clone(),
            chunk_index: index,
            content,
            is_final: false,
        }
    }

    /// Moves the session to [`StreamState::Errored`].
    pub fn fail(&mut self) {
        self.state = StreamState::Errored;
    }
}

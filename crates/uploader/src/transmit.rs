//! Sends a single chunk and records the outcome in the store.

use tracing::{debug, warn};

use content_sources_client::UploadApi;
use content_sources_protocol::ChunkUpload;
use content_sources_transfer::{Chunk, FileSource, UploadStore};

use crate::error::UploadError;

/// The session a chunk belongs to, captured once per file.
#[derive(Debug, Clone)]
pub(crate) struct SessionTarget {
    pub name: String,
    pub generation: u64,
    pub upload_uuid: String,
    pub created: String,
    pub source: FileSource,
}

/// Result of one chunk attempt.
#[derive(Debug)]
pub(crate) enum ChunkOutcome {
    Uploaded { completed_chunks: usize, total_chunks: usize },
    /// Failed, still within the retry budget.
    Retry { attempt: u32 },
    /// Failed past the retry budget; fatal to the file.
    Exhausted(UploadError),
    /// The file was removed while the request was in flight.
    Discarded,
}

/// Uploads `chunk` and updates only that chunk's entry.
pub(crate) async fn transmit_chunk(
    api: &dyn UploadApi,
    store: &UploadStore,
    target: &SessionTarget,
    chunk: &Chunk,
    max_retry_count: u32,
) -> ChunkOutcome {
    let result = match target.source.read_range_async(chunk.start, chunk.end).await {
        Ok(data) => api
            .upload_chunk(ChunkUpload {
                upload_uuid: target.upload_uuid.clone(),
                chunk_range: chunk.chunk_range(),
                created: target.created.clone(),
                sha256: chunk.sha256.clone(),
                data,
            })
            .await
            .map_err(UploadError::from),
        Err(e) => Err(UploadError::from(e)),
    };

    match result {
        Ok(()) => {
            let updated = store.update(&target.name, target.generation, |state| {
                if let Some(c) = state.chunks.get_mut(chunk.index) {
                    c.completed = true;
                    c.queued = false;
                }
                state.refresh_completed();
                (state.completed_chunks(), state.chunks.len())
            });
            match updated {
                Some((completed_chunks, total_chunks)) => {
                    debug!(
                        file = %target.name,
                        chunk = chunk.index,
                        range = %chunk.chunk_range(),
                        "chunk uploaded"
                    );
                    ChunkOutcome::Uploaded {
                        completed_chunks,
                        total_chunks,
                    }
                }
                None => ChunkOutcome::Discarded,
            }
        }
        Err(e) => {
            let attempts = store.update_chunk(&target.name, target.generation, chunk.index, |c| {
                c.queued = false;
                c.retry_count += 1;
                c.retry_count
            });
            let Some(attempt) = attempts else {
                return ChunkOutcome::Discarded;
            };

            if attempt > max_retry_count {
                warn!(
                    file = %target.name,
                    chunk = chunk.index,
                    attempts = attempt,
                    error = %e,
                    "chunk retries exhausted"
                );
                ChunkOutcome::Exhausted(UploadError::ChunkUpload {
                    start: chunk.start,
                    end: chunk.end,
                })
            } else {
                warn!(
                    file = %target.name,
                    chunk = chunk.index,
                    attempt,
                    error = %e,
                    "chunk upload failed, will retry"
                );
                ChunkOutcome::Retry { attempt }
            }
        }
    }
}

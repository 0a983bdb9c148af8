//! Wave-by-wave upload of one file's chunks.

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use content_sources_client::UploadApi;
use content_sources_protocol::UploadLimits;
use content_sources_transfer::{FileStatus, UploadStore};

use crate::events::{EventSink, UploadEvent};
use crate::transmit::{ChunkOutcome, SessionTarget, transmit_chunk};

/// Everything a file upload needs from its orchestrator.
pub(crate) struct BatchContext<'a> {
    pub api: &'a dyn UploadApi,
    pub store: &'a UploadStore,
    pub limits: UploadLimits,
    pub cancel: &'a CancellationToken,
    pub events: &'a EventSink,
}

/// Uploads the outstanding chunks of `name` in waves of at most
/// `batch_size` concurrent requests.
///
/// Each wave settles completely before the next is selected. A chunk that
/// exhausts its retries fails the file and stops further waves. Returns the
/// file's status afterwards, or `None` if the entry disappeared.
pub(crate) async fn upload_file(ctx: &BatchContext<'_>, name: &str, generation: u64) -> Option<FileStatus> {
    let state = ctx.store.get(name).filter(|s| s.generation == generation)?;
    if !state.needs_upload() {
        return Some(state.status());
    }

    let target = SessionTarget {
        name: name.to_string(),
        generation,
        upload_uuid: state.uuid.clone(),
        created: state.created.clone(),
        source: state.file.source.clone(),
    };

    let mut wave_no = 0usize;
    loop {
        if ctx.cancel.is_cancelled() {
            debug!(file = %name, "upload stopped, orchestrator closed");
            break;
        }

        let wave = ctx
            .store
            .claim_chunks(name, generation, ctx.limits.batch_size)?;
        if wave.is_empty() {
            break;
        }
        wave_no += 1;
        debug!(file = %name, wave = wave_no, chunks = wave.len(), "dispatching wave");

        let outcomes = join_all(wave.iter().map(|chunk| {
            transmit_chunk(ctx.api, ctx.store, &target, chunk, ctx.limits.max_retry_count)
        }))
        .await;

        let mut exhausted = None;
        let mut discarded = false;
        for (chunk, outcome) in wave.iter().zip(outcomes) {
            match outcome {
                ChunkOutcome::Uploaded {
                    completed_chunks,
                    total_chunks,
                } => ctx.events.emit(UploadEvent::ChunkUploaded {
                    file: name.to_string(),
                    index: chunk.index,
                    completed_chunks,
                    total_chunks,
                }),
                ChunkOutcome::Retry { attempt } => ctx.events.emit(UploadEvent::ChunkRetrying {
                    file: name.to_string(),
                    index: chunk.index,
                    attempt,
                }),
                ChunkOutcome::Exhausted(e) => {
                    if exhausted.is_none() {
                        exhausted = Some(e);
                    }
                }
                ChunkOutcome::Discarded => discarded = true,
            }
        }

        if discarded {
            debug!(file = %name, "file removed mid-upload, dropping remaining waves");
            return None;
        }

        if let Some(e) = exhausted {
            let message = e.to_string();
            ctx.store.update(name, generation, |s| s.fail(message.clone()))?;
            error!(file = %name, error = %message, "file upload failed");
            ctx.events.emit(UploadEvent::FileFailed {
                file: name.to_string(),
                error: message,
            });
            return Some(FileStatus::Failed);
        }
    }

    let state = ctx.store.get(name).filter(|s| s.generation == generation)?;
    if state.completed {
        info!(file = %name, chunks = state.chunks.len(), waves = wave_no, "file upload completed");
        ctx.events.emit(UploadEvent::FileCompleted {
            file: name.to_string(),
        });
    }
    Some(state.status())
}

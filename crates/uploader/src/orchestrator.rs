//! Multi-file upload orchestration.
//!
//! Owns the per-file state map, prepares dropped files concurrently, then
//! runs scheduling passes: files smaller than one chunk go out in concurrent
//! batches, larger files one at a time (each parallel across its own chunks).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use content_sources_client::UploadApi;
use content_sources_protocol::{AddUploadsRequest, ResolvedUpload, UploadLimits};
use content_sources_transfer::{FileUploadState, UploadFile, UploadStore};

use crate::batch::{BatchContext, upload_file};
use crate::error::UploadError;
use crate::events::{EventSink, UploadEvent, UploadSummary};
use crate::session::{apply_session, negotiate, plan_file};

/// Drives checksum, negotiation and chunk upload for a set of files.
pub struct UploadOrchestrator {
    api: Arc<dyn UploadApi>,
    store: UploadStore,
    limits: UploadLimits,
    /// Number of `add_files`/`retry` calls still preparing files.
    dropping: AtomicUsize,
    /// A pass is running.
    batching: AtomicBool,
    /// Another pass was requested.
    rerun: AtomicBool,
    cancel: CancellationToken,
    events: EventSink,
}

/// Holds the `dropping` counter up for the duration of a preparation phase.
struct DroppingGuard<'a>(&'a AtomicUsize);

impl<'a> DroppingGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for DroppingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl UploadOrchestrator {
    pub fn new(api: Arc<dyn UploadApi>, limits: UploadLimits) -> Self {
        Self {
            api,
            store: UploadStore::new(),
            limits: limits.sanitized(),
            dropping: AtomicUsize::new(0),
            batching: AtomicBool::new(false),
            rerun: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            events: EventSink::default(),
        }
    }

    /// Takes the event receiver. Can only be called once; events are only
    /// produced after it has been taken.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<UploadEvent>> {
        self.events.take_receiver()
    }

    pub fn limits(&self) -> UploadLimits {
        self.limits
    }

    /// Adds dropped files and uploads them.
    ///
    /// Zero-byte files and names already present are skipped. Returns the
    /// number of files accepted. When another pass is already running this
    /// returns once preparation is done and the running pass picks the new
    /// files up.
    pub async fn add_files(&self, files: Vec<UploadFile>) -> usize {
        if self.cancel.is_cancelled() {
            warn!("uploader is closed, ignoring dropped files");
            return 0;
        }
        let guard = DroppingGuard::new(&self.dropping);

        let mut accepted = Vec::new();
        for file in files {
            if file.size == 0 {
                warn!(file = %file.name, "skipping empty file");
                continue;
            }
            let name = file.name.clone();
            match self.store.insert(file) {
                Some(generation) => accepted.push((name, generation)),
                None => debug!(file = %name, "file already queued, ignoring"),
            }
        }

        info!(files = accepted.len(), "preparing dropped files");
        join_all(
            accepted
                .iter()
                .map(|(name, generation)| self.prepare(name, *generation)),
        )
        .await;

        drop(guard);
        self.schedule().await;
        accepted.len()
    }

    /// Checksums, plans and negotiates one file. Failures stay on the file.
    async fn prepare(&self, name: &str, generation: u64) {
        let Some(state) = self.store.get(name).filter(|s| s.generation == generation) else {
            return;
        };
        let file = state.file;

        let result = async {
            let plan = plan_file(&file, self.limits.max_chunk_size).await?;
            let checksum = plan.checksum.clone();
            self.store.update(name, generation, |s| {
                s.checksum = plan.checksum;
                s.chunks = plan.chunks;
                s.uuid.clear();
                s.created.clear();
                s.artifact = None;
                s.completed = false;
                s.is_resumed = false;
            });

            let resp = negotiate(
                self.api.as_ref(),
                file.size,
                &checksum,
                self.limits.max_chunk_size,
            )
            .await?;
            Ok::<_, UploadError>(
                self.store
                    .update(name, generation, |s| {
                        apply_session(s, resp);
                        (s.is_resumed, s.completed)
                    }),
            )
        }
        .await;

        match result {
            Ok(Some((resumed, completed))) => {
                self.events.emit(UploadEvent::FilePrepared {
                    file: name.to_string(),
                    resumed,
                    completed,
                });
                if completed {
                    self.events.emit(UploadEvent::FileCompleted {
                        file: name.to_string(),
                    });
                }
            }
            Ok(None) => debug!(file = %name, "file removed during preparation"),
            Err(e) => {
                let message = e.to_string();
                error!(file = %name, error = %message, "file preparation failed");
                if self
                    .store
                    .update(name, generation, |s| s.fail(message.clone()))
                    .is_some()
                {
                    self.events.emit(UploadEvent::FileFailed {
                        file: name.to_string(),
                        error: message,
                    });
                }
            }
        }
    }

    /// Requests a scheduling pass.
    ///
    /// Only one pass runs at a time. Requests made while a pass runs, or
    /// while files are still being prepared, collapse into a single later pass.
    pub async fn schedule(&self) {
        self.rerun.store(true, Ordering::SeqCst);
        loop {
            if self.cancel.is_cancelled() || self.dropping.load(Ordering::SeqCst) > 0 {
                return;
            }
            if self.batching.swap(true, Ordering::SeqCst) {
                return;
            }

            while self.dropping.load(Ordering::SeqCst) == 0
                && !self.cancel.is_cancelled()
                && self.rerun.swap(false, Ordering::SeqCst)
            {
                self.run_pass().await;
            }

            self.batching.store(false, Ordering::SeqCst);
            // A request may have landed between the last check and the reset.
            if !self.rerun.load(Ordering::SeqCst) {
                return;
            }
        }
    }

    async fn run_pass(&self) {
        let outstanding: Vec<FileUploadState> = self
            .store
            .snapshot()
            .into_iter()
            .filter(FileUploadState::needs_upload)
            .collect();
        let (small, large): (Vec<_>, Vec<_>) = outstanding
            .into_iter()
            .partition(|s| s.is_small(self.limits.max_chunk_size));

        info!(small = small.len(), large = large.len(), "starting upload pass");

        let ctx = BatchContext {
            api: self.api.as_ref(),
            store: &self.store,
            limits: self.limits,
            cancel: &self.cancel,
            events: &self.events,
        };

        for batch in small.chunks(self.limits.batch_size) {
            if self.cancel.is_cancelled() {
                break;
            }
            join_all(
                batch
                    .iter()
                    .map(|s| upload_file(&ctx, s.name(), s.generation)),
            )
            .await;
        }

        for state in &large {
            if self.cancel.is_cancelled() {
                break;
            }
            upload_file(&ctx, state.name(), state.generation).await;
        }

        let summary = self.snapshot();
        info!(
            files = summary.file_count,
            completed = summary.completed_count,
            failed = summary.failed_count,
            "upload pass finished"
        );
        self.events.emit(UploadEvent::PassFinished(summary));
    }

    /// Retries a failed file.
    ///
    /// Without a session the whole pipeline restarts from the checksum;
    /// otherwise only the incomplete chunks are re-queued with a fresh
    /// retry budget.
    pub async fn retry(&self, name: &str) -> Result<(), UploadError> {
        let state = self
            .store
            .get(name)
            .ok_or_else(|| UploadError::NotFound(name.to_string()))?;
        if !state.failed {
            debug!(file = %name, "retry requested for a file that has not failed");
            return Ok(());
        }

        let generation = state.generation;
        let renegotiate = state.uuid.is_empty();
        self.store.update(name, generation, |s| {
            s.failed = false;
            s.error.clear();
            for chunk in s.chunks.iter_mut().filter(|c| !c.completed) {
                chunk.retry_count = 0;
                chunk.queued = false;
            }
        });
        info!(file = %name, renegotiate, "retrying upload");

        if renegotiate {
            let guard = DroppingGuard::new(&self.dropping);
            self.prepare(name, generation).await;
            drop(guard);
        }
        self.schedule().await;
        Ok(())
    }

    /// Forgets a file. Requests already in flight finish and are ignored.
    pub fn remove(&self, name: &str) -> bool {
        self.store.remove(name)
    }

    /// Forgets every file.
    pub fn clear(&self) {
        self.store.clear();
    }

    /// Stops scheduling new work and drops all state.
    pub fn close(&self) {
        self.cancel.cancel();
        self.store.clear();
    }

    /// Returns a token that is cancelled by [`close`](Self::close).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Per-file state of one file.
    pub fn file(&self, name: &str) -> Option<FileUploadState> {
        self.store.get(name)
    }

    pub fn snapshot(&self) -> UploadSummary {
        UploadSummary::from_states(&self.store.snapshot())
    }

    /// Attach payload entries for every fully stored file.
    pub fn resolved_uploads(&self) -> Vec<ResolvedUpload> {
        self.store
            .snapshot()
            .iter()
            .filter_map(FileUploadState::resolved)
            .collect()
    }

    /// All files are stored and nothing is pending.
    pub fn ready_to_confirm(&self) -> bool {
        self.snapshot().is_ready()
    }

    /// Attaches every resolved file to a repository, then clears the list.
    ///
    /// Returns the number of files attached.
    pub async fn confirm(&self, repository_uuid: &str) -> Result<usize, UploadError> {
        if !self.ready_to_confirm() {
            return Err(UploadError::NotReady);
        }
        let resolved = self.resolved_uploads();
        let req = AddUploadsRequest::from_resolved(&resolved);
        self.api.add_uploads(repository_uuid, req).await?;
        info!(repository = %repository_uuid, files = resolved.len(), "uploads attached");
        self.clear();
        Ok(resolved.len())
    }
}

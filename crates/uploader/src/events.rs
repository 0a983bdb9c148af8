//! Progress events and aggregate state for consumers such as a progress UI.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::mpsc;

use content_sources_transfer::{FileStatus, FileUploadState};

/// Event emitted while uploads progress.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// Checksum and session negotiation finished for a file.
    FilePrepared {
        file: String,
        resumed: bool,
        completed: bool,
    },
    /// One chunk was stored by the server.
    ChunkUploaded {
        file: String,
        index: usize,
        completed_chunks: usize,
        total_chunks: usize,
    },
    /// A chunk failed but will be sent again.
    ChunkRetrying {
        file: String,
        index: usize,
        attempt: u32,
    },
    /// Every byte of the file is stored server side.
    FileCompleted { file: String },
    /// The file needs an explicit retry or removal.
    FileFailed { file: String, error: String },
    /// A scheduling pass ran to the end.
    PassFinished(UploadSummary),
}

/// Per-file row of an [`UploadSummary`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileProgress {
    pub name: String,
    pub size: u64,
    pub status: FileStatus,
    pub percentage: f64,
    pub is_resumed: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl From<&FileUploadState> for FileProgress {
    fn from(state: &FileUploadState) -> Self {
        Self {
            name: state.file.name.clone(),
            size: state.file.size,
            status: state.status(),
            percentage: state.percentage(),
            is_resumed: state.is_resumed,
            error: state.error.clone(),
        }
    }
}

/// Aggregate view of all files in the uploader.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UploadSummary {
    pub files: Vec<FileProgress>,
    pub file_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
}

impl UploadSummary {
    pub fn from_states(states: &[FileUploadState]) -> Self {
        Self {
            files: states.iter().map(FileProgress::from).collect(),
            file_count: states.len(),
            completed_count: states.iter().filter(|s| s.completed && !s.failed).count(),
            failed_count: states.iter().filter(|s| s.failed).count(),
        }
    }

    /// At least one file, and all of them stored.
    pub fn is_ready(&self) -> bool {
        self.file_count > 0 && self.completed_count == self.file_count
    }
}

/// Lazily created event channel.
///
/// Nothing is buffered until a consumer takes the receiver.
#[derive(Default)]
pub(crate) struct EventSink {
    tx: Mutex<Option<mpsc::UnboundedSender<UploadEvent>>>,
    taken: Mutex<bool>,
}

impl EventSink {
    pub(crate) fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<UploadEvent>> {
        let mut taken = self.taken.lock().unwrap_or_else(PoisonError::into_inner);
        if *taken {
            return None;
        }
        *taken = true;
        let (tx, rx) = mpsc::unbounded_channel();
        *self.tx.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        Some(rx)
    }

    pub(crate) fn emit(&self, event: UploadEvent) {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = tx.as_ref() {
            // A dropped receiver just means nobody is listening any more.
            let _ = tx.send(event);
        }
    }
}

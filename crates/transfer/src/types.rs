use serde::Serialize;

use content_sources_protocol::{ResolvedUpload, chunk_range};

use crate::UploadFile;

/// One byte range of a file being uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Position within the file's chunk list.
    pub index: usize,
    /// First byte offset (inclusive).
    pub start: u64,
    /// Last byte offset (inclusive).
    pub end: u64,
    /// Size of the whole file, needed for the range descriptor.
    pub file_size: u64,
    /// SHA-256 hex digest of this chunk's bytes.
    pub sha256: String,
    /// A request for this chunk is in flight.
    pub queued: bool,
    /// The server holds this chunk's bytes.
    pub completed: bool,
    /// Failed attempts so far.
    pub retry_count: u32,
}

impl Chunk {
    pub fn new(index: usize, start: u64, end: u64, file_size: u64) -> Self {
        Self {
            index,
            start,
            end,
            file_size,
            sha256: String::new(),
            queued: false,
            completed: false,
            retry_count: 0,
        }
    }

    /// Number of bytes covered.
    pub fn byte_len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `bytes {start}-{end}/{size}`.
    pub fn chunk_range(&self) -> String {
        chunk_range(self.start, self.end, self.file_size)
    }

    /// Neither done nor in flight.
    pub fn is_pending(&self) -> bool {
        !self.completed && !self.queued
    }
}

/// Lifecycle of one file, derived from its chunk state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Uploading,
    Completed,
    Failed,
}

/// Upload state of one dropped file.
#[derive(Debug, Clone)]
pub struct FileUploadState {
    pub file: UploadFile,
    /// Distinguishes this entry from an earlier one with the same name.
    pub generation: u64,
    /// Server session id; empty until negotiation succeeds.
    pub uuid: String,
    pub created: String,
    /// Href of an artifact the server already stores.
    pub artifact: Option<String>,
    /// Whole-file SHA-256 hex digest.
    pub checksum: String,
    pub chunks: Vec<Chunk>,
    pub completed: bool,
    pub failed: bool,
    pub error: String,
    /// Some chunks were already on the server when the session opened.
    pub is_resumed: bool,
}

impl FileUploadState {
    pub fn new(file: UploadFile, generation: u64) -> Self {
        Self {
            file,
            generation,
            uuid: String::new(),
            created: String::new(),
            artifact: None,
            checksum: String::new(),
            chunks: Vec::new(),
            completed: false,
            failed: false,
            error: String::new(),
            is_resumed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.file.name
    }

    pub fn status(&self) -> FileStatus {
        if self.failed {
            FileStatus::Failed
        } else if self.completed {
            FileStatus::Completed
        } else if self
            .chunks
            .iter()
            .any(|c| c.queued || c.completed || c.retry_count > 0)
        {
            FileStatus::Uploading
        } else {
            FileStatus::Pending
        }
    }

    /// Recomputes `completed`; it never flips back to false here.
    pub fn refresh_completed(&mut self) -> bool {
        if !self.completed {
            self.completed = self.artifact.is_some()
                || (!self.chunks.is_empty() && self.chunks.iter().all(|c| c.completed));
        }
        self.completed
    }

    /// Marks the file failed with a user-visible message.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.failed = true;
        self.error = message.into();
    }

    /// Session exists, nothing terminal yet and chunks remain.
    pub fn needs_upload(&self) -> bool {
        !self.uuid.is_empty()
            && !self.completed
            && !self.failed
            && self.chunks.iter().any(|c| !c.completed)
    }

    /// Files smaller than one chunk go through the small-file batches.
    pub fn is_small(&self, max_chunk_size: u64) -> bool {
        self.file.size < max_chunk_size
    }

    pub fn completed_chunks(&self) -> usize {
        self.chunks.iter().filter(|c| c.completed).count()
    }

    /// Upload progress as a percentage (0-100) of bytes stored server side.
    pub fn percentage(&self) -> f64 {
        if self.completed {
            return 100.0;
        }
        if self.file.size == 0 {
            return 0.0;
        }
        let done: u64 = self
            .chunks
            .iter()
            .filter(|c| c.completed)
            .map(Chunk::byte_len)
            .sum();
        done as f64 / self.file.size as f64 * 100.0
    }

    /// The attach payload entry, once the file is fully stored.
    pub fn resolved(&self) -> Option<ResolvedUpload> {
        if !self.completed || self.failed {
            return None;
        }
        match &self.artifact {
            Some(href) => Some(ResolvedUpload {
                sha256: self.checksum.clone(),
                uuid: None,
                href: Some(href.clone()),
            }),
            None if !self.uuid.is_empty() => Some(ResolvedUpload {
                sha256: self.checksum.clone(),
                uuid: Some(self.uuid.clone()),
                href: None,
            }),
            None => None,
        }
    }
}

use serde::{Deserialize, Serialize};

/// Fixed chunk size in bytes (3 MiB).
///
/// Must match what the server expects for `chunk_size` on session creation.
pub const MAX_CHUNK_SIZE: u64 = 3 * 1024 * 1024;

/// Maximum number of concurrent requests in one upload wave.
///
/// Also the width of a small-file batch.
pub const BATCH_SIZE: usize = 5;

/// Number of retries a single chunk gets before its file is failed.
pub const MAX_RETRY_COUNT: u32 = 3;

/// Chunking limits used by the pipeline.
///
/// Defaults are the protocol constants above; overriding them is meant for
/// tests and for servers configured with a different chunk size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadLimits {
    pub max_chunk_size: u64,
    pub batch_size: usize,
    pub max_retry_count: u32,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_chunk_size: MAX_CHUNK_SIZE,
            batch_size: BATCH_SIZE,
            max_retry_count: MAX_RETRY_COUNT,
        }
    }
}

impl UploadLimits {
    /// Returns a copy with zero values replaced by the defaults.
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        Self {
            max_chunk_size: if self.max_chunk_size == 0 {
                defaults.max_chunk_size
            } else {
                self.max_chunk_size
            },
            batch_size: if self.batch_size == 0 {
                defaults.batch_size
            } else {
                self.batch_size
            },
            max_retry_count: self.max_retry_count,
        }
    }
}

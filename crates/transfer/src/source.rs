use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::TransferError;

/// Where the bytes of a dropped file live.
///
/// Ranges are read on demand; nothing is copied up front.
#[derive(Debug, Clone)]
pub enum FileSource {
    Path(PathBuf),
    Memory(Arc<[u8]>),
}

impl FileSource {
    /// Reads the inclusive byte range `start..=end`.
    ///
    /// Blocking; async callers go through [`FileSource::read_range_async`].
    pub fn read_range(&self, start: u64, end: u64) -> Result<Vec<u8>, TransferError> {
        let len = end
            .checked_sub(start)
            .map(|d| d + 1)
            .ok_or_else(|| TransferError::InvalidRange {
                start,
                end,
                size: self.len_hint(),
            })?;

        match self {
            FileSource::Memory(data) => {
                let size = data.len() as u64;
                if end >= size {
                    return Err(TransferError::InvalidRange { start, end, size });
                }
                Ok(data[start as usize..=end as usize].to_vec())
            }
            FileSource::Path(path) => {
                let mut file = File::open(path)?;
                file.seek(SeekFrom::Start(start))?;
                let mut buf = Vec::with_capacity(len as usize);
                file.take(len).read_to_end(&mut buf)?;
                if (buf.len() as u64) < len {
                    return Err(TransferError::InvalidRange {
                        start,
                        end,
                        size: start + buf.len() as u64,
                    });
                }
                Ok(buf)
            }
        }
    }

    /// Reads a byte range on the blocking thread pool.
    pub async fn read_range_async(&self, start: u64, end: u64) -> Result<Vec<u8>, TransferError> {
        let source = self.clone();
        tokio::task::spawn_blocking(move || source.read_range(start, end)).await?
    }

    fn len_hint(&self) -> u64 {
        match self {
            FileSource::Memory(data) => data.len() as u64,
            FileSource::Path(path) => std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
        }
    }
}

/// A file handed to the uploader.
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// Display name; also the key of the file's upload state.
    pub name: String,
    pub size: u64,
    pub source: FileSource,
}

impl UploadFile {
    /// Describes an on-disk file, named after its last path component.
    pub fn from_path(path: &Path) -> Result<Self, TransferError> {
        let size = std::fs::metadata(path)?.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Ok(Self {
            name,
            size,
            source: FileSource::Path(path.to_path_buf()),
        })
    }

    /// Wraps an in-memory buffer.
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        let data = data.into();
        Self {
            name: name.into(),
            size: data.len() as u64,
            source: FileSource::Memory(data),
        }
    }
}

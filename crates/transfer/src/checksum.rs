use std::io::Read;

use sha2::{Digest, Sha256};

use crate::{FileSource, TransferError};

/// Read buffer for incremental hashing.
const READ_BUF_SIZE: usize = 64 * 1024;

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hashes everything `reader` yields, `READ_BUF_SIZE` bytes at a time.
fn checksum_reader<R: Read>(mut reader: R) -> Result<String, TransferError> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn checksum_source_blocking(source: &FileSource) -> Result<String, TransferError> {
    match source {
        FileSource::Memory(data) => checksum_reader(&data[..]),
        FileSource::Path(path) => checksum_reader(std::fs::File::open(path)?),
    }
}

/// Computes the whole-file digest.
///
/// Runs on the blocking pool so hashing a multi-gigabyte file never stalls
/// the runtime.
pub async fn checksum_source(source: &FileSource) -> Result<String, TransferError> {
    let source = source.clone();
    tokio::task::spawn_blocking(move || checksum_source_blocking(&source)).await?
}

/// Computes the digest of the inclusive byte range `start..=end`.
pub fn checksum_range(source: &FileSource, start: u64, end: u64) -> Result<String, TransferError> {
    let data = source.read_range(start, end)?;
    Ok(checksum_bytes(&data))
}

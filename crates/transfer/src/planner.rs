use std::io::{Read, Seek, SeekFrom};

use crate::checksum::checksum_bytes;
use crate::types::Chunk;
use crate::{FileSource, TransferError};

/// Splits a file of `size` bytes into `ceil(size / max_chunk_size)` chunks.
///
/// Chunk `i` covers `i * max ..= min((i + 1) * max - 1, size - 1)`. Digests are
/// left empty; see [`digest_chunks`].
pub fn plan_chunks(size: u64, max_chunk_size: u64) -> Result<Vec<Chunk>, TransferError> {
    if max_chunk_size == 0 {
        return Err(TransferError::InvalidChunkSize);
    }
    if size == 0 {
        return Err(TransferError::EmptyFile);
    }

    let count = size.div_ceil(max_chunk_size);
    let chunks = (0..count)
        .map(|i| {
            let start = i * max_chunk_size;
            let end = (start.saturating_add(max_chunk_size) - 1).min(size - 1);
            Chunk::new(i as usize, start, end, size)
        })
        .collect();
    Ok(chunks)
}

/// Fills in each chunk's `sha256` from that chunk's bytes alone.
///
/// This is a separate digest domain from the whole-file checksum.
pub async fn digest_chunks(source: &FileSource, chunks: &mut [Chunk]) -> Result<(), TransferError> {
    let source = source.clone();
    let ranges: Vec<(u64, u64)> = chunks.iter().map(|c| (c.start, c.end)).collect();

    let digests = tokio::task::spawn_blocking(move || digest_ranges(&source, &ranges)).await??;

    for (chunk, digest) in chunks.iter_mut().zip(digests) {
        chunk.sha256 = digest;
    }
    Ok(())
}

fn digest_ranges(source: &FileSource, ranges: &[(u64, u64)]) -> Result<Vec<String>, TransferError> {
    match source {
        FileSource::Memory(_) => ranges
            .iter()
            .map(|&(start, end)| source.read_range(start, end).map(|d| checksum_bytes(&d)))
            .collect(),
        FileSource::Path(path) => {
            // One handle for every range instead of reopening per chunk.
            let mut file = std::fs::File::open(path)?;
            let mut digests = Vec::with_capacity(ranges.len());
            let mut buf = Vec::new();
            for &(start, end) in ranges {
                let len = end - start + 1;
                buf.clear();
                file.seek(SeekFrom::Start(start))?;
                (&mut file).take(len).read_to_end(&mut buf)?;
                if (buf.len() as u64) < len {
                    return Err(TransferError::InvalidRange {
                        start,
                        end,
                        size: start + buf.len() as u64,
                    });
                }
                digests.push(checksum_bytes(&buf));
            }
            Ok(digests)
        }
    }
}

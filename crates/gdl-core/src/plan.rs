//! Chunk planning: partition `[0, size)` into contiguous ranges.

use crate::state::Chunk;

/// Splits `size` bytes into `concurrency` contiguous, non-overlapping chunks.
///
/// Each chunk spans `size / concurrency` bytes; the division remainder is
/// absorbed by the last chunk. When `size < concurrency` the leading chunks
/// degenerate to zero length (`end == start - 1`) and are born complete,
/// which keeps the partition invariant intact without special-casing.
///
/// Returns an empty plan for a non-positive size or zero concurrency.
pub fn plan_chunks(size: i64, concurrency: usize) -> Vec<Chunk> {
    if size <= 0 || concurrency == 0 {
        return Vec::new();
    }

    let count = concurrency as i64;
    let base = size / count;

    let mut chunks = Vec::with_capacity(concurrency);
    for i in 0..count {
        let start = i * base;
        let end = if i == count - 1 {
            size - 1
        } else {
            (i + 1) * base - 1
        };
        chunks.push(Chunk::new(i as u32, start, end));
    }
    chunks
}

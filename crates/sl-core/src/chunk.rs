//! Chunked fan-out / fan-in.
//!
//! Heavy stages split their input into bounded chunks, process chunks on a
//! scoped worker pool, and merge the per-chunk outputs in input order. A
//! chunk failure is isolated: the merge carries on with the surviving
//! chunks and only the degenerate all-chunks-failed case escalates.

use rayon::prelude::*;
use sl_common::{Error, Result};
use tracing::{info, warn};

/// Split `items` into ordered chunks of at most `size` elements.
///
/// The final chunk may be short; it is never dropped. Concatenating the
/// chunks in order reproduces the input exactly.
pub fn split<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    items.chunks(size).map(<[T]>::to_vec).collect()
}

/// Split into chunks of roughly `max_rows` rows without splitting a group.
///
/// `items` must already be ordered so that rows sharing a key are
/// contiguous (the locate stage sorts picks by event before chunking). A
/// group larger than `max_rows` becomes a chunk of its own rather than
/// being split across solver invocations.
pub fn split_grouped<T, K, F>(items: &[T], max_rows: usize, key: F) -> Vec<Vec<T>>
where
    T: Clone,
    K: PartialEq,
    F: Fn(&T) -> K,
{
    let max_rows = max_rows.max(1);
    let mut chunks: Vec<Vec<T>> = Vec::new();
    let mut current: Vec<T> = Vec::new();

    let mut start = 0;
    while start < items.len() {
        let group_key = key(&items[start]);
        let mut end = start + 1;
        while end < items.len() && key(&items[end]) == group_key {
            end += 1;
        }
        let group = &items[start..end];
        if !current.is_empty() && current.len() + group.len() > max_rows {
            chunks.push(std::mem::take(&mut current));
        }
        current.extend_from_slice(group);
        if current.len() >= max_rows {
            chunks.push(std::mem::take(&mut current));
        }
        start = end;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Outcome of one chunk, tagged with its input position.
#[derive(Debug)]
pub struct ChunkOutcome<R> {
    pub index: usize,
    pub result: Result<Vec<R>>,
}

/// Process `chunks` in parallel on a scoped pool of `workers` threads.
///
/// The pool lives only for this call, so concurrent stages cannot
/// oversubscribe each other. Outcomes come back in chunk order.
pub fn run_chunks<T, R, F>(chunks: Vec<Vec<T>>, workers: usize, work: F) -> Result<Vec<ChunkOutcome<R>>>
where
    T: Send + Sync,
    R: Send,
    F: Fn(usize, &[T]) -> Result<Vec<R>> + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|err| Error::Config(format!("worker pool: {err}")))?;

    let mut outcomes: Vec<ChunkOutcome<R>> = pool.install(|| {
        chunks
            .par_iter()
            .enumerate()
            .map(|(index, chunk)| ChunkOutcome {
                index,
                result: work(index, chunk),
            })
            .collect()
    });
    outcomes.sort_by_key(|outcome| outcome.index);
    Ok(outcomes)
}

/// Merge chunk outcomes in input order, dropping failed chunks.
///
/// Zero chunks merge to zero rows. When every chunk of a non-empty split
/// failed the stage itself has failed and `AllChunksFailed` is returned.
pub fn merge<R>(window: &str, stage: &str, outcomes: Vec<ChunkOutcome<R>>) -> Result<Vec<R>> {
    let total = outcomes.len();
    let mut merged = Vec::new();
    let mut failed = 0usize;

    for outcome in outcomes {
        match outcome.result {
            Ok(rows) => merged.extend(rows),
            Err(err) => {
                failed += 1;
                warn!(
                    window,
                    stage,
                    chunk = outcome.index,
                    error = %err,
                    "chunk failed, continuing with remaining chunks"
                );
            }
        }
    }

    if total > 0 && failed == total {
        return Err(Error::AllChunksFailed {
            window: window.to_owned(),
            stage: stage.to_owned(),
            chunks: total,
        });
    }
    if failed > 0 {
        info!(window, stage, failed, total, "stage completed with failed chunks");
    }
    Ok(merged)
}

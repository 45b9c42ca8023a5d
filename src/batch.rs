/*!
 * Ordered partitioning of work units into concurrency-bounded batches.
 *
 * Batches are processed sequentially by the stage runner; the units inside a
 * batch run concurrently. Partitioning never reorders: concatenating the
 * batches reproduces the input exactly.
 */

use anyhow::{Result, anyhow};

/// Split `units` into batches of at most `max_concurrency` items, preserving
/// order within and across batches. Zero concurrency is an error.
pub fn partition<T>(units: Vec<T>, max_concurrency: usize) -> Result<Vec<Vec<T>>> {
    if max_concurrency == 0 {
        return Err(anyhow!("batch concurrency must be at least 1"));
    }

    if units.is_empty() {
        return Ok(Vec::new());
    }

    let batch_count = units.len().div_ceil(max_concurrency);
    let mut batches = Vec::with_capacity(batch_count);
    let mut current = Vec::with_capacity(max_concurrency);

    for unit in units {
        current.push(unit);
        if current.len() == max_concurrency {
            batches.push(std::mem::replace(
                &mut current,
                Vec::with_capacity(max_concurrency),
            ));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }

    Ok(batches)
}

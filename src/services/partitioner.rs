//! Round-robin partitioning of the test matrix into worker batches.

use crate::domain::errors::{DomainError, DomainResult};

/// Split `items` into `workers` batches, item `i` going to batch `i % workers`.
///
/// Order within each batch follows the input order, so the same input always
/// yields the same partitioning. Batch sizes differ by at most one; with more
/// workers than items the surplus batches are empty.
pub fn partition<T: Clone>(items: &[T], workers: usize) -> DomainResult<Vec<Vec<T>>> {
    if workers == 0 {
        return Err(DomainError::ValidationFailed(
            "worker count must be at least 1".to_string(),
        ));
    }

    let mut batches: Vec<Vec<T>> = (0..workers)
        .map(|_| Vec::with_capacity(items.len() / workers + 1))
        .collect();
    for (i, item) in items.iter().enumerate() {
        batches[i % workers].push(item.clone());
    }
    Ok(batches)
}

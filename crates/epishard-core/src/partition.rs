//! Contiguous work partitioning.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::domain::error::{EpiError, Result};

/// Contiguous slice of item indices owned by one worker or host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardAssignment {
    pub worker: usize,
    pub range: Range<usize>,
}

impl ShardAssignment {
    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Split `items` into `workers` contiguous ranges.
///
/// Each worker gets `items / workers`; the first `items % workers` workers get
/// one extra. Ranges are disjoint and cover `0..items` in order. With more
/// workers than items the trailing assignments are empty.
pub fn partition(items: usize, workers: usize) -> Result<Vec<ShardAssignment>> {
    if workers == 0 {
        return Err(EpiError::InvalidConfig(
            "cannot partition across zero workers".to_string(),
        ));
    }
    let base = items / workers;
    let extra = items % workers;

    let mut start = 0;
    let assignments = (0..workers)
        .map(|worker| {
            let len = base + usize::from(worker < extra);
            let range = start..start + len;
            start += len;
            ShardAssignment { worker, range }
        })
        .collect();
    Ok(assignments)
}

//! Leftmost-true search over ordered candidates
//!
//! The predicate is assumed monotonic (false…false true…true). Binary search
//! runs first; if it finds nothing, every candidate is tried in order so that a
//! gap in the data cannot hide a later start. Each candidate is evaluated at
//! most once per search.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::fetcher::FetcherResult;

/// Asynchronous yes/no test over a candidate (year, month or day)
#[async_trait]
pub trait Probe: Send + Sync {
    /// Whether `candidate` has data
    async fn has_data(&self, candidate: u32) -> FetcherResult<bool>;
}

/// How a search concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPath {
    /// Binary search located the start
    Binary,
    /// Binary search missed; the linear scan found it
    Linear,
}

/// Find the first candidate for which `probe` holds.
///
/// # Errors
/// The first probe error is returned unchanged.
pub async fn first_true<P: Probe + ?Sized>(
    candidates: &[u32],
    probe: &P,
) -> FetcherResult<Option<(u32, SearchPath)>> {
    let mut memo: HashMap<u32, bool> = HashMap::new();

    let mut lo = 0usize;
    let mut hi = candidates.len();
    let mut answer: Option<usize> = None;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if evaluate(candidates[mid], probe, &mut memo).await? {
            answer = Some(mid);
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    if let Some(idx) = answer {
        return Ok(Some((candidates[idx], SearchPath::Binary)));
    }

    for &candidate in candidates {
        if evaluate(candidate, probe, &mut memo).await? {
            return Ok(Some((candidate, SearchPath::Linear)));
        }
    }
    Ok(None)
}

async fn evaluate<P: Probe + ?Sized>(
    candidate: u32,
    probe: &P,
    memo: &mut HashMap<u32, bool>,
) -> FetcherResult<bool> {
    if let Some(&known) = memo.get(&candidate) {
        return Ok(known);
    }
    let result = probe.has_data(candidate).await?;
    memo.insert(candidate, result);
    Ok(result)
}

//! Eviction planning
//!
//! Pure functions deciding which entries a sweep removes. The store applies the plan.

use chrono::{DateTime, Utc};

use crate::config::CacheLimits;

/// Why an entry was chosen for eviction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvictionReason {
    /// Older than the store's maximum age
    Expired,
    /// Least recently used while the store was over capacity
    OverCapacity,
}

/// Inputs for planning, one per indexed entry
#[derive(Clone, Debug)]
pub(crate) struct Candidate {
    pub key: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub pinned: bool,
}

#[derive(Debug, Default)]
pub(crate) struct Plan {
    pub evict: Vec<(String, EvictionReason)>,
    pub pinned_skipped: usize,
}

/// Expired entries first, then least-recently-accessed until the total fits the capacity.
pub(crate) fn plan_sweep(candidates: &[Candidate], limits: &CacheLimits, now: DateTime<Utc>) -> Plan {
    let mut plan = Plan::default();
    let mut survivors = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        if is_expired(candidate.created_at, limits.max_age, now) {
            if candidate.pinned {
                plan.pinned_skipped += 1;
                survivors.push(candidate);
            } else {
                plan.evict
                    .push((candidate.key.clone(), EvictionReason::Expired));
            }
        } else {
            survivors.push(candidate);
        }
    }

    let remaining: u64 = survivors.iter().map(|c| c.size_bytes).sum();
    plan.evict.extend(
        plan_capacity(survivors, remaining, limits.capacity_bytes, None)
            .into_iter()
            .map(|key| (key, EvictionReason::OverCapacity)),
    );

    plan
}

/// Whether an entry created at `created_at` is older than `max_age` at `now`
pub(crate) fn is_expired(created_at: DateTime<Utc>, max_age: std::time::Duration, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(created_at)
        .to_std()
        .map(|age| age > max_age)
        .unwrap_or(false)
}

/// Least-recently-accessed unpinned entries to drop so `total_bytes` fits `capacity`.
///
/// `protect` is never chosen (the entry that was just stored).
pub(crate) fn plan_capacity<'a>(
    candidates: impl IntoIterator<Item = &'a Candidate>,
    total_bytes: u64,
    capacity: u64,
    protect: Option<&str>,
) -> Vec<String> {
    if total_bytes <= capacity {
        return Vec::new();
    }

    let mut lru: Vec<&Candidate> = candidates
        .into_iter()
        .filter(|c| !c.pinned && Some(c.key.as_str()) != protect)
        .collect();
    lru.sort_by(|a, b| {
        a.last_accessed_at
            .cmp(&b.last_accessed_at)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.key.cmp(&b.key))
    });

    let mut total = total_bytes;
    let mut evict = Vec::new();
    for candidate in lru {
        if total <= capacity {
            break;
        }
        total = total.saturating_sub(candidate.size_bytes);
        evict.push(candidate.key.clone());
    }
    evict
}

//! Memoisation of expected-return and covariance estimates.
//!
//! Entries are keyed by a SHA-256 digest of the canonical JSON of
//! (universe, model with parameters, window, covariance settings). Each key
//! owns a `OnceLock` cell: the first caller computes, concurrent callers for
//! the same key block on that cell instead of recomputing. Failures are
//! handed to everyone waiting on the cell and then evicted, so a later
//! request retries.

use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use super::Estimates;
use crate::expected_returns::ReturnModel;
use crate::risk_model::CovarianceSettings;
use crate::types::{Asset, EstimationWindow};
use crate::MeridianResult;

pub const DEFAULT_CACHE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(
        universe: &[Asset],
        model: &ReturnModel,
        window: &EstimationWindow,
        settings: &CovarianceSettings,
    ) -> MeridianResult<Self> {
        let payload = serde_json::to_vec(&(universe, model, window, settings))?;
        Ok(Self(hex::encode(Sha256::digest(&payload))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

type Cell = Arc<OnceLock<MeridianResult<Arc<Estimates>>>>;

#[derive(Default)]
struct Entries {
    cells: HashMap<CacheKey, Cell>,
    /// Insertion order, oldest first.
    order: VecDeque<CacheKey>,
}

pub struct EstimateCache {
    entries: Mutex<Entries>,
    capacity: usize,
}

impl Default for EstimateCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl EstimateCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut entries = self.lock();
        entries.cells.clear();
        entries.order.clear();
    }

    /// Return the cached estimates for `key`, running `compute` only if no
    /// other caller has produced (or is producing) them.
    pub fn get_or_compute<F>(&self, key: CacheKey, compute: F) -> MeridianResult<Arc<Estimates>>
    where
        F: FnOnce() -> MeridianResult<Estimates>,
    {
        let cell = self.cell_for(&key);

        let mut computed = false;
        let outcome = cell
            .get_or_init(|| {
                computed = true;
                compute().map(Arc::new)
            })
            .clone();
        tracing::debug!(key = key.as_str(), hit = !computed, "estimate cache lookup");

        if outcome.is_err() {
            let mut entries = self.lock();
            let same_cell = entries.cells.get(&key).is_some_and(|c| Arc::ptr_eq(c, &cell));
            if same_cell {
                entries.cells.remove(&key);
                entries.order.retain(|k| k != &key);
            }
        }
        outcome
    }

    /// Fetch or insert the cell for `key`; the map lock is released before
    /// any computation runs.
    fn cell_for(&self, key: &CacheKey) -> Cell {
        let mut entries = self.lock();
        if let Some(cell) = entries.cells.get(key) {
            return Arc::clone(cell);
        }
        let cell: Cell = Arc::new(OnceLock::new());
        entries.cells.insert(key.clone(), Arc::clone(&cell));
        entries.order.push_back(key.clone());
        while entries.order.len() > self.capacity {
            if let Some(oldest) = entries.order.pop_front() {
                entries.cells.remove(&oldest);
            }
        }
        cell
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

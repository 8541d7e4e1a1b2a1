use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::core::suppress_tracking;

/// Registry used by [`TrackingAllocator`](crate::TrackingAllocator) unless it
/// was built with its own. Const-initialized, so it exists before the first
/// allocation of the process and never needs lazy setup.
static REGISTRY: Registry = Registry::new();

/// The process-wide registry.
#[inline]
pub fn global() -> &'static Registry {
    &REGISTRY
}

/// One live heap block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllocationRecord {
    /// Start address of the block.
    pub address: usize,
    /// Exact size requested by the allocating call.
    pub size: usize,
}

impl AllocationRecord {
    pub const fn new(address: usize, size: usize) -> Self {
        Self { address, size }
    }

    /// One past the last byte of the block.
    #[inline]
    pub const fn end(&self) -> usize {
        self.address.saturating_add(self.size)
    }
}

/// Why a record could not be stored. The allocation it describes is still
/// valid, it is just not tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("record storage could not grow")]
    StorageExhausted,
    #[error("registry limit of {limit} records reached")]
    LimitReached { limit: usize },
}

/// Heuristic reading of [`Registry::fragmentation_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FragmentationLevel {
    /// Index below 0.2.
    Acceptable,
    /// Index between 0.2 and 0.8.
    Concerning,
    /// Index above 0.8.
    Severe,
}

impl FragmentationLevel {
    pub fn from_index(index: f64) -> Self {
        if index < 0.2 {
            FragmentationLevel::Acceptable
        } else if index <= 0.8 {
            FragmentationLevel::Concerning
        } else {
            FragmentationLevel::Severe
        }
    }
}

impl fmt::Display for FragmentationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FragmentationLevel::Acceptable => write!(f, "acceptable"),
            FragmentationLevel::Concerning => write!(f, "concerning"),
            FragmentationLevel::Severe => write!(f, "severe"),
        }
    }
}

/// Every metric of a registry, taken under a single lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeapStats {
    pub live_records: usize,
    pub total_allocated: usize,
    /// Bytes from the lowest live address to the end of the highest block.
    pub span: usize,
    pub fragmentation_index: f64,
    pub largest_free_block: usize,
    /// Inserts rejected since the registry was created.
    pub dropped_records: u64,
}

impl HeapStats {
    pub fn fragmentation_level(&self) -> FragmentationLevel {
        FragmentationLevel::from_index(self.fragmentation_index)
    }
}

struct Records {
    /// Strictly ascending by address. Its length is the record count.
    entries: Vec<AllocationRecord>,
    dropped: u64,
}

/// Address-ordered set of live allocations.
///
/// All reads and writes go through one mutex. Methods that may allocate
/// suppress tracking on the calling thread first, so a registry installed
/// behind the global allocator never re-enters itself.
pub struct Registry {
    records: Mutex<Records>,
    limit: Option<usize>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub const fn new() -> Self {
        Self {
            records: Mutex::new(Records {
                entries: Vec::new(),
                dropped: 0,
            }),
            limit: None,
        }
    }

    /// A registry that stops recording once `limit` records are live.
    pub const fn with_limit(limit: usize) -> Self {
        Self {
            records: Mutex::new(Records {
                entries: Vec::new(),
                dropped: 0,
            }),
            limit: Some(limit),
        }
    }

    // Tracking must never panic inside the allocator, so poisoning is ignored.
    #[inline]
    fn lock(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a block starting at `address`.
    ///
    /// A record already present at `address` is stale (its release was never
    /// observed) and is replaced, so the count does not change in that case.
    pub fn insert(&self, address: usize, size: usize) -> Result<(), RecordError> {
        let _untracked = suppress_tracking();
        let mut records = self.lock();

        let index = records.entries.partition_point(|r| r.address < address);
        if let Some(existing) = records.entries.get_mut(index) {
            if existing.address == address {
                existing.size = size;
                return Ok(());
            }
        }

        if let Some(limit) = self.limit {
            if records.entries.len() >= limit {
                records.dropped += 1;
                return Err(RecordError::LimitReached { limit });
            }
        }

        if records.entries.try_reserve(1).is_err() {
            records.dropped += 1;
            return Err(RecordError::StorageExhausted);
        }

        records
            .entries
            .insert(index, AllocationRecord::new(address, size));
        Ok(())
    }

    /// Removes the record starting at `address`. Unknown addresses are
    /// ignored.
    pub fn remove(&self, address: usize) -> Option<AllocationRecord> {
        let mut records = self.lock();
        let index = records
            .entries
            .binary_search_by_key(&address, |r| r.address)
            .ok()?;
        Some(records.entries.remove(index))
    }

    /// Size of the block starting at `address`, if it is live.
    pub fn get(&self, address: usize) -> Option<usize> {
        let records = self.lock();
        records
            .entries
            .binary_search_by_key(&address, |r| r.address)
            .ok()
            .map(|index| records.entries[index].size)
    }

    pub fn contains(&self, address: usize) -> bool {
        self.get(address).is_some()
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts rejected so far.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Copy of the live records in address order.
    pub fn records(&self) -> Vec<AllocationRecord> {
        let _untracked = suppress_tracking();
        self.lock().entries.clone()
    }

    /// The `n` biggest live records, biggest first.
    pub fn largest_records(&self, n: usize) -> Vec<AllocationRecord> {
        let _untracked = suppress_tracking();
        let mut records = self.records();
        records.sort_unstable_by(|a, b| b.size.cmp(&a.size).then(a.address.cmp(&b.address)));
        records.truncate(n);
        records
    }

    /// Sum of the sizes of all live records.
    pub fn total_allocated(&self) -> usize {
        total_of(&self.lock().entries)
    }

    /// `1 - live bytes / span`, where the span runs from the lowest live
    /// address to the end of the highest block. `0.0` with fewer than two
    /// records or an empty span.
    ///
    /// Below 0.2 is generally fine, around 0.5 is worrying, above 0.8 is
    /// severe.
    pub fn fragmentation_index(&self) -> f64 {
        fragmentation_of(&self.lock().entries)
    }

    /// Largest gap, in bytes, between the end of one live block and the start
    /// of the next one. Space below the first and above the last block is not
    /// considered.
    pub fn largest_free_block(&self) -> usize {
        largest_gap_of(&self.lock().entries)
    }

    pub fn stats(&self) -> HeapStats {
        let records = self.lock();
        let entries = &records.entries;
        HeapStats {
            live_records: entries.len(),
            total_allocated: total_of(entries),
            span: span_of(entries),
            fragmentation_index: fragmentation_of(entries),
            largest_free_block: largest_gap_of(entries),
            dropped_records: records.dropped,
        }
    }
}

fn total_of(entries: &[AllocationRecord]) -> usize {
    entries.iter().map(|r| r.size).sum()
}

fn span_of(entries: &[AllocationRecord]) -> usize {
    match (entries.first(), entries.last()) {
        (Some(first), Some(last)) => last.end().saturating_sub(first.address),
        _ => 0,
    }
}

fn fragmentation_of(entries: &[AllocationRecord]) -> f64 {
    if entries.len() < 2 {
        return 0.0;
    }

    let span = span_of(entries);
    if span == 0 {
        return 0.0;
    }

    // Only overlapping records can push the ratio above 1.
    (1.0 - total_of(entries) as f64 / span as f64).max(0.0)
}

fn largest_gap_of(entries: &[AllocationRecord]) -> usize {
    entries
        .windows(2)
        .map(|pair| pair[1].address.saturating_sub(pair[0].end()))
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(records: &[(usize, usize)]) -> Registry {
        let registry = Registry::new();
        for &(address, size) in records {
            registry.insert(address, size).unwrap();
        }
        registry
    }

    fn addresses(registry: &Registry) -> Vec<usize> {
        registry.records().iter().map(|r| r.address).collect()
    }

    #[test]
    fn test_insert_keeps_address_order() {
        let registry = registry_with(&[(500, 1), (100, 1), (300, 1), (50, 1), (900, 1), (400, 1)]);

        assert_eq!(addresses(&registry), vec![50, 100, 300, 400, 500, 900]);
        assert_eq!(registry.len(), 6);
    }

    #[test]
    fn test_order_and_count_hold_after_mixed_operations() {
        let registry = Registry::new();
        let mut live = std::collections::BTreeMap::new();

        // Deterministic pseudo-random walk over a small address space.
        let mut state = 0x2545_f491_u64;
        for _ in 0..2_000 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let address = (state % 256) as usize * 16;
            let size = (state >> 32) as usize % 64 + 1;

            if live.contains_key(&address) {
                assert_eq!(registry.remove(address).map(|r| r.size), live.remove(&address));
            } else {
                registry.insert(address, size).unwrap();
                live.insert(address, size);
            }

            assert_eq!(registry.len(), live.len());
        }

        let records = registry.records();
        assert!(records.windows(2).all(|w| w[0].address < w[1].address));
        assert_eq!(
            records.iter().map(|r| (r.address, r.size)).collect::<Vec<_>>(),
            live.iter().map(|(a, s)| (*a, *s)).collect::<Vec<_>>()
        );
        assert_eq!(registry.total_allocated(), live.values().sum::<usize>());
    }

    #[test]
    fn test_total_allocated_tracks_live_sizes() {
        let registry = registry_with(&[(0x1000, 40), (0x2000, 100), (0x3000, 64)]);
        assert_eq!(registry.total_allocated(), 204);

        registry.remove(0x2000);
        assert_eq!(registry.total_allocated(), 104);
    }

    #[test]
    fn test_remove_unknown_address_is_noop() {
        let registry = registry_with(&[(100, 10), (200, 10)]);

        assert!(registry.remove(150).is_none());
        assert!(registry.remove(0).is_none());
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.total_allocated(), 20);
    }

    #[test]
    fn test_double_remove_is_noop() {
        let registry = registry_with(&[(100, 10), (200, 20)]);

        assert_eq!(registry.remove(200), Some(AllocationRecord::new(200, 20)));
        assert_eq!(registry.remove(200), None);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.total_allocated(), 10);
    }

    #[test]
    fn test_reinsert_after_release() {
        let registry = registry_with(&[(100, 10)]);
        registry.remove(100);
        registry.insert(100, 32).unwrap();

        assert_eq!(registry.get(100), Some(32));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_stale_record_is_replaced() {
        let registry = registry_with(&[(100, 10), (200, 10)]);
        registry.insert(100, 48).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(100), Some(48));
        assert_eq!(addresses(&registry), vec![100, 200]);
    }

    #[test]
    fn test_degenerate_metrics() {
        let empty = Registry::new();
        assert_eq!(empty.fragmentation_index(), 0.0);
        assert_eq!(empty.largest_free_block(), 0);
        assert_eq!(empty.total_allocated(), 0);

        let single = registry_with(&[(4096, 128)]);
        assert_eq!(single.fragmentation_index(), 0.0);
        assert_eq!(single.largest_free_block(), 0);
        assert_eq!(single.total_allocated(), 128);
    }

    #[test]
    fn test_largest_free_block_and_index_after_removing_middle() {
        let registry = registry_with(&[(100, 10), (200, 10), (300, 10)]);
        assert_eq!(registry.largest_free_block(), 90);
        let before = registry.fragmentation_index();

        registry.remove(200);
        assert_eq!(registry.largest_free_block(), 190);
        let after = registry.fragmentation_index();

        assert!(after > before, "{after} should exceed {before}");
        assert!((before - (1.0 - 30.0 / 210.0)).abs() < 1e-12);
        assert!((after - (1.0 - 20.0 / 210.0)).abs() < 1e-12);
    }

    #[test]
    fn test_adjacent_and_overlapping_records_do_not_underflow() {
        let adjacent = registry_with(&[(100, 50), (150, 50), (200, 50)]);
        assert_eq!(adjacent.largest_free_block(), 0);
        assert_eq!(adjacent.fragmentation_index(), 0.0);

        let overlapping = registry_with(&[(100, 80), (120, 10), (400, 4)]);
        assert_eq!(overlapping.largest_free_block(), 270);

        let fully_overlapping = registry_with(&[(100, 500), (200, 10)]);
        assert_eq!(fully_overlapping.largest_free_block(), 0);
        let index = fully_overlapping.fragmentation_index();
        assert!((0.0..1.0).contains(&index));
    }

    #[test]
    fn test_limit_rejects_and_counts() {
        let registry = Registry::with_limit(2);
        registry.insert(100, 1).unwrap();
        registry.insert(200, 1).unwrap();

        assert_eq!(
            registry.insert(300, 1),
            Err(RecordError::LimitReached { limit: 2 })
        );
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.dropped(), 1);

        // Replacing a stale record does not need a new slot.
        assert!(registry.insert(100, 7).is_ok());
        assert_eq!(registry.dropped(), 1);
    }

    #[test]
    fn test_stats_snapshot() {
        let registry = registry_with(&[(1000, 100), (1500, 100), (3000, 1000)]);
        let stats = registry.stats();

        assert_eq!(stats.live_records, 3);
        assert_eq!(stats.total_allocated, 1200);
        assert_eq!(stats.span, 3000);
        assert_eq!(stats.largest_free_block, 1400);
        assert_eq!(stats.dropped_records, 0);
        assert!((stats.fragmentation_index - 0.6).abs() < 1e-12);
        assert_eq!(stats.fragmentation_level(), FragmentationLevel::Concerning);
    }

    #[test]
    fn test_largest_records() {
        let registry = registry_with(&[(100, 8), (200, 64), (300, 16), (400, 64)]);
        let largest = registry.largest_records(3);

        assert_eq!(
            largest,
            vec![
                AllocationRecord::new(200, 64),
                AllocationRecord::new(400, 64),
                AllocationRecord::new(300, 16),
            ]
        );
        assert!(registry.largest_records(0).is_empty());
    }

    #[test]
    fn test_fragmentation_level_bands() {
        assert_eq!(FragmentationLevel::from_index(0.0), FragmentationLevel::Acceptable);
        assert_eq!(FragmentationLevel::from_index(0.19), FragmentationLevel::Acceptable);
        assert_eq!(FragmentationLevel::from_index(0.5), FragmentationLevel::Concerning);
        assert_eq!(FragmentationLevel::from_index(0.8), FragmentationLevel::Concerning);
        assert_eq!(FragmentationLevel::from_index(0.95), FragmentationLevel::Severe);
    }

    #[test]
    fn test_concurrent_disjoint_inserts() {
        let registry = Registry::new();

        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..500 {
                    registry.insert(i * 64, 16).unwrap();
                }
            });
            s.spawn(|| {
                for i in 0..500 {
                    registry.insert(i * 64 + 32, 8).unwrap();
                }
            });
        });

        assert_eq!(registry.len(), 1000);
        assert_eq!(registry.total_allocated(), 500 * 16 + 500 * 8);
        let records = registry.records();
        assert!(records.windows(2).all(|w| w[0].address < w[1].address));
        assert_eq!(registry.largest_free_block(), 24);
    }
}

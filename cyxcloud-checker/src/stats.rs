//! Stats aggregator
//!
//! Per-(redundancy, placement) iteration statistics, bucketed by the
//! effective redundancy key and placement tag. Each Partial owns a
//! local aggregator and merges it into the driver-owned totals on
//! Join, the same "accumulate locally, merge under a lock at the join
//! point" shape `Executor::node_semaphores` uses for its lazily
//! created per-key state.

use std::collections::HashMap;
use std::collections::HashSet;

use crate::redundancy::RedundancyKey;

/// Per-iteration counters for one (redundancy, placement) bucket.
///
/// `objects_lost` is a deduped set of stream-ids scoped to this bucket
/// (a segment's stream can recur across positions; the object itself
/// should only be counted once per bucket).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BucketStats {
    pub segments_checked: u64,
    pub segments_healthy: u64,
    pub segments_injured: u64,
    pub segments_forcing_repair: u64,
    pub segments_clumped_only: u64,
    pub segments_lost: u64,
    pub segments_failed_to_check: u64,
    pub new_segments_needing_repair: u64,
    pub healthy_piece_total: u64,
    pub objects_checked: u64,
    pub objects_lost: HashSet<[u8; 16]>,
    /// Counts of healthy-but-not-repaired segments landing exactly
    /// `r+1 ..= r+5` above the repair threshold, indexed 0..5.
    pub over_threshold: [u64; 5],
}

impl BucketStats {
    fn merge(&mut self, other: &BucketStats) {
        self.segments_checked += other.segments_checked;
        self.segments_healthy += other.segments_healthy;
        self.segments_injured += other.segments_injured;
        self.segments_forcing_repair += other.segments_forcing_repair;
        self.segments_clumped_only += other.segments_clumped_only;
        self.segments_lost += other.segments_lost;
        self.segments_failed_to_check += other.segments_failed_to_check;
        self.new_segments_needing_repair += other.new_segments_needing_repair;
        self.healthy_piece_total += other.healthy_piece_total;
        self.objects_checked += other.objects_checked;
        self.objects_lost.extend(other.objects_lost.iter().copied());
        for i in 0..5 {
            self.over_threshold[i] += other.over_threshold[i];
        }
    }
}

/// Bounded-cardinality stats table, keyed by (redundancy key,
/// placement). A scan with a runaway number of distinct schemes
/// degrades gracefully: once `max_buckets` is reached, further novel
/// keys are folded into a shared overflow bucket rather than growing
/// the table unbounded.
#[derive(Debug, Clone)]
pub struct TotalStats {
    buckets: HashMap<(RedundancyKey, u16), BucketStats>,
    max_buckets: usize,
    overflow: BucketStats,
    overflow_keys: u64,
}

impl TotalStats {
    pub fn new(max_buckets: usize) -> Self {
        Self {
            buckets: HashMap::new(),
            max_buckets: max_buckets.max(1),
            overflow: BucketStats::default(),
            overflow_keys: 0,
        }
    }

    pub fn record(&mut self, redundancy: RedundancyKey, placement: u16, delta: BucketStats) {
        let key = (redundancy, placement);
        if self.buckets.contains_key(&key) || self.buckets.len() < self.max_buckets {
            self.buckets.entry(key).or_default().merge(&delta);
        } else {
            self.overflow_keys += 1;
            self.overflow.merge(&delta);
        }
    }

    /// Merge another `TotalStats` (e.g. a Partial's local totals) into
    /// this one. Commutative and associative, so Join order never
    /// matters.
    pub fn merge(&mut self, other: &TotalStats) {
        for (key, stats) in &other.buckets {
            if self.buckets.contains_key(key) || self.buckets.len() < self.max_buckets {
                self.buckets.entry(*key).or_default().merge(stats);
            } else {
                self.overflow_keys += 1;
                self.overflow.merge(stats);
            }
        }
        self.overflow.merge(&other.overflow);
        self.overflow_keys += other.overflow_keys;
    }

    pub fn bucket(&self, redundancy: RedundancyKey, placement: u16) -> Option<&BucketStats> {
        self.buckets.get(&(redundancy, placement))
    }

    pub fn overflow(&self) -> &BucketStats {
        &self.overflow
    }

    pub fn overflow_key_count(&self) -> u64 {
        self.overflow_keys
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn total_checked(&self) -> u64 {
        self.buckets
            .values()
            .map(|b| b.segments_checked)
            .sum::<u64>()
            + self.overflow.segments_checked
    }

    pub fn total_injured(&self) -> u64 {
        self.buckets
            .values()
            .map(|b| b.segments_injured)
            .sum::<u64>()
            + self.overflow.segments_injured
    }

    pub fn total_lost(&self) -> u64 {
        self.buckets.values().map(|b| b.segments_lost).sum::<u64>() + self.overflow.segments_lost
    }

    pub fn total_failed_to_check(&self) -> u64 {
        self.buckets
            .values()
            .map(|b| b.segments_failed_to_check)
            .sum::<u64>()
            + self.overflow.segments_failed_to_check
    }

    pub fn total_new_needing_repair(&self) -> u64 {
        self.buckets
            .values()
            .map(|b| b.new_segments_needing_repair)
            .sum::<u64>()
            + self.overflow.new_segments_needing_repair
    }

    /// Count of distinct objects (stream-ids) lost, across every
    /// bucket and the overflow bucket.
    pub fn total_objects_lost(&self) -> usize {
        let mut all: HashSet<[u8; 16]> = HashSet::new();
        for bucket in self.buckets.values() {
            all.extend(bucket.objects_lost.iter().copied());
        }
        all.extend(self.overflow.objects_lost.iter().copied());
        all.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(RedundancyKey, u16), &BucketStats)> {
        self.buckets.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> RedundancyKey {
        RedundancyKey { k: 2, r: 3, o: 4, n: 5 }
    }

    #[test]
    fn test_record_accumulates() {
        let mut stats = TotalStats::new(16);
        stats.record(
            key(),
            0,
            BucketStats {
                segments_checked: 1,
                segments_healthy: 1,
                ..Default::default()
            },
        );
        stats.record(
            key(),
            0,
            BucketStats {
                segments_checked: 1,
                segments_injured: 1,
                ..Default::default()
            },
        );
        let bucket = stats.bucket(key(), 0).unwrap();
        assert_eq!(bucket.segments_checked, 2);
        assert_eq!(bucket.segments_healthy, 1);
        assert_eq!(bucket.segments_injured, 1);
    }

    #[test]
    fn test_merge_is_commutative() {
        let mut a = TotalStats::new(16);
        a.record(key(), 0, BucketStats { segments_checked: 3, ..Default::default() });
        let mut b = TotalStats::new(16);
        b.record(key(), 0, BucketStats { segments_checked: 5, ..Default::default() });

        let mut merged_ab = a.clone();
        merged_ab.merge(&b);
        let mut merged_ba = b.clone();
        merged_ba.merge(&a);

        assert_eq!(merged_ab.total_checked(), merged_ba.total_checked());
        assert_eq!(merged_ab.total_checked(), 8);
    }

    #[test]
    fn test_overflow_bucket_on_cardinality_limit() {
        let mut stats = TotalStats::new(1);
        stats.record(
            RedundancyKey { k: 2, r: 3, o: 4, n: 5 },
            0,
            BucketStats { segments_checked: 1, ..Default::default() },
        );
        stats.record(
            RedundancyKey { k: 4, r: 6, o: 8, n: 10 },
            0,
            BucketStats { segments_checked: 1, ..Default::default() },
        );
        assert_eq!(stats.bucket_count(), 1);
        assert_eq!(stats.overflow().segments_checked, 1);
        assert_eq!(stats.overflow_key_count(), 1);
        assert_eq!(stats.total_checked(), 2);
    }

    #[test]
    fn test_objects_lost_dedup_within_bucket() {
        let mut stats = TotalStats::new(16);
        let mut lost = HashSet::new();
        lost.insert([7u8; 16]);
        stats.record(
            key(),
            0,
            BucketStats {
                segments_lost: 1,
                objects_lost: lost.clone(),
                ..Default::default()
            },
        );
        stats.record(
            key(),
            0,
            BucketStats {
                segments_lost: 1,
                objects_lost: lost,
                ..Default::default()
            },
        );
        let bucket = stats.bucket(key(), 0).unwrap();
        assert_eq!(bucket.segments_lost, 2);
        assert_eq!(bucket.objects_lost.len(), 1);
        assert_eq!(stats.total_lost(), 2);
        assert_eq!(stats.total_objects_lost(), 1);
    }

    #[test]
    fn test_over_threshold_merges_elementwise() {
        let mut a = TotalStats::new(16);
        let mut bucket = BucketStats::default();
        bucket.over_threshold[0] = 2;
        bucket.over_threshold[4] = 1;
        a.record(key(), 0, bucket);

        let mut bucket2 = BucketStats::default();
        bucket2.over_threshold[0] = 3;
        a.record(key(), 0, bucket2);

        let result = a.bucket(key(), 0).unwrap();
        assert_eq!(result.over_threshold, [5, 0, 0, 0, 1]);
    }

    #[test]
    fn test_merge_preserves_overflow() {
        let mut a = TotalStats::new(1);
        a.record(RedundancyKey { k: 2, r: 3, o: 4, n: 5 }, 0, BucketStats { segments_checked: 1, ..Default::default() });
        a.record(RedundancyKey { k: 4, r: 6, o: 8, n: 10 }, 0, BucketStats { segments_checked: 2, ..Default::default() });

        let mut total = TotalStats::new(16);
        total.merge(&a);
        assert_eq!(total.total_checked(), 3);
    }
}

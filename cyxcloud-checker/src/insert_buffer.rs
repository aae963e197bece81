//! Insert buffer
//!
//! Batches injured-segment records before handing them to the repair
//! queue, the same batching discipline `RepairPlan::add_task` uses for
//! rebalancer tasks: accumulate, flush at a size threshold, flush
//! whatever remains on close.

use tracing::{debug, instrument};

use crate::error::{CheckerError, Result};
use crate::redundancy::RedundancyKey;
use crate::repair_queue::{InjuredSegment, RepairQueue};

/// Buffers injured segments and flushes them to a `RepairQueue` in
/// batches of `batch_size`. `insert`/`flush` return the
/// (redundancy, placement) bucket of every segment the queue reported
/// as newly added (as opposed to a re-queue of an already-present
/// entry) in that call, so callers can attribute
/// `new_remote_segments_needing_repair` to the right bucket.
pub struct InsertBuffer<Q: RepairQueue> {
    queue: Q,
    batch_size: usize,
    buffer: Vec<InjuredSegment>,
    total_inserted: u64,
    total_newly_inserted: u64,
    on_first_insertion: Option<Box<dyn Fn() + Send + Sync>>,
    fired_first_insertion: bool,
}

impl<Q: RepairQueue> InsertBuffer<Q> {
    pub fn new(queue: Q, batch_size: usize) -> Self {
        Self {
            queue,
            batch_size: batch_size.max(1),
            buffer: Vec::with_capacity(batch_size.max(1)),
            total_inserted: 0,
            total_newly_inserted: 0,
            on_first_insertion: None,
            fired_first_insertion: false,
        }
    }

    /// Install a callback fired exactly once, the first time the
    /// queue reports a segment as newly added (not a re-queue of an
    /// already-present item). Used by the driver to flip a metric the
    /// moment the iteration finds its first genuinely new repair.
    pub fn on_first_insertion<F: Fn() + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_first_insertion = Some(Box::new(f));
        self
    }

    pub fn total_inserted(&self) -> u64 {
        self.total_inserted
    }

    pub fn total_newly_inserted(&self) -> u64 {
        self.total_newly_inserted
    }

    #[instrument(skip(self, segment), fields(stream_id = %hex::encode(segment.stream_id)))]
    pub async fn insert(&mut self, segment: InjuredSegment) -> Result<Vec<(RedundancyKey, u16)>> {
        self.buffer.push(segment);
        if self.buffer.len() >= self.batch_size {
            self.flush().await
        } else {
            Ok(Vec::new())
        }
    }

    #[instrument(skip(self))]
    pub async fn flush(&mut self) -> Result<Vec<(RedundancyKey, u16)>> {
        if self.buffer.is_empty() {
            return Ok(Vec::new());
        }
        let count = self.buffer.len();
        let flags = self
            .queue
            .insert_batch(&self.buffer)
            .await
            .map_err(|e| CheckerError::QueueUnavailable(e.to_string()))?;
        debug_assert_eq!(flags.len(), count);

        let newly: Vec<(RedundancyKey, u16)> = self
            .buffer
            .iter()
            .zip(flags.iter())
            .filter(|(_, &is_new)| is_new)
            .map(|(seg, _)| (seg.redundancy, seg.placement))
            .collect();

        self.total_inserted += count as u64;
        self.total_newly_inserted += newly.len() as u64;
        if !newly.is_empty() && !self.fired_first_insertion {
            self.fired_first_insertion = true;
            if let Some(cb) = &self.on_first_insertion {
                cb();
            }
        }

        debug!(
            count,
            new = newly.len(),
            total = self.total_inserted,
            "flushed insert buffer"
        );
        self.buffer.clear();
        Ok(newly)
    }

    pub fn into_queue(self) -> Q {
        self.queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redundancy::RedundancyKey;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeQueue {
        flushes: AtomicUsize,
        total: AtomicU64,
        /// When true, every record reports as newly inserted; when
        /// false, every record reports as a re-queue.
        all_new: bool,
    }

    #[async_trait::async_trait]
    impl RepairQueue for FakeQueue {
        async fn insert_batch(
            &self,
            segments: &[InjuredSegment],
        ) -> std::result::Result<Vec<bool>, Box<dyn std::error::Error + Send + Sync>> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            self.total.fetch_add(segments.len() as u64, Ordering::SeqCst);
            Ok(vec![self.all_new; segments.len()])
        }

        async fn clean(
            &self,
            _started_at: chrono::DateTime<chrono::Utc>,
        ) -> std::result::Result<u64, Box<dyn std::error::Error + Send + Sync>> {
            Ok(0)
        }
    }

    fn segment(pos: u64) -> InjuredSegment {
        InjuredSegment {
            stream_id: [1u8; 16],
            position: pos,
            redundancy: RedundancyKey { k: 2, r: 3, o: 4, n: 5 },
            placement: 0,
            health_score: 0.1,
            healthy_piece_count: 2,
            forcing_repair: false,
        }
    }

    #[tokio::test]
    async fn test_flushes_at_batch_size() {
        let queue = Arc::new(FakeQueue {
            flushes: AtomicUsize::new(0),
            total: AtomicU64::new(0),
            all_new: true,
        });
        let mut buf = InsertBuffer::new(queue.clone(), 2);
        buf.insert(segment(1)).await.unwrap();
        assert_eq!(queue.flushes.load(Ordering::SeqCst), 0);
        buf.insert(segment(2)).await.unwrap();
        assert_eq!(queue.flushes.load(Ordering::SeqCst), 1);
        assert_eq!(buf.total_inserted(), 2);
        assert_eq!(buf.total_newly_inserted(), 2);
    }

    #[tokio::test]
    async fn test_flush_drains_partial_batch() {
        let queue = Arc::new(FakeQueue {
            flushes: AtomicUsize::new(0),
            total: AtomicU64::new(0),
            all_new: true,
        });
        let mut buf = InsertBuffer::new(queue.clone(), 10);
        buf.insert(segment(1)).await.unwrap();
        buf.flush().await.unwrap();
        assert_eq!(queue.flushes.load(Ordering::SeqCst), 1);
        assert_eq!(queue.total.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_flush_on_empty_buffer_is_noop() {
        let queue = Arc::new(FakeQueue {
            flushes: AtomicUsize::new(0),
            total: AtomicU64::new(0),
            all_new: true,
        });
        let mut buf = InsertBuffer::new(queue.clone(), 10);
        buf.flush().await.unwrap();
        assert_eq!(queue.flushes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_on_first_insertion_fires_only_for_genuinely_new_records() {
        let queue = Arc::new(FakeQueue {
            flushes: AtomicUsize::new(0),
            total: AtomicU64::new(0),
            all_new: false,
        });
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        let mut buf = InsertBuffer::new(queue, 10).on_first_insertion(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });
        buf.insert(segment(1)).await.unwrap();
        let newly = buf.flush().await.unwrap();
        assert!(newly.is_empty());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_on_first_insertion_fires_once_for_new_records() {
        let queue = Arc::new(FakeQueue {
            flushes: AtomicUsize::new(0),
            total: AtomicU64::new(0),
            all_new: true,
        });
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        let mut buf = InsertBuffer::new(queue, 10).on_first_insertion(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });
        let newly = buf.insert(segment(1)).await.unwrap();
        assert!(newly.is_empty()); // buffered, not yet flushed
        buf.insert(segment(2)).await.unwrap();
        buf.flush().await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(buf.total_newly_inserted(), 2);
    }
}

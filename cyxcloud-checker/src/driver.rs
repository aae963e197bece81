//! Ranged scan driver
//!
//! Owns one full scan iteration's lifecycle: `Start` splits the
//! segment table into ranges and opens the iteration, `Fork` spawns a
//! Partial task per range (mirrors `Executor::execute`'s
//! `tokio::spawn` + `JoinHandle` collection), `Join` waits for every
//! Partial and merges its stats, `Finish` cleans the repair queue of
//! rows the iteration didn't touch and publishes the iteration's
//! summary metrics.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::config::CheckerConfig;
use crate::error::{CheckerError, Result};
use crate::health::HealthMode;
use crate::metrics::CheckerMetrics;
use crate::partial::{PartialConfig, PartialProcessor};
use crate::redundancy::OverrideMap;
use crate::reliability::ReliabilityCache;
use crate::repair_queue::RepairQueue;
use crate::segment_source::SegmentSource;
use crate::stats::TotalStats;

/// Driver lifecycle state. A fresh driver starts `Idle`; `Start` moves
/// it to `Running`, `Finish` moves it through `Finalizing` back to
/// `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Running,
    Finalizing,
}

/// An in-progress iteration: the forked Partial handles and the time
/// the iteration started, needed by `Finish` to clean the repair
/// queue of stale rows.
pub struct Iteration {
    started_at: DateTime<Utc>,
    started_instant: Instant,
    handles: Vec<JoinHandle<Result<TotalStats>>>,
}

pub struct ScanDriver {
    segment_source: Arc<dyn SegmentSource>,
    reliability: Arc<ReliabilityCache>,
    repair_queue: Arc<dyn RepairQueue>,
    overrides: Arc<OverrideMap>,
    config: CheckerConfig,
    metrics: CheckerMetrics,
    state: DriverState,
    cancellation: CancellationToken,
}

impl ScanDriver {
    pub fn new(
        segment_source: Arc<dyn SegmentSource>,
        reliability: Arc<ReliabilityCache>,
        repair_queue: Arc<dyn RepairQueue>,
        overrides: Arc<OverrideMap>,
        config: CheckerConfig,
        metrics: CheckerMetrics,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            segment_source,
            reliability,
            repair_queue,
            overrides,
            config,
            metrics,
            state: DriverState::Idle,
            cancellation,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    fn num_partials(&self) -> usize {
        self.config.num_partials.unwrap_or_else(|| (num_cpus::get() * 2).max(2))
    }

    /// Opens a new iteration: refreshes the reliability cache and
    /// splits the segment table into ranges.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> Result<Iteration> {
        if self.state != DriverState::Idle {
            return Err(CheckerError::Internal(format!(
                "start called from state {:?}, expected Idle",
                self.state
            )));
        }

        self.reliability.refresh().await?;
        self.metrics.iteration_started();

        let started_at = Utc::now();
        self.state = DriverState::Running;

        info!(num_partials = self.num_partials(), "iteration started");

        Ok(Iteration {
            started_at,
            started_instant: Instant::now(),
            handles: Vec::new(),
        })
    }

    /// Forks one Partial task per segment range.
    #[instrument(skip(self, iteration))]
    pub async fn fork(&self, iteration: &mut Iteration) -> Result<()> {
        if self.state != DriverState::Running {
            return Err(CheckerError::Internal(
                "fork called outside Running state".to_string(),
            ));
        }

        let ranges = self
            .segment_source
            .ranges(self.num_partials(), iteration.started_at)
            .await
            .map_err(|e| CheckerError::SegmentSource(e.to_string()))?;

        for range in ranges {
            let partial_config = PartialConfig {
                overrides: self.overrides.clone(),
                excluded_countries: self.config.excluded_country_codes(),
                health_mode: self.config.health_mode,
                per_iteration_failure_prob: self.config.per_iteration_failure_prob,
                segment_batch_size: self.config.segment_batch_size,
                max_stats_buckets: self.config.max_stats_buckets,
                do_declumping: self.config.do_declumping,
                do_placement_check: self.config.do_placement_check,
                dry_run: self.config.dry_run,
            };

            let processor = PartialProcessor::new(
                self.reliability.clone(),
                partial_config,
                self.repair_queue.clone(),
                self.config.insert_batch_size,
                self.metrics.clone(),
                self.cancellation.clone(),
            );

            iteration.handles.push(tokio::spawn(processor.run(range)));
        }

        Ok(())
    }

    /// Waits for every forked Partial and merges its stats into one
    /// iteration-wide total. A Partial failure whose error
    /// [`CheckerError::aborts_iteration`] propagates immediately and
    /// cancels the remaining Partials; other failures are logged and
    /// skipped so one bad range doesn't sink the whole scan.
    #[instrument(skip(self, iteration))]
    pub async fn join(&self, iteration: Iteration) -> Result<TotalStats> {
        let mut total = TotalStats::new(self.config.max_stats_buckets);

        for handle in iteration.handles {
            match handle.await {
                Ok(Ok(partial_stats)) => total.merge(&partial_stats),
                Ok(Err(err)) if err.aborts_iteration() => {
                    error!(error = %err, "partial failed with an iteration-aborting error");
                    self.cancellation.cancel();
                    return Err(err);
                }
                Ok(Err(err)) => {
                    warn!(error = %err, "partial failed, continuing with remaining ranges");
                }
                Err(join_err) => {
                    warn!(error = %join_err, "partial task panicked or was cancelled");
                }
            }
        }

        if total.overflow_key_count() > 0 {
            self.metrics.stats_overflow_buckets(total.overflow_key_count());
        }

        Ok(total)
    }

    /// Cleans repair-queue rows untouched by the iteration that just
    /// finished, publishes summary metrics, and returns to `Idle`.
    #[instrument(skip(self, started_at, stats))]
    pub async fn finish(
        &mut self,
        started_at: DateTime<Utc>,
        started_instant: Instant,
        stats: &TotalStats,
    ) -> Result<()> {
        self.state = DriverState::Finalizing;

        let removed = self
            .repair_queue
            .clean(started_at)
            .await
            .map_err(|e| CheckerError::QueueUnavailable(e.to_string()))?;
        self.metrics.repair_queue_cleaned(removed);
        self.metrics.healthy_segments_removed_from_queue(removed);

        let checked = stats.total_checked();
        let injured = stats.total_injured();
        let failed_to_check = stats.total_failed_to_check();
        let healthy_percentage = if checked == 0 {
            100.0
        } else {
            100.0 * (checked as f64 - (injured + failed_to_check) as f64) / checked as f64
        };

        for ((key, placement), bucket) in stats.iter() {
            let bucket_healthy_percentage = if bucket.segments_checked == 0 {
                100.0
            } else {
                100.0
                    * (bucket.segments_checked as f64
                        - (bucket.segments_injured + bucket.segments_failed_to_check) as f64)
                    / bucket.segments_checked as f64
            };
            self.metrics.bucket_finished(
                *placement,
                *key,
                bucket.objects_checked,
                bucket.segments_checked,
                bucket.segments_failed_to_check,
                bucket.segments_injured,
                bucket.segments_forcing_repair,
                bucket.new_segments_needing_repair,
                bucket.segments_lost,
                bucket.objects_lost.len() as u64,
                bucket.over_threshold,
                bucket_healthy_percentage,
            );
        }

        let duration_secs = started_instant.elapsed().as_secs_f64();
        self.metrics.iteration_completed(duration_secs, healthy_percentage);

        info!(
            checked,
            injured,
            healthy_percentage,
            duration_secs,
            removed_from_queue = removed,
            "iteration finished"
        );

        self.state = DriverState::Idle;
        Ok(())
    }

    /// Runs one full Start/Fork/Join/Finish cycle.
    #[instrument(skip(self))]
    pub async fn run_iteration(&mut self) -> Result<TotalStats> {
        let mut iteration = self.start().await?;
        let started_at = iteration.started_at;
        let started_instant = iteration.started_instant;

        self.fork(&mut iteration).await?;
        let stats = self.join(iteration).await?;
        self.finish(started_at, started_instant, &stats).await?;

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Piece;
    use crate::redundancy::RedundancyScheme;
    use crate::reliability::{NodeSnapshotEntry, OverlayClient, ReliabilityCacheConfig};
    use crate::repair_queue::InjuredSegment;
    use crate::segment_source::{SegmentPartial, SegmentRecord};
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeOverlay {
        nodes: Vec<[u8; 32]>,
    }

    #[async_trait::async_trait]
    impl OverlayClient for FakeOverlay {
        async fn reliable(
            &self,
            _online_window: Duration,
        ) -> std::result::Result<
            (Vec<([u8; 32], NodeSnapshotEntry)>, Vec<([u8; 32], NodeSnapshotEntry)>),
            Box<dyn std::error::Error + Send + Sync>,
        > {
            let entries = self
                .nodes
                .iter()
                .enumerate()
                .map(|(i, id)| {
                    (
                        *id,
                        NodeSnapshotEntry {
                            online: true,
                            exiting: false,
                            disqualified: false,
                            gracefully_exited: false,
                            country_code: *b"US",
                            last_net: i as u64,
                            placement: 0,
                        },
                    )
                })
                .collect();
            Ok((entries, Vec::new()))
        }

        async fn get_all_participating_nodes_for_repair(
            &self,
            online_window: Duration,
        ) -> std::result::Result<Vec<([u8; 32], NodeSnapshotEntry)>, Box<dyn std::error::Error + Send + Sync>>
        {
            let (a, b) = self.reliable(online_window).await?;
            Ok(a.into_iter().chain(b).collect())
        }
    }

    struct FakeQueue {
        inserted: AtomicUsize,
        cleaned: AtomicU64,
    }

    #[async_trait::async_trait]
    impl RepairQueue for FakeQueue {
        async fn insert_batch(
            &self,
            segments: &[InjuredSegment],
        ) -> std::result::Result<Vec<bool>, Box<dyn std::error::Error + Send + Sync>> {
            self.inserted.fetch_add(segments.len(), Ordering::SeqCst);
            Ok(vec![true; segments.len()])
        }

        async fn clean(
            &self,
            _started_at: DateTime<Utc>,
        ) -> std::result::Result<u64, Box<dyn std::error::Error + Send + Sync>> {
            self.cleaned.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        }
    }

    struct OneShotRange {
        segments: Vec<SegmentRecord>,
        served: bool,
    }

    #[async_trait::async_trait]
    impl SegmentPartial for OneShotRange {
        async fn next_batch(
            &mut self,
            _batch_size: usize,
        ) -> std::result::Result<Vec<SegmentRecord>, Box<dyn std::error::Error + Send + Sync>>
        {
            if self.served {
                Ok(Vec::new())
            } else {
                self.served = true;
                Ok(self.segments.clone())
            }
        }
    }

    struct FakeSource {
        segments: Vec<SegmentRecord>,
    }

    #[async_trait::async_trait]
    impl SegmentSource for FakeSource {
        async fn ranges(
            &self,
            _count: usize,
            _as_of: DateTime<Utc>,
        ) -> std::result::Result<Vec<Box<dyn SegmentPartial>>, Box<dyn std::error::Error + Send + Sync>>
        {
            Ok(vec![Box::new(OneShotRange {
                segments: self.segments.clone(),
                served: false,
            })])
        }
    }

    fn healthy_segment() -> SegmentRecord {
        let pieces: Vec<Piece> = (0..5)
            .map(|n| Piece {
                piece_num: n,
                node_id: [n as u8 + 1; 32],
            })
            .collect();
        SegmentRecord {
            stream_id: [1u8; 16],
            position: 0,
            created_at: Utc::now(),
            scheme: RedundancyScheme::new(2, 3, 4, 5).unwrap(),
            placement: 0,
            pieces,
            inline: false,
            expires_at: None,
            repaired_at: None,
        }
    }

    async fn make_driver(segments: Vec<SegmentRecord>) -> (ScanDriver, Arc<FakeQueue>) {
        let nodes = (0..5).map(|n| [n as u8 + 1; 32]).collect();
        let reliability = Arc::new(ReliabilityCache::new(
            Arc::new(FakeOverlay { nodes }),
            ReliabilityCacheConfig::default(),
        ));
        let queue = Arc::new(FakeQueue {
            inserted: AtomicUsize::new(0),
            cleaned: AtomicU64::new(0),
        });
        let source = Arc::new(FakeSource { segments });

        let mut config = CheckerConfig::default();
        config.num_partials = Some(1);

        let driver = ScanDriver::new(
            source,
            reliability,
            queue.clone(),
            Arc::new(OverrideMap::new()),
            config,
            CheckerMetrics::new(),
            CancellationToken::new(),
        );
        (driver, queue)
    }

    #[tokio::test]
    async fn test_full_cycle_healthy_segment() {
        let (mut driver, queue) = make_driver(vec![healthy_segment()]).await;
        let stats = driver.run_iteration().await.unwrap();

        assert_eq!(stats.total_checked(), 1);
        assert_eq!(stats.total_injured(), 0);
        assert_eq!(queue.inserted.load(Ordering::SeqCst), 0);
        assert_eq!(queue.cleaned.load(Ordering::SeqCst), 1);
        assert_eq!(driver.state(), DriverState::Idle);
    }

    #[tokio::test]
    async fn test_fork_rejects_wrong_state() {
        let (driver, _queue) = make_driver(vec![]).await;
        let mut iteration = Iteration {
            started_at: Utc::now(),
            started_instant: Instant::now(),
            handles: Vec::new(),
        };
        assert!(driver.fork(&mut iteration).await.is_err());
    }

    #[tokio::test]
    async fn test_injured_segment_flows_to_queue() {
        let mut segment = healthy_segment();
        segment.scheme = RedundancyScheme::new(2, 3, 4, 5).unwrap();
        segment.pieces = vec![Piece {
            piece_num: 0,
            node_id: [1u8; 32],
        }];
        // total_nodes=1 via FakeOverlay; only piece 0 resolves, so
        // healthy_count=1 <= r=3 triggers repair.
        let (mut driver, queue) = make_driver(vec![segment]).await;
        let stats = driver.run_iteration().await.unwrap();
        assert_eq!(stats.total_injured(), 1);
        assert_eq!(queue.inserted.load(Ordering::SeqCst), 1);
    }
}

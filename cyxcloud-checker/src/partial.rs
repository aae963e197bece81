//! Partial processor
//!
//! Drives one range of the segment table to exhaustion: classify each
//! segment's pieces, score its health, decide whether it needs
//! repair, and feed the insert buffer and local stats. One instance
//! runs per forked task; its `TotalStats` is merged into the driver's
//! totals on Join.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use crate::classifier::{classify, Classification};
use crate::error::{CheckerError, Result};
use crate::health::{self, HealthInputs, HealthMode};
use crate::insert_buffer::InsertBuffer;
use crate::metrics::CheckerMetrics;
use crate::redundancy::{OverrideMap, RedundancyScheme};
use crate::reliability::ReliabilityCache;
use crate::repair_queue::{InjuredSegment, RepairQueue};
use crate::segment_source::{SegmentPartial, SegmentRecord};
use crate::stats::{BucketStats, TotalStats};

/// Everything a Partial needs that doesn't change segment-to-segment.
pub struct PartialConfig {
    pub overrides: Arc<OverrideMap>,
    pub excluded_countries: Vec<[u8; 2]>,
    pub health_mode: HealthMode,
    pub per_iteration_failure_prob: f64,
    pub segment_batch_size: usize,
    pub max_stats_buckets: usize,
    pub do_declumping: bool,
    pub do_placement_check: bool,
    pub dry_run: bool,
}

/// Outcome of processing a single segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Healthy,
    ClumpedOnly,
    Injured { forcing: bool },
}

pub struct PartialProcessor<Q: RepairQueue> {
    reliability: Arc<ReliabilityCache>,
    config: PartialConfig,
    insert_buffer: InsertBuffer<Q>,
    stats: TotalStats,
    metrics: CheckerMetrics,
    cancellation: CancellationToken,
    last_stream_id: Option<[u8; 16]>,
    segments_below_min: u64,
}

impl<Q: RepairQueue> PartialProcessor<Q> {
    pub fn new(
        reliability: Arc<ReliabilityCache>,
        config: PartialConfig,
        queue: Q,
        insert_batch_size: usize,
        metrics: CheckerMetrics,
        cancellation: CancellationToken,
    ) -> Self {
        let max_buckets = config.max_stats_buckets;
        Self {
            reliability,
            config,
            insert_buffer: InsertBuffer::new(queue, insert_batch_size),
            stats: TotalStats::new(max_buckets),
            metrics,
            cancellation,
            last_stream_id: None,
            segments_below_min: 0,
        }
    }

    /// Count of segments found irreparable (`retrievable_count < k`)
    /// during this Partial's run so far.
    pub fn segments_below_min(&self) -> u64 {
        self.segments_below_min
    }

    /// Drives `range` to exhaustion, flushing the insert buffer and
    /// returning the accumulated local stats.
    #[instrument(skip(self, range))]
    pub async fn run(mut self, mut range: Box<dyn SegmentPartial>) -> Result<TotalStats> {
        let mut scratch = Vec::new();

        loop {
            if self.cancellation.is_cancelled() {
                return Err(CheckerError::Cancelled);
            }

            let batch = range
                .next_batch(self.config.segment_batch_size)
                .await
                .map_err(|e| CheckerError::SegmentSource(e.to_string()))?;

            if batch.is_empty() {
                break;
            }

            for segment in &batch {
                if self.cancellation.is_cancelled() {
                    return Err(CheckerError::Cancelled);
                }
                self.process_segment(segment, &mut scratch).await?;
            }
        }

        self.insert_buffer.flush().await?;
        Ok(self.stats)
    }

    /// The effective redundancy key stats/metrics bucket this segment
    /// falls into. Falls back to the raw scheme's key if the override
    /// map rejects the segment's scheme (e.g. a stale threshold
    /// override), so a bad override config doesn't swallow telemetry.
    fn bucket_key(&self, segment: &SegmentRecord) -> crate::redundancy::RedundancyKey {
        self.config
            .overrides
            .apply(segment.scheme)
            .map(|s| s.key())
            .unwrap_or_else(|_| segment.scheme.key())
    }

    #[instrument(skip(self, segment, scratch), fields(stream_id = %hex::encode(segment.stream_id), position = segment.position))]
    async fn process_segment(
        &mut self,
        segment: &SegmentRecord,
        scratch: &mut Vec<Option<crate::reliability::NodeSnapshotEntry>>,
    ) -> Result<()> {
        let now = Utc::now();

        if segment.is_expired(now) {
            debug!("segment expired, skipping");
            return Ok(());
        }

        if segment.inline {
            self.record(segment, Decision::Healthy, 0, 0, 0, 0, 0, 0, None);
            return Ok(());
        }

        if segment.pieces.is_empty() {
            debug!("non-inline segment has zero pieces, skipping");
            return Ok(());
        }

        let effective = self.config.overrides.apply(segment.scheme)?;

        let ids: Vec<[u8; 32]> = segment.pieces.iter().map(|p| p.node_id).collect();
        if let Err(err) = self
            .reliability
            .get_nodes(segment.created_at, &ids, scratch)
            .await
        {
            warn!(error = %err, "node lookup failed for segment, skipping this iteration");
            let key = self.bucket_key(segment);
            self.stats.record(
                key,
                segment.placement,
                BucketStats {
                    segments_failed_to_check: 1,
                    ..Default::default()
                },
            );
            return Ok(());
        }

        let mut classification = Classification::default();
        classify(
            &segment.pieces,
            scratch,
            &effective,
            segment.placement,
            &self.config.excluded_countries,
            self.config.do_declumping,
            self.config.do_placement_check,
            &mut classification,
        );

        let healthy_count = classification.healthy_count();
        let retrievable_count = classification.retrievable_count();
        let forcing_count = classification.forcing_count();
        let clumped_count = classification.clumped.len();
        let exiting_count = classification.exiting.len();
        let off_placement_count = classification.out_of_placement.len();

        let total_nodes = self.reliability.num_nodes()?;
        let health = health::calculate(
            self.config.health_mode,
            HealthInputs {
                healthy_count,
                retrievable_count,
                k: effective.k,
                total_nodes,
                per_iteration_failure_prob: self.config.per_iteration_failure_prob,
                forcing_count,
            },
        );

        // The `< o` clause tolerates the r == o anomaly (an operator or
        // test scheme with no gap between threshold and target) by
        // suppressing repair right at the boundary instead of
        // re-enqueueing a segment that just hit its target.
        let repair_due_to_health =
            healthy_count <= effective.r as usize && healthy_count < effective.o as usize;
        let repair_due_to_forcing = forcing_count > 0;
        let irreparable = retrievable_count < effective.k as usize;

        if irreparable {
            error!(
                retrievable_count,
                k = effective.k,
                "segment irreparable: retrievable piece count below k"
            );
            self.segments_below_min += 1;
            let key = self.bucket_key(segment);
            let mut lost = std::collections::HashSet::new();
            lost.insert(segment.stream_id);
            self.stats.record(
                key,
                segment.placement,
                BucketStats {
                    segments_lost: 1,
                    objects_lost: lost,
                    ..Default::default()
                },
            );
        }

        let decision = if repair_due_to_health || repair_due_to_forcing {
            Decision::Injured {
                forcing: repair_due_to_forcing,
            }
        } else if classification.has_clumping() {
            Decision::ClumpedOnly
        } else {
            Decision::Healthy
        };

        let key = self.bucket_key(segment);

        if let Decision::Injured { forcing } = decision {
            if let Some(iterations) = health.iterations_until_irreparable {
                self.metrics
                    .time_until_irreparable(segment.placement, key, iterations);
            }
            self.metrics
                .injured_segment_health(segment.placement, key, health.score);

            if !self.config.dry_run {
                let newly = self
                    .insert_buffer
                    .insert(InjuredSegment {
                        stream_id: segment.stream_id,
                        position: segment.position,
                        redundancy: effective.key(),
                        placement: segment.placement,
                        health_score: health.score,
                        healthy_piece_count: healthy_count as u16,
                        forcing_repair: forcing,
                    })
                    .await?;
                for (bucket_key, bucket_placement) in newly {
                    self.stats.record(
                        bucket_key,
                        bucket_placement,
                        BucketStats {
                            new_segments_needing_repair: 1,
                            ..Default::default()
                        },
                    );
                }
            } else {
                debug!("dry run: would enqueue segment for repair");
            }
        } else if let Decision::ClumpedOnly = decision {
            warn!("segment healthy but clumped; no diverse repair target required yet");
        }

        let age_secs = segment.age_secs(now);
        let freshness_secs = segment.freshness_secs(now);
        self.metrics.segment_observed(
            segment.placement,
            key,
            segment.pieces.len(),
            healthy_count,
            clumped_count,
            exiting_count,
            off_placement_count,
            age_secs,
            freshness_secs,
            health.score,
        );
        let pieces_lost = (effective.n as usize).saturating_sub(retrievable_count) as u64;
        self.metrics
            .pieces_lost_per_week(segment.placement, key, pieces_lost, age_secs);

        self.record(
            segment,
            decision,
            healthy_count,
            retrievable_count,
            forcing_count,
            clumped_count,
            exiting_count,
            off_placement_count,
            Some(effective),
        );

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &mut self,
        segment: &SegmentRecord,
        decision: Decision,
        healthy_count: usize,
        _retrievable_count: usize,
        _forcing_count: usize,
        _clumped_count: usize,
        _exiting_count: usize,
        _off_placement_count: usize,
        effective: Option<RedundancyScheme>,
    ) {
        let key = self.bucket_key(segment);

        let new_object = self.last_stream_id != Some(segment.stream_id);
        if new_object {
            self.last_stream_id = Some(segment.stream_id);
        }

        let mut delta = BucketStats {
            segments_checked: 1,
            healthy_piece_total: healthy_count as u64,
            objects_checked: if new_object { 1 } else { 0 },
            ..Default::default()
        };

        match decision {
            Decision::Healthy => {
                delta.segments_healthy = 1;
                self.metrics.segments_healthy(1);
                self.record_over_threshold(&mut delta, healthy_count, effective);
            }
            Decision::ClumpedOnly => {
                delta.segments_healthy = 1;
                delta.segments_clumped_only = 1;
                self.record_over_threshold(&mut delta, healthy_count, effective);
            }
            Decision::Injured { forcing } => {
                delta.segments_injured = 1;
                if forcing {
                    delta.segments_forcing_repair = 1;
                }
                self.metrics.segment_injured(forcing, false);
            }
        }

        self.metrics.segments_checked(1);
        self.stats.record(key, segment.placement, delta);
    }

    /// Healthy-but-not-repaired segments landing exactly `r+1 ..= r+5`
    /// above the repair threshold, indexed 0..5.
    fn record_over_threshold(
        &self,
        delta: &mut BucketStats,
        healthy_count: usize,
        effective: Option<RedundancyScheme>,
    ) {
        let Some(effective) = effective else {
            return;
        };
        let diff = healthy_count as i64 - effective.r as i64;
        if (1..=5).contains(&diff) {
            delta.over_threshold[(diff - 1) as usize] = 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Piece;
    use crate::redundancy::RedundancyScheme;
    use crate::reliability::{NodeSnapshotEntry, OverlayClient};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeOverlay {
        nodes: Vec<([u8; 32], NodeSnapshotEntry)>,
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
            Ok((self.nodes.clone(), Vec::new()))
        }

        async fn get_all_participating_nodes_for_repair(
            &self,
            _online_window: Duration,
        ) -> std::result::Result<Vec<([u8; 32], NodeSnapshotEntry)>, Box<dyn std::error::Error + Send + Sync>>
        {
            Ok(self.nodes.clone())
        }
    }

    struct FakeQueue {
        inserted: std::sync::Arc<AtomicUsize>,
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

    fn node(n: u8) -> [u8; 32] {
        let mut id = [0u8; 32];
        id[0] = n;
        id
    }

    fn online(last_net: u64) -> NodeSnapshotEntry {
        NodeSnapshotEntry {
            online: true,
            exiting: false,
            disqualified: false,
            gracefully_exited: false,
            country_code: *b"US",
            last_net,
            placement: 0,
        }
    }

    fn segment(pieces: Vec<Piece>) -> SegmentRecord {
        SegmentRecord {
            stream_id: [9u8; 16],
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

    async fn make_processor(
        nodes: Vec<([u8; 32], NodeSnapshotEntry)>,
    ) -> (PartialProcessor<FakeQueue>, std::sync::Arc<AtomicUsize>) {
        let overlay = Arc::new(FakeOverlay { nodes });
        let cache = Arc::new(ReliabilityCache::new(
            overlay,
            crate::reliability::ReliabilityCacheConfig::default(),
        ));
        cache.refresh().await.unwrap();

        let inserted = std::sync::Arc::new(AtomicUsize::new(0));
        let queue = FakeQueue {
            inserted: inserted.clone(),
        };

        let config = PartialConfig {
            overrides: Arc::new(OverrideMap::new()),
            excluded_countries: Vec::new(),
            health_mode: HealthMode::Normalized,
            per_iteration_failure_prob: 0.01,
            segment_batch_size: 100,
            max_stats_buckets: 16,
            do_declumping: true,
            do_placement_check: true,
            dry_run: false,
        };

        (
            PartialProcessor::new(
                cache,
                config,
                queue,
                10,
                CheckerMetrics::new(),
                CancellationToken::new(),
            ),
            inserted,
        )
    }

    #[tokio::test]
    async fn test_healthy_segment_not_enqueued() {
        let pieces: Vec<Piece> = (0..5)
            .map(|n| Piece {
                piece_num: n,
                node_id: node(n as u8),
            })
            .collect();
        let nodes = pieces.iter().map(|p| (p.node_id, online(p.piece_num as u64))).collect();
        let (processor, inserted) = make_processor(nodes).await;

        let range = Box::new(OneShotRange {
            segments: vec![segment(pieces)],
            served: false,
        });
        let stats = processor.run(range).await.unwrap();

        assert_eq!(inserted.load(Ordering::SeqCst), 0);
        assert_eq!(stats.total_checked(), 1);
    }

    #[tokio::test]
    async fn test_segment_below_threshold_enqueued() {
        // Only 2 of 5 pieces known; healthy_count=2 <= r=3 triggers repair.
        let pieces: Vec<Piece> = (0..5)
            .map(|n| Piece {
                piece_num: n,
                node_id: node(n as u8),
            })
            .collect();
        let nodes = pieces[..2]
            .iter()
            .map(|p| (p.node_id, online(p.piece_num as u64)))
            .collect();
        let (processor, inserted) = make_processor(nodes).await;

        let range = Box::new(OneShotRange {
            segments: vec![segment(pieces)],
            served: false,
        });
        let stats = processor.run(range).await.unwrap();

        assert_eq!(inserted.load(Ordering::SeqCst), 1);
        assert_eq!(stats.total_injured(), 1);
        assert_eq!(stats.total_new_needing_repair(), 1);
    }

    #[tokio::test]
    async fn test_irreparable_segment_recorded_as_lost() {
        // k=2: only 1 of 5 pieces known, so retrievable_count=1 < k=2.
        let pieces: Vec<Piece> = (0..5)
            .map(|n| Piece {
                piece_num: n,
                node_id: node(n as u8),
            })
            .collect();
        let nodes = pieces[..1]
            .iter()
            .map(|p| (p.node_id, online(p.piece_num as u64)))
            .collect();
        let (processor, inserted) = make_processor(nodes).await;

        let range = Box::new(OneShotRange {
            segments: vec![segment(pieces)],
            served: false,
        });
        let stats = processor.run(range).await.unwrap();

        assert_eq!(inserted.load(Ordering::SeqCst), 1);
        assert_eq!(stats.total_lost(), 1);
        assert_eq!(stats.total_objects_lost(), 1);
    }

    #[tokio::test]
    async fn test_empty_pieces_segment_skipped() {
        let (processor, inserted) = make_processor(Vec::new()).await;
        let range = Box::new(OneShotRange {
            segments: vec![segment(Vec::new())],
            served: false,
        });
        let stats = processor.run(range).await.unwrap();
        assert_eq!(inserted.load(Ordering::SeqCst), 0);
        assert_eq!(stats.total_checked(), 0);
    }

    #[tokio::test]
    async fn test_inline_segment_always_healthy() {
        let (processor, inserted) = make_processor(Vec::new()).await;
        let mut seg = segment(Vec::new());
        seg.inline = true;
        let range = Box::new(OneShotRange {
            segments: vec![seg],
            served: false,
        });
        let stats = processor.run(range).await.unwrap();
        assert_eq!(inserted.load(Ordering::SeqCst), 0);
        assert_eq!(stats.total_checked(), 1);
    }

    #[tokio::test]
    async fn test_expired_segment_skipped() {
        let (processor, inserted) = make_processor(Vec::new()).await;
        let mut seg = segment(Vec::new());
        seg.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        let range = Box::new(OneShotRange {
            segments: vec![seg],
            served: false,
        });
        let stats = processor.run(range).await.unwrap();
        assert_eq!(inserted.load(Ordering::SeqCst), 0);
        assert_eq!(stats.total_checked(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_run() {
        let (mut processor, _inserted) = make_processor(Vec::new()).await;
        let token = CancellationToken::new();
        processor.cancellation = token.clone();
        token.cancel();

        let pieces = vec![Piece {
            piece_num: 0,
            node_id: node(0),
        }];
        let range = Box::new(OneShotRange {
            segments: vec![segment(pieces)],
            served: false,
        });
        let result = processor.run(range).await;
        assert!(matches!(result, Err(CheckerError::Cancelled)));
    }
}

//! End-to-end scenario coverage for the repair checker, driven through
//! the public API against in-memory fakes of the segment source,
//! overlay, and repair queue.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cyxcloud_checker::{
    CheckerConfig, CheckerMetrics, InjuredSegment, NodeSnapshotEntry, OverlayClient, OverrideMap,
    Piece, RedundancyScheme, ReliabilityCache, ReliabilityCacheConfig, RepairQueue, ScanDriver,
    SegmentPartial, SegmentRecord, SegmentSource,
};
use tokio_util::sync::CancellationToken;

struct FakeOverlay {
    nodes: Vec<([u8; 32], NodeSnapshotEntry)>,
}

#[async_trait::async_trait]
impl OverlayClient for FakeOverlay {
    async fn reliable(
        &self,
        _online_window: Duration,
    ) -> Result<
        (Vec<([u8; 32], NodeSnapshotEntry)>, Vec<([u8; 32], NodeSnapshotEntry)>),
        Box<dyn std::error::Error + Send + Sync>,
    > {
        Ok((self.nodes.clone(), Vec::new()))
    }

    async fn get_all_participating_nodes_for_repair(
        &self,
        online_window: Duration,
    ) -> Result<Vec<([u8; 32], NodeSnapshotEntry)>, Box<dyn std::error::Error + Send + Sync>> {
        let (a, b) = self.reliable(online_window).await?;
        Ok(a.into_iter().chain(b).collect())
    }
}

struct RecordingQueue {
    inserted: Arc<AtomicUsize>,
    cleaned: Arc<AtomicU64>,
}

#[async_trait::async_trait]
impl RepairQueue for RecordingQueue {
    async fn insert_batch(
        &self,
        segments: &[InjuredSegment],
    ) -> Result<Vec<bool>, Box<dyn std::error::Error + Send + Sync>> {
        self.inserted.fetch_add(segments.len(), Ordering::SeqCst);
        Ok(vec![true; segments.len()])
    }

    async fn clean(
        &self,
        _started_at: DateTime<Utc>,
    ) -> Result<u64, Box<dyn std::error::Error + Send + Sync>> {
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
    ) -> Result<Vec<SegmentRecord>, Box<dyn std::error::Error + Send + Sync>> {
        if self.served {
            Ok(Vec::new())
        } else {
            self.served = true;
            Ok(self.segments.clone())
        }
    }
}

struct SingleRangeSource {
    segments: Vec<SegmentRecord>,
}

#[async_trait::async_trait]
impl SegmentSource for SingleRangeSource {
    async fn ranges(
        &self,
        _count: usize,
        _as_of: DateTime<Utc>,
    ) -> Result<Vec<Box<dyn SegmentPartial>>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(vec![Box::new(OneShotRange {
            segments: self.segments.clone(),
            served: false,
        })])
    }
}

fn online_node(last_net: u64) -> NodeSnapshotEntry {
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

fn piece(n: u16, node: u8) -> Piece {
    Piece {
        piece_num: n,
        node_id: [node; 32],
    }
}

fn base_segment(scheme: RedundancyScheme, pieces: Vec<Piece>) -> SegmentRecord {
    SegmentRecord {
        stream_id: [7u8; 16],
        position: 0,
        created_at: Utc::now(),
        scheme,
        placement: 0,
        pieces,
        inline: false,
        expires_at: None,
        repaired_at: None,
    }
}

async fn run_scenario(
    segments: Vec<SegmentRecord>,
    nodes: Vec<([u8; 32], NodeSnapshotEntry)>,
    overrides: OverrideMap,
) -> (u64, u64, u64) {
    let reliability = Arc::new(ReliabilityCache::new(
        Arc::new(FakeOverlay { nodes }),
        ReliabilityCacheConfig::default(),
    ));
    let inserted = Arc::new(AtomicUsize::new(0));
    let cleaned = Arc::new(AtomicU64::new(0));
    let queue = Arc::new(RecordingQueue {
        inserted: inserted.clone(),
        cleaned: cleaned.clone(),
    });
    let source = Arc::new(SingleRangeSource { segments });

    let mut config = CheckerConfig::default();
    config.num_partials = Some(1);

    let mut driver = ScanDriver::new(
        source,
        reliability,
        queue,
        Arc::new(overrides),
        config,
        CheckerMetrics::new(),
        CancellationToken::new(),
    );

    let stats = driver.run_iteration().await.unwrap();
    (
        stats.total_checked(),
        stats.total_injured(),
        inserted.load(Ordering::SeqCst) as u64,
    )
}

/// Scenario 1: every piece present on a distinct, reliable node — no
/// repair needed.
#[tokio::test]
async fn scenario_fully_healthy_segment_not_enqueued() {
    let scheme = RedundancyScheme::new(2, 3, 4, 5).unwrap();
    let pieces: Vec<Piece> = (0..5).map(|n| piece(n, n as u8 + 1)).collect();
    let nodes = pieces
        .iter()
        .enumerate()
        .map(|(i, p)| (p.node_id, online_node(i as u64)))
        .collect();

    let (checked, injured, inserted) =
        run_scenario(vec![base_segment(scheme, pieces)], nodes, OverrideMap::new()).await;

    assert_eq!(checked, 1);
    assert_eq!(injured, 0);
    assert_eq!(inserted, 0);
}

/// Scenario 2: healthy piece count has dropped to the repair
/// threshold — enqueued for repair.
#[tokio::test]
async fn scenario_below_threshold_enqueued() {
    let scheme = RedundancyScheme::new(2, 3, 4, 5).unwrap();
    let all_pieces: Vec<Piece> = (0..5).map(|n| piece(n, n as u8 + 1)).collect();
    // Only 3 of 5 pieces resolve to known nodes, so healthy_count == r == 3.
    let nodes = all_pieces[..3]
        .iter()
        .enumerate()
        .map(|(i, p)| (p.node_id, online_node(i as u64)))
        .collect();

    let (checked, injured, inserted) = run_scenario(
        vec![base_segment(scheme, all_pieces)],
        nodes,
        OverrideMap::new(),
    )
    .await;

    assert_eq!(checked, 1);
    assert_eq!(injured, 1);
    assert_eq!(inserted, 1);
}

/// Scenario 3: a disqualified node forces repair even though the
/// remaining pieces are well above the repair threshold.
#[tokio::test]
async fn scenario_forcing_repair_overrides_otherwise_healthy_count() {
    let scheme = RedundancyScheme::new(2, 3, 4, 5).unwrap();
    let pieces: Vec<Piece> = (0..5).map(|n| piece(n, n as u8 + 1)).collect();
    let mut nodes: Vec<_> = pieces
        .iter()
        .enumerate()
        .map(|(i, p)| (p.node_id, online_node(i as u64)))
        .collect();
    nodes[0].1.disqualified = true;

    let (checked, injured, inserted) =
        run_scenario(vec![base_segment(scheme, pieces)], nodes, OverrideMap::new()).await;

    assert_eq!(checked, 1);
    assert_eq!(injured, 1);
    assert_eq!(inserted, 1);
}

/// Scenario 4: healthy piece count clears the repair threshold, but
/// one extra piece shares a network neighborhood with another — a
/// clumping diagnostic, not an enqueue.
#[tokio::test]
async fn scenario_clumped_only_not_enqueued() {
    let scheme = RedundancyScheme::new(2, 3, 4, 6).unwrap();
    let pieces: Vec<Piece> = (0..6).map(|n| piece(n, n as u8 + 1)).collect();
    // Pieces 0-4 each sit on a distinct net (healthy); piece 5 repeats
    // piece 0's net, so it's retrievable but counted as clumped.
    let mut nodes: Vec<_> = pieces
        .iter()
        .enumerate()
        .map(|(i, p)| (p.node_id, online_node(i as u64)))
        .collect();
    nodes[5].1.last_net = 0;

    let (checked, injured, inserted) =
        run_scenario(vec![base_segment(scheme, pieces)], nodes, OverrideMap::new()).await;

    assert_eq!(checked, 1);
    assert_eq!(injured, 0);
    assert_eq!(inserted, 0);
}

/// Scenario 5: inline segments carry no remote pieces and are never
/// unhealthy.
#[tokio::test]
async fn scenario_inline_segment_always_healthy() {
    let mut segment = base_segment(RedundancyScheme::new(2, 3, 4, 5).unwrap(), Vec::new());
    segment.inline = true;

    let (checked, injured, inserted) = run_scenario(vec![segment], Vec::new(), OverrideMap::new()).await;

    assert_eq!(checked, 1);
    assert_eq!(injured, 0);
    assert_eq!(inserted, 0);
}

/// Scenario 6: a threshold override raises r above the unmodified
/// value, so a segment that was healthy under the recorded scheme is
/// now enqueued under the effective one.
#[tokio::test]
async fn scenario_threshold_override_raises_effective_repair_rate() {
    // o=6 leaves headroom above the overridden r' so this demonstrates
    // the override alone, without also hitting the r>o edge case
    // covered separately in redundancy::tests.
    let scheme = RedundancyScheme::new(2, 2, 6, 6).unwrap();
    let pieces: Vec<Piece> = (0..4).map(|n| piece(n, n as u8 + 1)).collect();
    let nodes: Vec<_> = pieces
        .iter()
        .enumerate()
        .map(|(i, p)| (p.node_id, online_node(i as u64)))
        .collect();

    // Baseline: healthy_count = 4 > r = 2, not enqueued.
    let (_, injured_baseline, _) = run_scenario(
        vec![base_segment(scheme, pieces.clone())],
        nodes.clone(),
        OverrideMap::new(),
    )
    .await;
    assert_eq!(injured_baseline, 0);

    // With threshold-override 2->5: effective r' = 5, so healthy_count
    // (4) <= r' (5) and still < o (6), triggering enqueue.
    let overrides = OverrideMap::new().with_threshold_overrides("2-5").unwrap();
    let (_, injured_overridden, inserted_overridden) =
        run_scenario(vec![base_segment(scheme, pieces)], nodes, overrides).await;
    assert_eq!(injured_overridden, 1);
    assert_eq!(inserted_overridden, 1);
}

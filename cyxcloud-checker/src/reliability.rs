//! Reliability cache
//!
//! Coherent, low-latency lookup of node reliability/placement for many
//! concurrent Partials. The snapshot is an immutable object published
//! atomically via `ArcSwap`; readers never lock except to trigger (or
//! wait out) a refresh.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::{CheckerError, Result};

/// Node identifier: 256-bit, matches the piece node-id width in the
/// segment record.
pub type NodeId = [u8; 32];

/// A single node's reliability/placement status, as coalesced from
/// the overlay's reliable/unreliable node lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSnapshotEntry {
    pub online: bool,
    pub exiting: bool,
    pub disqualified: bool,
    pub gracefully_exited: bool,
    pub country_code: [u8; 2],
    /// Identifier of the node's network neighborhood (e.g. /24 or /64
    /// group), used for clumping detection.
    pub last_net: u64,
    /// Placement region/tag the node satisfies (0 = unconstrained).
    pub placement: u16,
}

impl NodeSnapshotEntry {
    /// A reliable node: online within the online-window, not
    /// disqualified, not gracefully-exited, not in an excluded country.
    pub fn is_reliable(&self, excluded_countries: &[[u8; 2]]) -> bool {
        self.online
            && !self.disqualified
            && !self.gracefully_exited
            && !excluded_countries.contains(&self.country_code)
    }
}

/// Overlay / node directory client, consumed by the cache on refresh.
#[async_trait::async_trait]
pub trait OverlayClient: Send + Sync {
    /// Nodes considered online within `online_window`, plus nodes known
    /// to the overlay but currently unavailable (offline, disqualified,
    /// gracefully exited, etc).
    async fn reliable(
        &self,
        online_window: Duration,
    ) -> std::result::Result<(Vec<(NodeId, NodeSnapshotEntry)>, Vec<(NodeId, NodeSnapshotEntry)>), Box<dyn std::error::Error + Send + Sync>>;

    /// All nodes participating in the network, regardless of status.
    async fn get_all_participating_nodes_for_repair(
        &self,
        online_window: Duration,
    ) -> std::result::Result<Vec<(NodeId, NodeSnapshotEntry)>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Immutable, atomically-published node snapshot.
struct Snapshot {
    nodes: HashMap<NodeId, NodeSnapshotEntry>,
    created_at: DateTime<Utc>,
}

/// Reliability cache configuration.
#[derive(Debug, Clone)]
pub struct ReliabilityCacheConfig {
    /// Max age of a snapshot before it is considered stale.
    pub staleness: Duration,
    /// Max last-contact age for "online" classification.
    pub online_window: Duration,
}

impl Default for ReliabilityCacheConfig {
    fn default() -> Self {
        Self {
            staleness: Duration::from_secs(3 * 60),
            online_window: Duration::from_secs(60 * 60),
        }
    }
}

/// Coherent, low-latency node-reliability cache.
///
/// Internally: an atomically-published immutable snapshot plus a
/// refresh mutex used only to serialize the (rare) refresh path —
/// readers on the hot path never block on it unless they are the one
/// performing the refresh.
pub struct ReliabilityCache {
    config: ReliabilityCacheConfig,
    snapshot: ArcSwap<Snapshot>,
    refresh_lock: Mutex<()>,
    overlay: Arc<dyn OverlayClient>,
}

impl ReliabilityCache {
    pub fn new(overlay: Arc<dyn OverlayClient>, config: ReliabilityCacheConfig) -> Self {
        Self {
            config,
            snapshot: ArcSwap::from_pointee(Snapshot {
                nodes: HashMap::new(),
                created_at: DateTime::<Utc>::MIN_UTC,
            }),
            refresh_lock: Mutex::new(()),
            overlay,
        }
    }

    /// Force a reload from the overlay, regardless of current staleness.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Resolve piece node-ids to snapshot entries.
    ///
    /// Uses the cache if fresh relative to `created_at` and the
    /// staleness bound; otherwise exactly one refresh is performed
    /// (double-checked: readers that arrive during a refresh observe
    /// the new snapshot without triggering their own).
    #[instrument(skip(self, ids, scratch))]
    pub async fn get_nodes(
        &self,
        created_at: DateTime<Utc>,
        ids: &[NodeId],
        scratch: &mut Vec<Option<NodeSnapshotEntry>>,
    ) -> Result<()> {
        scratch.clear();

        if !self.is_fresh_for(created_at) {
            // Double-checked: take the lock, re-check, refresh if still stale.
            let _guard = self.refresh_lock.lock().await;
            if !self.is_fresh_for(created_at) {
                self.refresh_locked().await?;
            }
        }

        let snap = self.snapshot.load();
        scratch.extend(ids.iter().map(|id| snap.nodes.get(id).copied()));
        Ok(())
    }

    /// Total participating node count in the current snapshot.
    pub fn num_nodes(&self) -> Result<usize> {
        let snap = self.snapshot.load();
        if snap.nodes.is_empty() {
            return Err(CheckerError::NoNodes);
        }
        Ok(snap.nodes.len())
    }

    fn is_fresh_for(&self, created_at: DateTime<Utc>) -> bool {
        let snap = self.snapshot.load();
        let now = Utc::now();
        snap.created_at >= created_at
            && (now - snap.created_at)
                .to_std()
                .map(|age| age <= self.config.staleness)
                .unwrap_or(false)
    }

    async fn refresh_locked(&self) -> Result<()> {
        let (online, known_other) = self
            .overlay
            .reliable(self.config.online_window)
            .await
            .map_err(|e| CheckerError::OverlayUnavailable(e.to_string()))?;

        let mut nodes = HashMap::with_capacity(online.len() + known_other.len());
        for (id, entry) in online.into_iter().chain(known_other.into_iter()) {
            nodes.insert(id, entry);
        }

        let count = nodes.len();
        self.snapshot.store(Arc::new(Snapshot {
            nodes,
            created_at: Utc::now(),
        }));

        info!(nodes = count, "reliability cache refreshed");
        if count == 0 {
            warn!("reliability cache refreshed with zero participating nodes");
        } else {
            debug!(nodes = count, "snapshot published");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeOverlay {
        nodes: Vec<(NodeId, NodeSnapshotEntry)>,
        refresh_count: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl OverlayClient for FakeOverlay {
        async fn reliable(
            &self,
            _online_window: Duration,
        ) -> std::result::Result<
            (Vec<(NodeId, NodeSnapshotEntry)>, Vec<(NodeId, NodeSnapshotEntry)>),
            Box<dyn std::error::Error + Send + Sync>,
        > {
            self.refresh_count.fetch_add(1, Ordering::SeqCst);
            Ok((self.nodes.clone(), Vec::new()))
        }

        async fn get_all_participating_nodes_for_repair(
            &self,
            _online_window: Duration,
        ) -> std::result::Result<Vec<(NodeId, NodeSnapshotEntry)>, Box<dyn std::error::Error + Send + Sync>>
        {
            Ok(self.nodes.clone())
        }
    }

    fn node(n: u8) -> NodeId {
        let mut id = [0u8; 32];
        id[0] = n;
        id
    }

    fn entry() -> NodeSnapshotEntry {
        NodeSnapshotEntry {
            online: true,
            exiting: false,
            disqualified: false,
            gracefully_exited: false,
            country_code: *b"US",
            last_net: 1,
            placement: 0,
        }
    }

    #[tokio::test]
    async fn test_refresh_populates_snapshot() {
        let overlay = Arc::new(FakeOverlay {
            nodes: vec![(node(1), entry()), (node(2), entry())],
            refresh_count: AtomicUsize::new(0),
        });
        let cache = ReliabilityCache::new(overlay, ReliabilityCacheConfig::default());
        cache.refresh().await.unwrap();
        assert_eq!(cache.num_nodes().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_no_nodes_error() {
        let overlay = Arc::new(FakeOverlay {
            nodes: vec![],
            refresh_count: AtomicUsize::new(0),
        });
        let cache = ReliabilityCache::new(overlay, ReliabilityCacheConfig::default());
        cache.refresh().await.unwrap();
        assert!(matches!(cache.num_nodes(), Err(CheckerError::NoNodes)));
    }

    #[tokio::test]
    async fn test_get_nodes_triggers_refresh_when_stale() {
        let overlay = Arc::new(FakeOverlay {
            nodes: vec![(node(1), entry())],
            refresh_count: AtomicUsize::new(0),
        });
        let cache = ReliabilityCache::new(overlay.clone(), ReliabilityCacheConfig::default());

        let mut scratch = Vec::new();
        cache
            .get_nodes(Utc::now(), &[node(1)], &mut scratch)
            .await
            .unwrap();

        assert_eq!(overlay.refresh_count.load(Ordering::SeqCst), 1);
        assert_eq!(scratch.len(), 1);
        assert!(scratch[0].is_some());
    }

    #[tokio::test]
    async fn test_get_nodes_reuses_fresh_snapshot() {
        let overlay = Arc::new(FakeOverlay {
            nodes: vec![(node(1), entry())],
            refresh_count: AtomicUsize::new(0),
        });
        let cache = ReliabilityCache::new(overlay.clone(), ReliabilityCacheConfig::default());
        cache.refresh().await.unwrap();
        assert_eq!(overlay.refresh_count.load(Ordering::SeqCst), 1);

        let mut scratch = Vec::new();
        cache
            .get_nodes(Utc::now() - chrono::Duration::seconds(1), &[node(1)], &mut scratch)
            .await
            .unwrap();

        // Snapshot is fresh enough for a query with an older createdAt;
        // no second refresh should have happened.
        assert_eq!(overlay.refresh_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_node_returns_none() {
        let overlay = Arc::new(FakeOverlay {
            nodes: vec![(node(1), entry())],
            refresh_count: AtomicUsize::new(0),
        });
        let cache = ReliabilityCache::new(overlay, ReliabilityCacheConfig::default());
        cache.refresh().await.unwrap();

        let mut scratch = Vec::new();
        cache
            .get_nodes(Utc::now(), &[node(99)], &mut scratch)
            .await
            .unwrap();
        assert_eq!(scratch.len(), 1);
        assert!(scratch[0].is_none());
    }

    #[test]
    fn test_is_reliable() {
        let mut e = entry();
        assert!(e.is_reliable(&[]));
        e.disqualified = true;
        assert!(!e.is_reliable(&[]));
        e.disqualified = false;
        assert!(!e.is_reliable(&[*b"US"]));
    }
}

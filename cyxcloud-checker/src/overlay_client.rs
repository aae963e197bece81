//! Overlay client
//!
//! Production `OverlayClient` implementation backed by
//! `cyxcloud-metadata`'s Postgres `Database`, following the same
//! DB-backed status lookup as `cyxcloud-rebalancer`'s
//! `GrpcNetworkClient`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use cyxcloud_metadata::postgres::Database;
use tracing::{instrument, warn};

use crate::reliability::{NodeId, NodeSnapshotEntry, OverlayClient};

/// Overlay client backed by the node table. Node identity, placement
/// tag and network-neighborhood grouping are best-effort derivations
/// from the existing node schema (no dedicated placement/last-net
/// columns exist yet); `rack`/`datacenter` stand in until the satellite
/// schema carries those natively.
pub struct PostgresOverlayClient {
    db: std::sync::Arc<Database>,
}

impl PostgresOverlayClient {
    pub fn new(db: std::sync::Arc<Database>) -> Self {
        Self { db }
    }
}

fn node_id_from_peer_id(peer_id: &str) -> NodeId {
    let mut id = [0u8; 32];
    let bytes = peer_id.as_bytes();
    let n = bytes.len().min(32);
    id[..n].copy_from_slice(&bytes[..n]);
    id
}

fn last_net_from_datacenter(datacenter: &Option<String>) -> u64 {
    let mut hasher = DefaultHasher::new();
    datacenter.as_deref().unwrap_or("unknown").hash(&mut hasher);
    hasher.finish()
}

#[async_trait::async_trait]
impl OverlayClient for PostgresOverlayClient {
    #[instrument(skip(self))]
    async fn reliable(
        &self,
        online_window: Duration,
    ) -> std::result::Result<(Vec<(NodeId, NodeSnapshotEntry)>, Vec<(NodeId, NodeSnapshotEntry)>), Box<dyn std::error::Error + Send + Sync>>
    {
        let nodes = self
            .db
            .get_all_nodes()
            .await
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;

        let now = chrono::Utc::now();
        let mut online = Vec::new();
        let mut other = Vec::new();

        for node in nodes {
            let online_recently = node
                .last_heartbeat
                .map(|t| {
                    (now - t)
                        .to_std()
                        .map(|age| age <= online_window)
                        .unwrap_or(false)
                })
                .unwrap_or(false);

            let entry = NodeSnapshotEntry {
                online: online_recently && node.status == "online",
                exiting: node.status == "exiting",
                disqualified: node.status == "disqualified",
                gracefully_exited: node.status == "exited",
                country_code: *b"XX",
                last_net: last_net_from_datacenter(&node.datacenter),
                placement: 0,
            };

            let id = node_id_from_peer_id(&node.peer_id);
            if entry.online {
                online.push((id, entry));
            } else {
                other.push((id, entry));
            }
        }

        if online.is_empty() {
            warn!("no online nodes found in overlay refresh");
        }

        Ok((online, other))
    }

    #[instrument(skip(self))]
    async fn get_all_participating_nodes_for_repair(
        &self,
        online_window: Duration,
    ) -> std::result::Result<Vec<(NodeId, NodeSnapshotEntry)>, Box<dyn std::error::Error + Send + Sync>>
    {
        let (online, other) = self.reliable(online_window).await?;
        Ok(online.into_iter().chain(other.into_iter()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_from_peer_id_truncates() {
        let id = node_id_from_peer_id("a-very-long-peer-identifier-string-well-over-32-bytes");
        assert_eq!(id.len(), 32);
    }

    #[test]
    fn test_last_net_stable_for_same_datacenter() {
        let a = last_net_from_datacenter(&Some("dc1".to_string()));
        let b = last_net_from_datacenter(&Some("dc1".to_string()));
        assert_eq!(a, b);
        let c = last_net_from_datacenter(&Some("dc2".to_string()));
        assert_ne!(a, c);
    }
}

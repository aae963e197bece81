//! CyxCloud repair checker
//!
//! Scans segment metadata, classifies remote-segment health against
//! erasure-coded piece placement, and enqueues segments needing
//! repair. Never moves bytes itself; see `cyxcloud-rebalancer` for
//! the chunk-replication repair executor.

pub mod classifier;
pub mod config;
pub mod driver;
pub mod error;
pub mod health;
pub mod insert_buffer;
pub mod metrics;
pub mod orchestrator;
pub mod overlay_client;
pub mod partial;
pub mod redundancy;
pub mod reliability;
pub mod repair_queue;
pub mod segment_source;
pub mod stats;

pub use classifier::{classify, Classification, Piece};
pub use config::CheckerConfig;
pub use driver::{DriverState, Iteration, ScanDriver};
pub use error::{CheckerError, Result};
pub use health::{HealthInputs, HealthMode, HealthResult};
pub use insert_buffer::InsertBuffer;
pub use metrics::CheckerMetrics;
pub use orchestrator::{Orchestrator, OrchestratorHandle};
pub use overlay_client::PostgresOverlayClient;
pub use partial::{PartialConfig, PartialProcessor};
pub use redundancy::{OverrideMap, RedundancyKey, RedundancyScheme};
pub use reliability::{NodeId, NodeSnapshotEntry, OverlayClient, ReliabilityCache, ReliabilityCacheConfig};
pub use repair_queue::{InjuredSegment, PostgresRepairQueue, RepairQueue};
pub use segment_source::{PostgresSegmentSource, SegmentPartial, SegmentRecord, SegmentSource};
pub use stats::{BucketStats, TotalStats};

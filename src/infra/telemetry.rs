use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "plaza_post_cache_hit_total",
            Unit::Count,
            "Total number of post cache hits."
        );
        describe_counter!(
            "plaza_post_cache_miss_total",
            Unit::Count,
            "Total number of post cache misses, including failed reads."
        );
        describe_counter!(
            "plaza_post_cache_corrupt_total",
            Unit::Count,
            "Total number of undecodable post cache entries discarded."
        );
        describe_counter!(
            "plaza_negative_cache_hit_total",
            Unit::Count,
            "Total number of lookups answered by a not-found marker."
        );
        describe_counter!(
            "plaza_vote_total",
            Unit::Count,
            "Total number of votes by outcome."
        );
        describe_counter!(
            "plaza_view_recorded_total",
            Unit::Count,
            "Total number of views recorded, labelled by deduplication."
        );
        describe_counter!(
            "plaza_post_created_total",
            Unit::Count,
            "Total number of posts created."
        );
        describe_counter!(
            "plaza_post_updated_total",
            Unit::Count,
            "Total number of post updates by invalidation strategy."
        );
        describe_counter!(
            "plaza_fast_store_evict_total",
            Unit::Count,
            "Total number of volatile fast-store keys evicted due to capacity."
        );
        describe_counter!(
            "plaza_reconcile_runs_total",
            Unit::Count,
            "Total number of reconciliation passes by outcome."
        );
        describe_histogram!(
            "plaza_reconcile_ms",
            Unit::Milliseconds,
            "Reconciliation pass latency in milliseconds."
        );
        describe_gauge!(
            "plaza_deferred_tasks_inflight",
            Unit::Count,
            "Background cache and index tasks currently running or waiting."
        );
    });
}

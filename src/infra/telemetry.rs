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
            "brusio_stats_events_total",
            Unit::Count,
            "Total number of content events applied to a statistics cache, by kind."
        );
        describe_counter!(
            "brusio_stats_rebuilds_total",
            Unit::Count,
            "Total number of recursive rebuilds, scoped or full."
        );
        describe_gauge!(
            "brusio_stats_tracked_nodes",
            Unit::Count,
            "Current number of category nodes in the hierarchy snapshot."
        );
        describe_histogram!(
            "brusio_stats_initialize_ms",
            Unit::Milliseconds,
            "Full cache initialization latency in milliseconds."
        );
        describe_histogram!(
            "brusio_stats_rebuild_ms",
            Unit::Milliseconds,
            "Scoped ancestor-path rebuild latency in milliseconds."
        );
    });
}

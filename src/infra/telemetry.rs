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

/// Install the global subscriber described by `logging`.
///
/// Builds run on the blocking pool, so log lines carry the thread name to
/// tell concurrent packages apart. `RUST_LOG` still overrides the level.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let output = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_thread_names(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_thread_names(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .with(ErrorLayer::default())
        .try_init()
        .map_err(|err| InfraError::telemetry(format!("tracing subscriber already set: {err}")))
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "folio_packages_created_total",
            Unit::Count,
            "Total number of packages registered."
        );
        describe_counter!(
            "folio_packages_ready_total",
            Unit::Count,
            "Total number of packages whose build completed."
        );
        describe_counter!(
            "folio_packages_reclaimed_total",
            Unit::Count,
            "Total number of expired packages removed by the reaper."
        );
        describe_counter!(
            "folio_orphans_removed_total",
            Unit::Count,
            "Total number of untracked workspace entries removed by the reaper."
        );
        describe_histogram!(
            "folio_package_build_ms",
            Unit::Milliseconds,
            "Package build latency in milliseconds."
        );
        describe_gauge!(
            "folio_registry_packages",
            Unit::Count,
            "Current number of packages tracked by the registry."
        );
    });
}

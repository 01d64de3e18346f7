use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Applied only when `RUST_LOG` is unset.
const SQLX_QUERY_DIRECTIVE: &str = "sqlx::query=warn";

/// Install the process-wide subscriber and register metric descriptions.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let mut filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_none() {
        let directive = SQLX_QUERY_DIRECTIVE
            .parse()
            .map_err(|err| InfraError::telemetry(format!("bad log directive: {err}")))?;
        filter = filter.add_directive(directive);
    }

    let output = match logging.format {
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .with(ErrorLayer::default())
        .try_init()
        .map_err(|err| InfraError::telemetry(format!("subscriber already installed: {err}")))
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "tessera_view_compile_total",
            Unit::Count,
            "Total number of forced view compilations that succeeded."
        );
        describe_counter!(
            "tessera_view_compile_failed_total",
            Unit::Count,
            "Total number of forced view compilations that failed."
        );
        describe_counter!(
            "tessera_view_cache_evicted_total",
            Unit::Count,
            "Total number of compiled view artifacts deleted before recompilation."
        );
        describe_counter!(
            "tessera_piece_location_pruned_total",
            Unit::Count,
            "Total number of piece locations removed because their view stopped compiling."
        );
    });
}

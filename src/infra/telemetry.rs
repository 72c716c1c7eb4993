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

/// HTTP client and server internals log per-connection chatter at debug.
const QUIET_DEPENDENCIES: [&str; 3] = ["hyper_util=warn", "reqwest=warn", "rustls=warn"];

/// Install a global tracing subscriber using the provided logging settings.
///
/// `RUST_LOG` wins over the configured level; dependencies in
/// [`QUIET_DEPENDENCIES`] are capped at `warn` unless `RUST_LOG` names them.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = build_filter(logging, std::env::var(EnvFilter::DEFAULT_ENV).ok())?;

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

fn build_filter(
    logging: &LoggingSettings,
    rust_log: Option<String>,
) -> Result<EnvFilter, InfraError> {
    let mut filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .parse_lossy(rust_log.as_deref().unwrap_or_default());

    for directive in QUIET_DEPENDENCIES {
        let target = directive.split('=').next().unwrap_or(directive);
        if rust_log.as_deref().is_some_and(|value| value.contains(target)) {
            continue;
        }
        let directive = directive
            .parse()
            .map_err(|err| InfraError::telemetry(format!("invalid directive `{directive}`: {err}")))?;
        filter = filter.add_directive(directive);
    }

    Ok(filter)
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "nbpress_cache_hit_total",
            Unit::Count,
            "Notebook renders served from a fresh cache entry."
        );
        describe_counter!(
            "nbpress_cache_miss_total",
            Unit::Count,
            "Notebook renders that had to fetch and transform the source."
        );
        describe_counter!(
            "nbpress_cache_expired_total",
            Unit::Count,
            "Cache entries found at or past their time-to-live."
        );
        describe_counter!(
            "nbpress_images_materialized_total",
            Unit::Count,
            "Embedded notebook images written to the media directory."
        );
        describe_counter!(
            "nbpress_metadata_synced_total",
            Unit::Count,
            "Metadata cells applied to posts."
        );
    });
}

#[cfg(test)]
mod tests {
    use tracing::level_filters::LevelFilter;

    use super::*;

    fn logging(level: LevelFilter) -> LoggingSettings {
        LoggingSettings {
            level,
            format: LogFormat::Compact,
        }
    }

    #[test]
    fn configured_level_applies_without_rust_log() {
        let filter = build_filter(&logging(LevelFilter::DEBUG), None).expect("filter");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
        assert!(filter.to_string().contains("reqwest=warn"));
    }

    #[test]
    fn rust_log_can_unmute_a_dependency() {
        let filter = build_filter(&logging(LevelFilter::INFO), Some("reqwest=trace".to_string()))
            .expect("filter");
        let rendered = filter.to_string();
        assert!(rendered.contains("reqwest=trace"));
        assert!(!rendered.contains("reqwest=warn"));
        assert!(rendered.contains("hyper_util=warn"));
    }
}

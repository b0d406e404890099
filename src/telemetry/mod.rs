//! Structured logging setup

use crate::config::TelemetryConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "custom_email_sender=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into())
}

/// Install the global subscriber.
///
/// `json` (the default) writes one flattened JSON object per event with no
/// ANSI colours and no timestamp, since CloudWatch stamps each line itself.
/// Any other format uses the human-readable formatter.
pub fn init(config: &TelemetryConfig) {
    let registry = tracing_subscriber::registry().with(env_filter());

    if config.log_format == "json" {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_ansi(false)
            .without_time();
        registry.with(fmt_layer).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

//! Tracing setup

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Default filter directive for a configured level
pub fn default_directive(config: &LoggingConfig) -> String {
    format!("smartmarks={}", config.level)
}

/// Install the global subscriber. `RUST_LOG` wins over the configured
/// level. Output goes to stderr; stdout carries the rendered view.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config)));

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    if let Err(e) = result {
        eprintln!("Logging already initialized: {}", e);
    }
}

//! Logging initialization
//!
//! - Respects `RUST_LOG` (always takes precedence)
//! - Falls back to the filter implied by configuration (quiet/debug)
//! - Defaults to "info"
//!
//! # Usage
//! ```rust,no_run
//! use modgate::utils::init_logging;
//!
//! init_logging(None); // Uses RUST_LOG or defaults to "info"
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoaderConfig;

fn env_filter(filter: Option<&str>) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }
    EnvFilter::new(filter.unwrap_or("info"))
}

/// Initialize human-readable logging on stderr
///
/// # Arguments
/// * `filter` - Optional log filter (e.g. "warn", "modgate=debug"). Ignored
///   when `RUST_LOG` is set.
pub fn init_logging(filter: Option<&str>) {
    // try_init: a second initialization (tests, embedding) is not an error
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(std::env::var("NO_COLOR").is_err()),
        )
        .with(env_filter(filter))
        .try_init();
}

/// Initialize logging with JSON output (for log aggregation)
#[cfg(feature = "json-logging")]
pub fn init_json_logging(filter: Option<&str>) {
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_current_span(true)
                .with_span_list(true),
        )
        .with(env_filter(filter))
        .try_init();
}

/// Initialize logging from loader configuration
pub fn init_logging_from_config(config: &LoaderConfig) {
    let filter = config.log_filter();

    if config.logging.json_format {
        #[cfg(feature = "json-logging")]
        {
            init_json_logging(filter.as_deref());
        }
        #[cfg(not(feature = "json-logging"))]
        {
            init_logging(filter.as_deref());
        }
    } else {
        init_logging(filter.as_deref());
    }
}

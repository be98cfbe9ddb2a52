//! Shared utilities: environment toggles, logging, signals

pub mod env;
pub mod logging;
pub mod signal;

pub use env::{env_flag, env_int, env_opt};
#[cfg(feature = "json-logging")]
pub use logging::init_json_logging;
pub use logging::{init_logging, init_logging_from_config};
pub use signal::{cancel_on_shutdown_signal, wait_for_shutdown_signal};

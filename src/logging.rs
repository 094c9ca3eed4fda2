//! Logging setup.

use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

use crate::config::{LoggingConfig, DEFAULT_FILTER};

/// Install a global fmt subscriber filtered by `config.filter`.
///
/// An invalid filter falls back to [`DEFAULT_FILTER`] and is reported as a
/// warning through the installed subscriber. Returns false if a subscriber was
/// already installed; the existing one is left in place.
pub fn init(config: &LoggingConfig) -> bool {
    let (filter, invalid) = parse_filter(&config.filter);

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok();

    if let Some(err) = invalid {
        tracing::warn!(
            filter = %config.filter,
            error = %err,
            fallback = DEFAULT_FILTER,
            "Invalid log filter"
        );
    }
    installed
}

/// `filter` as an `EnvFilter`, or the default filter plus the parse error.
fn parse_filter(filter: &str) -> (EnvFilter, Option<ParseError>) {
    match EnvFilter::try_new(filter) {
        Ok(filter) => (filter, None),
        Err(err) => (EnvFilter::new(DEFAULT_FILTER), Some(err)),
    }
}

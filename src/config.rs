//! Configuration with layered resolution using figment.
//!
//! Resolution order (highest priority last):
//! 1. User config: `~/.config/strata/config.toml` (XDG) or platform config dir
//! 2. Project config: `.strata.toml`
//! 3. Environment variables: `STRATA_*`
//!
//! # Intended Usage
//!
//! **Project config** (`.strata.toml`):
//! ```toml
//! [bindings]
//! Storage = "PostgresStorage"
//! Clock = "SystemClock"
//!
//! [logging]
//! filter = "strata=debug"
//! ```
//!
//! Bindings name services registered in a [`Catalog`](crate::Catalog): each
//! entry maps an abstract service to the concrete one that should answer for
//! it, and becomes a subclass provider when the catalog derives a context.

use std::collections::BTreeMap;
use std::ops::Deref;
use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

/// Boxed wrapper for figment::Error to reduce Result size on the stack.
#[derive(Debug)]
pub struct ConfigError(Box<figment::Error>);

impl Deref for ConfigError {
    type Target = figment::Error;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self(Box::new(err))
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Abstract service name to concrete service name.
    #[serde(default)]
    pub bindings: BTreeMap<String, String>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive (e.g., "strata=debug").
    #[serde(default = "default_filter")]
    pub filter: String,
}

/// Default log filter when none is configured.
pub const DEFAULT_FILTER: &str = "info";

fn default_filter() -> String {
    DEFAULT_FILTER.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

impl Config {
    /// Load config with layered resolution (user → project → env).
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    /// The layered figment `load` extracts from.
    pub fn figment() -> Figment {
        Figment::new()
            // Layer 1: User config (lowest priority)
            .merge(Toml::file(Self::user_config_path()))
            // Layer 2: Project config
            .merge(Toml::file(".strata.toml"))
            // Layer 3: Environment variables (highest priority)
            .merge(Env::prefixed("STRATA_").split("_"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        figment.extract().map_err(ConfigError::from)
    }

    /// Binding for an abstract service name, if configured.
    pub fn binding(&self, service: &str) -> Option<&str> {
        self.bindings.get(service).map(String::as_str)
    }

    /// User config path: ~/.config/strata/config.toml (XDG) or platform config dir.
    fn user_config_path() -> PathBuf {
        // Prefer XDG config location (~/.config) on all platforms
        if let Some(home) = dirs::home_dir() {
            let xdg_path = home.join(".config").join("strata").join("config.toml");
            if xdg_path.exists() {
                return xdg_path;
            }
        }
        // Fall back to platform-specific config dir
        dirs::config_dir()
            .map(|p| p.join("strata").join("config.toml"))
            .unwrap_or_default()
    }
}

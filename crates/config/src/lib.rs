//! Configuration loading, validation and env substitution.
//!
//! Config files: `ferry.toml`, `ferry.yaml`, or `ferry.json`
//! Searched in `./` then `~/.config/ferry/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-default}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{apply_env_overrides, config_dir, discover_and_load, load_config},
    schema::{
        DatabaseConfig, FerryConfig, MetricsConfig, RoutingConfig, TelegramConfig, UserbotConfig,
        VaultConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};

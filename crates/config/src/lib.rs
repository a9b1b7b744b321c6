//! Configuration loading, validation, and env substitution.
//!
//! Config files: `gleaner.toml`, `gleaner.yaml`, or `gleaner.json`,
//! searched in `./` then `~/.config/gleaner/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{config_dir, discover_and_load, find_or_default_config_path, load_config, save_config},
    schema::{CollectorConfig, GleanerConfig, RunConfig, SessionConfig, TargetEntry},
    validate::{Diagnostic, Severity, ValidationResult, validate},
};

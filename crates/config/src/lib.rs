//! Configuration loading and env substitution for credlink.
//!
//! Config files: `credlink.toml`, `credlink.yaml`, or `credlink.json`
//! Searched in `./` then the user config directory (`~/.config/credlink/` on Linux).
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;

pub use {
    error::{Error, Result},
    loader::{config_dir, discover_and_load, load_config},
    schema::{CredlinkConfig, ProviderEntry, ProvidersConfig},
};

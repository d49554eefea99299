//! Configuration loading for the Sandpit playground server.
//!
//! Config files: `sandpit.toml`, `sandpit.yaml`, or `sandpit.json`,
//! searched in `./` then the user config dir (`~/.config/sandpit/`).
//!
//! Supports `${ENV_VAR}` substitution in the raw file before parsing.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{config_dir, data_dir, discover_and_load, load_config},
    schema::{ProjectConfig, RuntimeConfig, SandpitConfig, ServerConfig},
};

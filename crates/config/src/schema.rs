//! Config schema types (server, sandbox runtime, initial project).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default port the playground server listens on.
pub const DEFAULT_PORT: u16 = 4815;

/// Default interval between preview-port probes, in milliseconds.
pub const DEFAULT_PROBE_INTERVAL_MS: u64 = 250;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SandpitConfig {
    pub server: ServerConfig,
    pub runtime: RuntimeConfig,
    pub project: ProjectConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "127.0.0.1".
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: DEFAULT_PORT,
        }
    }
}

/// Sandbox runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Path to the `npm` binary. Resolved from `PATH` when unset.
    pub npm_bin: Option<PathBuf>,
    /// Directory where per-session scratch projects are created.
    /// Defaults to `<data dir>/sessions`.
    pub sessions_dir: Option<PathBuf>,
    /// Interval in milliseconds between preview-port probes.
    pub probe_interval_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            npm_bin: None,
            sessions_dir: None,
            probe_interval_ms: DEFAULT_PROBE_INTERVAL_MS,
        }
    }
}

/// Initial project settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// File whose contents seed the editor instead of the built-in sample.
    pub source: Option<PathBuf>,
}

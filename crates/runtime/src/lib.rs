//! Sandbox runtimes for the Sandpit playground.
//!
//! A [`SandboxRuntime`] hosts one virtual project: it mounts a file tree,
//! overwrites individual files, spawns commands whose output arrives as an
//! ordered stream of chunks, and announces when a spawned server starts
//! accepting connections. [`NodeRuntime`] is the production backend (a
//! scratch directory plus real `npm` child processes); [`ScriptedRuntime`]
//! is an in-memory backend that records every operation for tests.
//!
//! [`SessionManager`] owns the single lazily-booted session the rest of the
//! application shares.

pub mod error;
pub mod manager;
pub mod node;
pub mod process;
pub mod project;
pub mod scripted;

pub use {
    error::{Error, Result},
    manager::{SandboxSession, SessionManager},
    node::NodeRuntime,
    process::{ExitOutcome, ProcessEvent, SandboxProcess},
    project::{DEFAULT_SOURCE, ENTRY_FILE, MANIFEST_FILE, ProjectTree, TreeEntry, default_project},
    scripted::{JournalEntry, ProcessPlan, ScriptedRuntime},
};

use {async_trait::async_trait, serde::Serialize, tokio::sync::broadcast};

/// Notification that a spawned server process has bound its preview port.
///
/// Fires at most once per server process; the URL is handed to subscribers
/// untransformed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ServerReady {
    pub port: u16,
    pub url: String,
}

/// A sandbox capable of holding one virtual project.
///
/// Object-safe so the lifecycle layer can stay backend-agnostic; see
/// [`NodeRuntime`] for the production implementation and [`ScriptedRuntime`]
/// for the scripted test double.
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    /// Short backend identifier for logs.
    fn backend_name(&self) -> &'static str;

    /// Write every file of `tree` into the sandbox filesystem.
    async fn mount(&self, tree: &ProjectTree) -> Result<()>;

    /// Create or overwrite a single project-relative file.
    async fn write_file(&self, path: &str, contents: &str) -> Result<()>;

    /// Spawn a command inside the sandbox.
    async fn spawn(&self, command: &str, args: &[&str]) -> Result<Box<dyn SandboxProcess>>;

    /// Subscribe to server-ready notifications. The subscription outlives
    /// individual processes; it fires for every server the session starts.
    fn subscribe_server_ready(&self) -> broadcast::Receiver<ServerReady>;

    /// Command that installs the project's dependencies.
    fn install_command(&self) -> (&'static str, &'static [&'static str]) {
        ("npm", &["install"])
    }

    /// Command that starts the project's server.
    fn start_command(&self) -> (&'static str, &'static [&'static str]) {
        ("npm", &["start"])
    }
}

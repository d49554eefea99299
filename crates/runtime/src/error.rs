use std::path::PathBuf;

/// Errors surfaced by sandbox runtimes and the session manager.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Boot failed. The message is cached by the session manager and
    /// replayed on every later acquire.
    #[error("sandbox boot failed: {0}")]
    Boot(String),

    /// A required host binary could not be resolved on PATH.
    #[error("required binary not found: {name}")]
    MissingBinary { name: String },

    /// A project path escaped the sandbox root or was otherwise unusable.
    #[error("invalid project path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// Writing a project file into the sandbox failed. The cause rides in
    /// the message because these errors surface verbatim as transcript
    /// chunks.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Spawning a process inside the sandbox failed.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

use {
    crate::transcript::Chunk,
    serde::{Deserialize, Serialize},
};

/// Lifecycle state of the playground session.
///
/// `Initializing → Installing → Ready`; `Errored` is terminal and reachable
/// from the first two. Run requests are accepted only in `Ready`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initializing,
    Installing,
    Ready,
    Errored,
}

impl Phase {
    #[must_use]
    pub fn accepts_runs(self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// One observable playground change, broadcast to attached clients.
///
/// Serializes with a `type` tag so the web layer can forward events as
/// WebSocket frames without translation.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaygroundEvent {
    Phase { phase: Phase },
    Chunk { chunk: Chunk },
    ServerReady { port: u16, url: String },
}

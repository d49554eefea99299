//! The Sandpit lifecycle layer.
//!
//! [`Playground`] drives the edit / install / run / preview workflow against
//! a sandbox session: boot the sandbox, mount the initial project, stream
//! the dependency install, then accept run requests that replace the server
//! process. Everything observable flows through two ordered surfaces: the
//! append-only [`Transcript`] and the [`PlaygroundEvent`] broadcast that web
//! sockets translate into frames.

pub mod controller;
pub mod error;
pub mod events;
pub mod transcript;

pub use {
    controller::{Playground, PlaygroundSnapshot},
    error::{Error, Result},
    events::{Phase, PlaygroundEvent},
    transcript::{Chunk, ChunkKind, Transcript},
};

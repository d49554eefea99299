//! The lifecycle controller: boot, install, run, preview.

use std::sync::{
    Arc, RwLock,
    atomic::{AtomicBool, Ordering},
};

use {
    sandpit_runtime::{
        ENTRY_FILE, ProcessEvent, SandboxProcess, SandboxSession, ServerReady, SessionManager,
        default_project,
    },
    tokio::sync::{Mutex, OnceCell, broadcast, mpsc::UnboundedReceiver},
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    events::{Phase, PlaygroundEvent},
    transcript::{Chunk, ChunkKind, Transcript},
};

const EVENT_CAPACITY: usize = 1024;

/// Transcript marker appended when dependency installation completes.
const READY_MARKER: &str = "dependencies installed, sandbox ready";

/// Transcript separator appended at the start of every run.
const RUN_SEPARATOR: &str = "--- run ---";

/// Point-in-time view handed to a client when it attaches.
#[derive(Clone, Debug, serde::Serialize)]
pub struct PlaygroundSnapshot {
    pub phase: Phase,
    pub chunks: Vec<Chunk>,
    pub preview_url: Option<String>,
}

/// The process-wide playground: one sandbox session, one transcript, at most
/// one live server process.
///
/// All mutation funnels through the initialize pipeline (spawned once by
/// [`ensure_started`](Self::ensure_started)) and [`run`](Self::run); clients
/// observe state through [`attach`](Self::attach) and the event broadcast.
pub struct Playground {
    manager: SessionManager,
    initial_source: String,
    transcript: Transcript,
    events: broadcast::Sender<PlaygroundEvent>,
    started: AtomicBool,
    phase: RwLock<Phase>,
    preview_url: RwLock<Option<String>>,
    session: OnceCell<SandboxSession>,
    // At most one live server process; replaced, never accumulated.
    server: Mutex<Option<Box<dyn SandboxProcess>>>,
}

impl Playground {
    #[must_use]
    pub fn new(manager: SessionManager, initial_source: String) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            manager,
            initial_source,
            transcript: Transcript::new(),
            events,
            started: AtomicBool::new(false),
            phase: RwLock::new(Phase::Initializing),
            preview_url: RwLock::new(None),
            session: OnceCell::new(),
            server: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase.read().map(|p| *p).unwrap_or(Phase::Errored)
    }

    /// URL announced by the most recent server-ready notification, if any.
    #[must_use]
    pub fn preview_url(&self) -> Option<String> {
        self.preview_url.read().map(|u| u.clone()).unwrap_or(None)
    }

    /// Source text the editor is seeded with before the first edit.
    #[must_use]
    pub fn initial_source(&self) -> &str {
        &self.initial_source
    }

    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<PlaygroundEvent> {
        self.events.subscribe()
    }

    /// Snapshot current state and subscribe to future events.
    ///
    /// The subscription is taken before the snapshot, so no event is lost;
    /// chunk events already covered by the snapshot may be replayed and are
    /// filtered by the consumer using the chunk sequence number.
    #[must_use]
    pub fn attach(&self) -> (PlaygroundSnapshot, broadcast::Receiver<PlaygroundEvent>) {
        let rx = self.events.subscribe();
        let snapshot = PlaygroundSnapshot {
            phase: self.phase(),
            chunks: self.transcript.snapshot(),
            preview_url: self.preview_url(),
        };
        (snapshot, rx)
    }

    /// Kick off the boot / mount / install pipeline, at most once.
    ///
    /// Later calls (every browser tab attaching) are no-ops.
    pub fn ensure_started(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move { this.initialize().await });
    }

    async fn initialize(self: Arc<Self>) {
        self.push_chunk(ChunkKind::System, "booting sandbox session");
        let session = match self.manager.acquire().await {
            Ok(session) => session,
            Err(err) => return self.fail_init("sandbox boot failed", &err),
        };
        let _ = self.session.set(session.clone());
        let runtime = Arc::clone(session.runtime());

        if let Err(err) = runtime.mount(&default_project(&self.initial_source)).await {
            return self.fail_init("project mount failed", &err);
        }

        // Standing subscription: applies to every server this session starts,
        // not just the first run's.
        self.spawn_server_ready_forwarder(runtime.subscribe_server_ready());

        self.set_phase(Phase::Installing);
        let (command, args) = runtime.install_command();
        self.push_chunk(
            ChunkKind::System,
            format!("installing dependencies: {command} {}", args.join(" ")),
        );

        let mut install = match runtime.spawn(command, args).await {
            Ok(process) => process,
            Err(err) => return self.fail_init("dependency install failed", &err),
        };
        if let Some(mut output) = install.take_output() {
            while let Some(event) = output.recv().await {
                self.push_process_event(event);
            }
        }
        match install.wait().await {
            Ok(outcome) if outcome.success => {
                self.push_chunk(ChunkKind::System, READY_MARKER);
                self.set_phase(Phase::Ready);
            },
            Ok(outcome) => {
                self.push_chunk(
                    ChunkKind::Error,
                    format!("dependency install failed ({})", outcome.describe()),
                );
                self.set_phase(Phase::Errored);
            },
            Err(err) => self.fail_init("dependency install failed", &err),
        }
    }

    /// Run the current editor text: replace the server process with a fresh
    /// one running `code`.
    ///
    /// Only valid in [`Phase::Ready`]. Failures are appended to the
    /// transcript and leave the phase untouched, so the caller may retry.
    pub async fn run(self: &Arc<Self>, code: &str) -> Result<()> {
        match self.phase() {
            Phase::Ready => {},
            Phase::Errored => return Err(Error::Disabled),
            Phase::Initializing | Phase::Installing => return Err(Error::NotReady),
        }
        let Some(session) = self.session.get() else {
            return Err(Error::NotReady);
        };
        let runtime = Arc::clone(session.runtime());

        // The slot lock also serializes overlapping run requests.
        let mut server = self.server.lock().await;
        if let Some(mut previous) = server.take() {
            // Termination is requested, not awaited; overlap between the old
            // process winding down and the new spawn is accepted.
            previous.kill();
            debug!("requested termination of the previous server process");
        }

        self.push_chunk(ChunkKind::Separator, RUN_SEPARATOR);

        if let Err(err) = runtime.write_file(ENTRY_FILE, code).await {
            self.push_chunk(
                ChunkKind::Error,
                format!("failed to update {ENTRY_FILE}: {err}"),
            );
            return Err(err.into());
        }

        let (command, args) = runtime.start_command();
        let mut process = match runtime.spawn(command, args).await {
            Ok(process) => process,
            Err(err) => {
                self.push_chunk(ChunkKind::Error, format!("failed to start server: {err}"));
                return Err(err.into());
            },
        };
        if let Some(output) = process.take_output() {
            self.stream_process_output(output);
        }
        *server = Some(process);
        Ok(())
    }

    /// Forward a process's ordered output into the transcript for as long as
    /// it lives. One task per process keeps per-process chunk order intact.
    fn stream_process_output(self: &Arc<Self>, mut output: UnboundedReceiver<ProcessEvent>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = output.recv().await {
                this.push_process_event(event);
            }
        });
    }

    fn spawn_server_ready_forwarder(self: &Arc<Self>, mut rx: broadcast::Receiver<ServerReady>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ready) => {
                        info!(port = ready.port, url = %ready.url, "preview server ready");
                        if let Ok(mut url) = this.preview_url.write() {
                            *url = Some(ready.url.clone());
                        }
                        this.push_chunk(
                            ChunkKind::System,
                            format!("preview server ready at {}", ready.url),
                        );
                        let _ = this.events.send(PlaygroundEvent::ServerReady {
                            port: ready.port,
                            url: ready.url,
                        });
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "server-ready forwarder lagged");
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    fn push_process_event(&self, event: ProcessEvent) {
        match event {
            ProcessEvent::Output(text) => self.push_chunk(ChunkKind::Output, text),
            ProcessEvent::Error(text) => self.push_chunk(ChunkKind::Error, text),
        }
    }

    fn push_chunk(&self, kind: ChunkKind, text: impl Into<String>) {
        let chunk = self.transcript.append(kind, text);
        let _ = self.events.send(PlaygroundEvent::Chunk { chunk });
    }

    fn set_phase(&self, phase: Phase) {
        if let Ok(mut current) = self.phase.write() {
            *current = phase;
        }
        info!(?phase, "playground phase changed");
        let _ = self.events.send(PlaygroundEvent::Phase { phase });
    }

    fn fail_init(&self, context: &str, err: &dyn std::fmt::Display) {
        warn!(context, error = %err, "playground initialization failed");
        self.push_chunk(ChunkKind::Error, format!("{context}: {err}"));
        self.set_phase(Phase::Errored);
    }
}

//! Scripted in-memory sandbox backend for tests.
//!
//! [`ScriptedRuntime`] implements [`SandboxRuntime`] without touching the
//! filesystem or spawning anything: every operation is recorded in an
//! operation journal, and spawned processes play back pre-planned output.
//! Lifecycle tests assert against the journal (what was mounted, written,
//! spawned, and killed, in which order) and drive server-ready notifications
//! by hand.

use {
    crate::{
        Error, ProjectTree, Result, SandboxRuntime, ServerReady,
        process::{ExitOutcome, ProcessEvent, SandboxProcess},
    },
    async_trait::async_trait,
    std::{
        collections::VecDeque,
        sync::{
            Arc, Mutex,
            atomic::{AtomicU64, Ordering},
        },
    },
    tokio::sync::{
        Notify, broadcast,
        mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
    },
};

/// One recorded sandbox operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JournalEntry {
    Mount {
        files: Vec<(String, String)>,
    },
    Write {
        path: String,
        contents: String,
    },
    Spawn {
        command: String,
        args: Vec<String>,
        pid: u64,
    },
    Kill {
        pid: u64,
    },
}

/// Playback script for one spawned process.
#[derive(Clone, Debug)]
pub struct ProcessPlan {
    events: Vec<ProcessEvent>,
    exit: ExitOutcome,
    long_running: bool,
    spawn_error: Option<String>,
}

impl ProcessPlan {
    /// A process that emits `chunks` on stdout and exits zero.
    #[must_use]
    pub fn succeeds(chunks: &[&str]) -> Self {
        Self {
            events: chunks
                .iter()
                .map(|c| ProcessEvent::Output((*c).to_string()))
                .collect(),
            exit: ExitOutcome {
                success: true,
                code: Some(0),
            },
            long_running: false,
            spawn_error: None,
        }
    }

    /// A process that emits `chunks` on stderr and exits with `code`.
    #[must_use]
    pub fn fails(chunks: &[&str], code: i32) -> Self {
        Self {
            events: chunks
                .iter()
                .map(|c| ProcessEvent::Error((*c).to_string()))
                .collect(),
            exit: ExitOutcome {
                success: false,
                code: Some(code),
            },
            long_running: false,
            spawn_error: None,
        }
    }

    /// A server process: emits `chunks`, then stays alive until killed.
    #[must_use]
    pub fn server(chunks: &[&str]) -> Self {
        Self {
            long_running: true,
            ..Self::succeeds(chunks)
        }
    }

    /// A spawn attempt that fails outright.
    #[must_use]
    pub fn spawn_error(message: &str) -> Self {
        Self {
            events: Vec::new(),
            exit: ExitOutcome {
                success: false,
                code: None,
            },
            long_running: false,
            spawn_error: Some(message.to_string()),
        }
    }
}

/// In-memory [`SandboxRuntime`] that records operations and plays scripts.
pub struct ScriptedRuntime {
    journal: Arc<Mutex<Vec<JournalEntry>>>,
    plans: Mutex<VecDeque<ProcessPlan>>,
    ready_tx: broadcast::Sender<ServerReady>,
    next_pid: AtomicU64,
    fail_next_mount: Mutex<Option<String>>,
    fail_next_write: Mutex<Option<String>>,
}

impl Default for ScriptedRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRuntime {
    #[must_use]
    pub fn new() -> Self {
        let (ready_tx, _) = broadcast::channel(16);
        Self {
            journal: Arc::new(Mutex::new(Vec::new())),
            plans: Mutex::new(VecDeque::new()),
            ready_tx,
            next_pid: AtomicU64::new(1),
            fail_next_mount: Mutex::new(None),
            fail_next_write: Mutex::new(None),
        }
    }

    /// Queue the script for the next spawned process. Plans are consumed in
    /// spawn order; spawning with an empty queue is a spawn failure.
    pub fn plan(&self, plan: ProcessPlan) {
        if let Ok(mut plans) = self.plans.lock() {
            plans.push_back(plan);
        }
    }

    /// Make the next `mount` call fail with `message`.
    pub fn fail_next_mount(&self, message: &str) {
        if let Ok(mut slot) = self.fail_next_mount.lock() {
            *slot = Some(message.to_string());
        }
    }

    /// Make the next `write_file` call fail with `message`.
    pub fn fail_next_write(&self, message: &str) {
        if let Ok(mut slot) = self.fail_next_write.lock() {
            *slot = Some(message.to_string());
        }
    }

    /// Fire a server-ready notification to all subscribers.
    pub fn emit_server_ready(&self, port: u16, url: &str) {
        let _ = self.ready_tx.send(ServerReady {
            port,
            url: url.to_string(),
        });
    }

    /// Snapshot of the operation journal.
    #[must_use]
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.journal.lock().map(|j| j.clone()).unwrap_or_default()
    }

    fn record(&self, entry: JournalEntry) {
        if let Ok(mut journal) = self.journal.lock() {
            journal.push(entry);
        }
    }
}

#[async_trait]
impl SandboxRuntime for ScriptedRuntime {
    fn backend_name(&self) -> &'static str {
        "scripted"
    }

    async fn mount(&self, tree: &ProjectTree) -> Result<()> {
        if let Ok(mut slot) = self.fail_next_mount.lock()
            && let Some(message) = slot.take()
        {
            return Err(Error::Io(std::io::Error::other(message)));
        }
        let files = tree
            .files()
            .into_iter()
            .map(|(path, contents)| (path, contents.to_string()))
            .collect();
        self.record(JournalEntry::Mount { files });
        Ok(())
    }

    async fn write_file(&self, path: &str, contents: &str) -> Result<()> {
        if let Ok(mut slot) = self.fail_next_write.lock()
            && let Some(message) = slot.take()
        {
            return Err(Error::Write {
                path: path.into(),
                source: std::io::Error::other(message),
            });
        }
        self.record(JournalEntry::Write {
            path: path.to_string(),
            contents: contents.to_string(),
        });
        Ok(())
    }

    async fn spawn(&self, command: &str, args: &[&str]) -> Result<Box<dyn SandboxProcess>> {
        let plan = self.plans.lock().ok().and_then(|mut plans| plans.pop_front());
        let Some(plan) = plan else {
            return Err(Error::Spawn {
                command: command.to_string(),
                source: std::io::Error::other("no scripted process planned"),
            });
        };
        if let Some(message) = plan.spawn_error {
            return Err(Error::Spawn {
                command: command.to_string(),
                source: std::io::Error::other(message),
            });
        }

        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.record(JournalEntry::Spawn {
            command: command.to_string(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
            pid,
        });

        let (tx, rx) = unbounded_channel();
        for event in plan.events {
            let _ = tx.send(event);
        }
        // Dropping the sender closes the stream for short-lived processes;
        // server processes hold it open until killed.
        let hold_open = plan.long_running.then_some(tx);

        Ok(Box::new(ScriptedProcess {
            pid,
            journal: Arc::clone(&self.journal),
            output: Some(rx),
            hold_open,
            exit: plan.exit,
            killed: Arc::new(Notify::new()),
            long_running: plan.long_running,
        }))
    }

    fn subscribe_server_ready(&self) -> broadcast::Receiver<ServerReady> {
        self.ready_tx.subscribe()
    }
}

struct ScriptedProcess {
    pid: u64,
    journal: Arc<Mutex<Vec<JournalEntry>>>,
    output: Option<UnboundedReceiver<ProcessEvent>>,
    hold_open: Option<UnboundedSender<ProcessEvent>>,
    exit: ExitOutcome,
    killed: Arc<Notify>,
    long_running: bool,
}

#[async_trait]
impl SandboxProcess for ScriptedProcess {
    fn take_output(&mut self) -> Option<UnboundedReceiver<ProcessEvent>> {
        self.output.take()
    }

    async fn wait(&mut self) -> Result<ExitOutcome> {
        if self.long_running {
            self.killed.notified().await;
            return Ok(ExitOutcome {
                success: false,
                code: None,
            });
        }
        Ok(self.exit)
    }

    fn kill(&mut self) {
        if let Ok(mut journal) = self.journal.lock() {
            journal.push(JournalEntry::Kill { pid: self.pid });
        }
        self.hold_open = None;
        self.killed.notify_one();
    }
}

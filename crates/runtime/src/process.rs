use {
    crate::error::Result,
    async_trait::async_trait,
    tokio::{
        io::AsyncReadExt,
        process::Child,
        sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
    },
};

/// One unit of output from a sandboxed process, in arrival order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessEvent {
    /// A chunk of stdout, lossily decoded.
    Output(String),
    /// A chunk of stderr, lossily decoded.
    Error(String),
}

/// Terminal status of a finished process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExitOutcome {
    pub success: bool,
    pub code: Option<i32>,
}

impl ExitOutcome {
    #[must_use]
    pub fn describe(&self) -> String {
        match self.code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// A process running inside a sandbox session.
///
/// Output is consumed exactly once via [`take_output`](Self::take_output);
/// the channel closes when both streams reach EOF.
#[async_trait]
pub trait SandboxProcess: Send {
    /// Take the ordered output stream. Returns `None` after the first call.
    fn take_output(&mut self) -> Option<UnboundedReceiver<ProcessEvent>>;

    /// Wait for the process to exit.
    async fn wait(&mut self) -> Result<ExitOutcome>;

    /// Request termination. Returns once the request is delivered; the
    /// process may still be winding down when this returns.
    fn kill(&mut self);
}

/// [`SandboxProcess`] backed by a local `tokio` child.
pub(crate) struct NodeProcess {
    child: Child,
    output: Option<UnboundedReceiver<ProcessEvent>>,
}

impl NodeProcess {
    /// Wrap a spawned child, draining its piped stdout/stderr into a
    /// single merged event channel.
    pub(crate) fn new(mut child: Child) -> Self {
        let (tx, rx) = unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, tx.clone(), ProcessEvent::Output);
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, tx, ProcessEvent::Error);
        }
        Self {
            child,
            output: Some(rx),
        }
    }
}

fn spawn_reader<R>(
    mut reader: R,
    tx: UnboundedSender<ProcessEvent>,
    wrap: fn(String) -> ProcessEvent,
) where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                    if tx.send(wrap(text)).is_err() {
                        break;
                    }
                },
            }
        }
    });
}

#[async_trait]
impl SandboxProcess for NodeProcess {
    fn take_output(&mut self) -> Option<UnboundedReceiver<ProcessEvent>> {
        self.output.take()
    }

    async fn wait(&mut self) -> Result<ExitOutcome> {
        let status = self.child.wait().await?;
        Ok(ExitOutcome {
            success: status.success(),
            code: status.code(),
        })
    }

    fn kill(&mut self) {
        // The child was spawned as a process-group leader; signal the group
        // so descendants (npm forks the actual server) terminate with it.
        // killpg is a no-op for children that lead no group of their own.
        #[cfg(unix)]
        if let Some(pid) = self.child.id().and_then(|pid| i32::try_from(pid).ok()) {
            use nix::{
                sys::signal::{Signal, killpg},
                unistd::Pid,
            };
            let _ = killpg(Pid::from_raw(pid), Signal::SIGKILL);
        }
        // Deliver the signal without awaiting exit; kill_on_drop backstops
        // children whose handle is dropped before they finish.
        let _ = self.child.start_kill();
    }
}

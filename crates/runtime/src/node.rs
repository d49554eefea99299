use {
    crate::{
        Error, ProjectTree, Result, SandboxRuntime, ServerReady,
        process::{NodeProcess, SandboxProcess},
    },
    async_trait::async_trait,
    sandpit_config::RuntimeConfig,
    std::{
        path::{Component, Path, PathBuf},
        process::Stdio,
        time::Duration,
    },
    tokio::{net::TcpStream, process::Command, sync::broadcast, task::JoinHandle, time::sleep},
    tracing::{debug, info},
};

/// Local Node.js sandbox backend.
///
/// Each session gets a scratch directory for the project tree and one
/// pre-allocated preview port, injected into every child as `PORT`. A
/// standing watcher probes the port and broadcasts [`ServerReady`] on every
/// closed-to-open transition.
pub struct NodeRuntime {
    root: PathBuf,
    npm_bin: PathBuf,
    port: u16,
    ready_tx: broadcast::Sender<ServerReady>,
    watcher: JoinHandle<()>,
}

impl NodeRuntime {
    /// Boot a session: resolve `npm`, create the scratch directory,
    /// allocate the preview port and start the port watcher.
    pub async fn boot(config: &RuntimeConfig) -> Result<Self> {
        let npm_bin = match &config.npm_bin {
            Some(path) => path.clone(),
            None => which::which("npm").map_err(|_| Error::MissingBinary {
                name: "npm".to_string(),
            })?,
        };

        let sessions_dir = config
            .sessions_dir
            .clone()
            .unwrap_or_else(|| sandpit_config::data_dir().join("sessions"));
        let root = sessions_dir.join(uuid::Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&root).await?;

        let port = find_available_port()?;
        let (ready_tx, _) = broadcast::channel(16);
        let interval = Duration::from_millis(config.probe_interval_ms.max(10));
        let watcher = tokio::spawn(watch_port(port, interval, ready_tx.clone()));

        info!(
            root = %root.display(),
            npm = %npm_bin.display(),
            port,
            "sandbox session booted"
        );

        Ok(Self {
            root,
            npm_bin,
            port,
            ready_tx,
            watcher,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn preview_port(&self) -> u16 {
        self.port
    }

    #[cfg(test)]
    fn for_tests(root: PathBuf) -> Self {
        let (ready_tx, _) = broadcast::channel(16);
        Self {
            root,
            npm_bin: PathBuf::from("npm"),
            port: 0,
            ready_tx,
            watcher: tokio::spawn(async {}),
        }
    }
}

impl Drop for NodeRuntime {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

#[async_trait]
impl SandboxRuntime for NodeRuntime {
    fn backend_name(&self) -> &'static str {
        "node"
    }

    async fn mount(&self, tree: &ProjectTree) -> Result<()> {
        for (path, contents) in tree.files() {
            self.write_file(&path, contents).await?;
        }
        debug!(root = %self.root.display(), "project mounted");
        Ok(())
    }

    async fn write_file(&self, path: &str, contents: &str) -> Result<()> {
        let full = project_path(&self.root, path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| Error::Write {
                    path: full.clone(),
                    source,
                })?;
        }
        tokio::fs::write(&full, contents)
            .await
            .map_err(|source| Error::Write { path: full, source })
    }

    async fn spawn(&self, command: &str, args: &[&str]) -> Result<Box<dyn SandboxProcess>> {
        let program = if command == "npm" {
            self.npm_bin.clone()
        } else {
            PathBuf::from(command)
        };

        let mut cmd = Command::new(&program);
        cmd.args(args)
            .current_dir(&self.root)
            .env("PORT", self.port.to_string())
            .env("NO_COLOR", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // The child leads its own process group so a termination request
        // reaches the whole tree (`npm start` forks the actual server).
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|source| Error::Spawn {
            command: render_command(command, args),
            source,
        })?;

        debug!(command = %render_command(command, args), "sandbox process spawned");
        Ok(Box::new(NodeProcess::new(child)))
    }

    fn subscribe_server_ready(&self) -> broadcast::Receiver<ServerReady> {
        self.ready_tx.subscribe()
    }
}

fn render_command(command: &str, args: &[&str]) -> String {
    if args.is_empty() {
        command.to_string()
    } else {
        format!("{command} {}", args.join(" "))
    }
}

/// Resolve a project-relative path under `root`.
///
/// Absolute paths and `..` components are rejected so a project file can
/// never land outside the session scratch directory.
fn project_path(root: &Path, path: &str) -> Result<PathBuf> {
    let rel = Path::new(path);
    if rel.is_absolute() {
        return Err(Error::InvalidPath {
            path: path.to_string(),
            reason: "absolute paths are not allowed".to_string(),
        });
    }
    for component in rel.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {},
            _ => {
                return Err(Error::InvalidPath {
                    path: path.to_string(),
                    reason: "path escapes the session root".to_string(),
                });
            },
        }
    }
    Ok(root.join(rel))
}

/// Ask the OS for a free TCP port by binding port 0 and releasing it.
fn find_available_port() -> Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// Probe `port` forever, emitting [`ServerReady`] on each closed-to-open
/// transition. Re-arms once the port drops so every new server process
/// produces exactly one notification.
async fn watch_port(port: u16, interval: Duration, tx: broadcast::Sender<ServerReady>) {
    let url = format!("http://127.0.0.1:{port}");
    let mut was_open = false;
    loop {
        let open = TcpStream::connect(("127.0.0.1", port)).await.is_ok();
        if open && !was_open {
            debug!(port, "preview server is accepting connections");
            let _ = tx.send(ServerReady {
                port,
                url: url.clone(),
            });
        }
        was_open = open;
        sleep(interval).await;
    }
}

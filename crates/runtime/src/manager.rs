//! Process-wide sandbox session ownership.
//!
//! The playground holds exactly one sandbox session for the lifetime of the
//! process. [`SessionManager::acquire`] is single-flight: the first caller
//! boots the backend, concurrent callers wait on the same boot, and every
//! later caller gets the cached outcome. A failed boot is cached too, so the
//! session never silently re-boots after an error.

use {
    crate::{Error, Result, SandboxRuntime},
    futures::future::BoxFuture,
    std::sync::Arc,
    tokio::sync::Mutex,
    tracing::{info, warn},
};

/// Handle to the process-wide sandbox session.
///
/// Cheap to clone; all clones share the same runtime. There is no teardown
/// operation, the session lives until the process exits.
#[derive(Clone)]
pub struct SandboxSession {
    id: uuid::Uuid,
    runtime: Arc<dyn SandboxRuntime>,
}

impl std::fmt::Debug for SandboxSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxSession")
            .field("id", &self.id)
            .field("backend", &self.runtime.backend_name())
            .finish()
    }
}

impl SandboxSession {
    #[must_use]
    pub fn new(runtime: Arc<dyn SandboxRuntime>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            runtime,
        }
    }

    #[must_use]
    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    #[must_use]
    pub fn runtime(&self) -> &Arc<dyn SandboxRuntime> {
        &self.runtime
    }
}

/// The cached outcome of a failed boot. Kept as a plain message so it can be
/// replayed to every later caller.
#[derive(Clone, Debug)]
struct BootFailure {
    message: String,
}

type BootFuture = BoxFuture<'static, Result<SandboxSession>>;

/// Lazily boots the sandbox session, at most once per process.
pub struct SessionManager {
    boot: Box<dyn Fn() -> BootFuture + Send + Sync>,
    // The lock is held across the boot await, which is what makes acquire
    // single-flight: late callers queue on the mutex and find the slot filled.
    slot: Mutex<Option<std::result::Result<SandboxSession, BootFailure>>>,
}

impl SessionManager {
    /// Create a manager with a custom boot function.
    pub fn new<F>(boot: F) -> Self
    where
        F: Fn() -> BootFuture + Send + Sync + 'static,
    {
        Self {
            boot: Box::new(boot),
            slot: Mutex::new(None),
        }
    }

    /// Create a manager whose first acquire boots a [`crate::NodeRuntime`].
    #[must_use]
    pub fn with_node_backend(config: sandpit_config::RuntimeConfig) -> Self {
        Self::new(move || {
            let config = config.clone();
            Box::pin(async move {
                let runtime = crate::NodeRuntime::boot(&config).await?;
                Ok(SandboxSession::new(Arc::new(runtime)))
            })
        })
    }

    /// Return the session, booting it on first call.
    ///
    /// Boot failures propagate to the caller and are cached: no retry happens
    /// within this process.
    pub async fn acquire(&self) -> Result<SandboxSession> {
        let mut slot = self.slot.lock().await;
        match &*slot {
            Some(Ok(session)) => Ok(session.clone()),
            Some(Err(failure)) => Err(Error::Boot(failure.message.clone())),
            None => match (self.boot)().await {
                Ok(session) => {
                    info!(session = %session.id(), backend = session.runtime().backend_name(), "sandbox session acquired");
                    *slot = Some(Ok(session.clone()));
                    Ok(session)
                },
                Err(err) => {
                    warn!(error = %err, "sandbox boot failed, caching the failure");
                    let message = err.to_string();
                    *slot = Some(Err(BootFailure {
                        message: message.clone(),
                    }));
                    Err(err)
                },
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::ScriptedRuntime,
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    fn scripted_manager(boots: Arc<AtomicUsize>) -> SessionManager {
        SessionManager::new(move || {
            let boots = Arc::clone(&boots);
            Box::pin(async move {
                boots.fetch_add(1, Ordering::SeqCst);
                Ok(SandboxSession::new(Arc::new(ScriptedRuntime::new())))
            })
        })
    }

    #[test]
    fn session_debug_names_the_backend() {
        let session = SandboxSession::new(Arc::new(ScriptedRuntime::new()));
        let rendered = format!("{session:?}");
        assert!(rendered.contains("scripted"));
        assert!(rendered.contains(&session.id().to_string()));
    }

    #[tokio::test]
    async fn acquire_boots_once() {
        let boots = Arc::new(AtomicUsize::new(0));
        let manager = scripted_manager(Arc::clone(&boots));

        let first = manager.acquire().await.unwrap();
        let second = manager.acquire().await.unwrap();

        assert_eq!(boots.load(Ordering::SeqCst), 1);
        assert_eq!(first.id(), second.id());
    }

    #[tokio::test]
    async fn concurrent_acquires_share_one_boot() {
        let boots = Arc::new(AtomicUsize::new(0));
        let manager = Arc::new(scripted_manager(Arc::clone(&boots)));

        let (a, b, c) = tokio::join!(manager.acquire(), manager.acquire(), manager.acquire());
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

        assert_eq!(boots.load(Ordering::SeqCst), 1);
        assert_eq!(a.id(), b.id());
        assert_eq!(b.id(), c.id());
    }

    #[tokio::test]
    async fn boot_failure_is_cached_and_replayed() {
        let boots = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&boots);
        let manager = SessionManager::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(Error::Boot("npm is missing".into())) })
        });

        let first = manager.acquire().await.unwrap_err();
        let second = manager.acquire().await.unwrap_err();

        // The second failure comes from the cache, not a second boot attempt.
        assert_eq!(boots.load(Ordering::SeqCst), 1);
        assert!(first.to_string().contains("npm is missing"));
        assert!(second.to_string().contains("npm is missing"));
    }
}

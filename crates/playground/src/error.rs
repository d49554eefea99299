/// Errors surfaced by the lifecycle controller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Initialization failed earlier in this session; runs are permanently
    /// rejected until the process restarts.
    #[error("the playground failed to start and the run action is disabled")]
    Disabled,

    /// The sandbox is still booting or installing dependencies.
    #[error("the playground is still starting")]
    NotReady,

    #[error(transparent)]
    Runtime(#[from] sandpit_runtime::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not permitted to monitor input; grant the process input-monitoring access and restart")]
    PermissionDenied,
    #[error("failed to register the input hook")]
    HookRegistrationFailed(#[source] std::io::Error),
    #[error("the hook thread terminated unexpectedly")]
    HookThreadCrashed,
}

pub type Result<T> = std::result::Result<T, Error>;

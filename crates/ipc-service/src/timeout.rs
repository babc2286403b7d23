//! Timeout racing.
//!
//! The raced work is spawned and only *detached* when the timer wins: it
//! keeps running to completion, its result is simply discarded.

use ipc_types::{IpcError, IpcResult};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinError;
use tracing::debug;

/// Run `work` to completion, or fail with `on_timeout()` once `timeout`
/// elapses. `None` means no bound.
///
/// A panic inside `work` is reported as a `HandlerFailure`.
pub async fn race_with_timeout<T, F, E>(
    work: F,
    timeout: Option<Duration>,
    on_timeout: E,
) -> IpcResult<T>
where
    T: Send + 'static,
    F: Future<Output = IpcResult<T>> + Send + 'static,
    E: FnOnce() -> IpcError,
{
    let Some(limit) = timeout else {
        return run_isolated(work).await;
    };

    let task = tokio::spawn(work);
    tokio::select! {
        joined = task => joined.unwrap_or_else(|e| Err(join_failure(e))),
        _ = tokio::time::sleep(limit) => {
            debug!(timeout_ms = limit.as_millis(), "Timer won race; work left running");
            Err(on_timeout())
        }
    }
}

/// Run `work` on its own task so a panic surfaces as an error.
pub async fn run_isolated<T, F>(work: F) -> IpcResult<T>
where
    T: Send + 'static,
    F: Future<Output = IpcResult<T>> + Send + 'static,
{
    tokio::spawn(work)
        .await
        .unwrap_or_else(|e| Err(join_failure(e)))
}

fn join_failure(error: JoinError) -> IpcError {
    if error.is_panic() {
        IpcError::handler("handler panicked")
    } else {
        IpcError::handler("handler task cancelled")
    }
}

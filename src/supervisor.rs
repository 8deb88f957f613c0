// =============================================================================
// Module: Background worker supervision
// =============================================================================
//
// Background loops (interlink reconciliation, risk cache refresh) run under
// `supervise`, which restarts the loop if it panics. Panic detection goes
// through `JoinHandle::is_panic()` rather than `catch_unwind`, since the
// work itself is async and can't be wrapped in a synchronous unwind
// boundary.

use std::future::Future;
use std::time::Duration;

const RESTART_BACKOFF: Duration = Duration::from_secs(5);

/// Runs `make_task()` forever, restarting it after `RESTART_BACKOFF` if it
/// panics or returns. `name` is used only for log lines.
pub async fn supervise<F, Fut>(name: &'static str, mut make_task: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    loop {
        let handle = tokio::spawn(make_task());
        match handle.await {
            Ok(()) => {
                tracing::warn!(worker = name, "worker exited, restarting");
            }
            Err(join_err) if join_err.is_panic() => {
                tracing::error!(worker = name, "worker panicked, restarting");
            }
            Err(join_err) => {
                tracing::warn!(worker = name, error = %join_err, "worker was cancelled");
            }
        }
        tokio::time::sleep(RESTART_BACKOFF).await;
    }
}

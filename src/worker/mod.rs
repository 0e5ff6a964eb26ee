//! Background loops: the retry worker drains the queue, the connection monitor
//! keeps the health flags fresh. Both stop cooperatively through a `watch`
//! signal and never get aborted mid-operation.

pub mod monitor;
pub mod policy;
pub mod retry;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handle to a running background loop.
pub struct LoopHandle {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl LoopHandle {
    pub(crate) fn new(name: &'static str, shutdown: watch::Sender<bool>, join: JoinHandle<()>) -> Self {
        Self {
            name,
            shutdown,
            join,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Signals the loop and waits for the current iteration to finish.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = (&mut self.join).await {
            tracing::error!(task = self.name, error = %e, "background loop ended abnormally");
        }
    }
}

impl Drop for LoopHandle {
    /// A dropped handle still stops its loop, just without waiting for it.
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

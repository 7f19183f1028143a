//! Background task supervision. Any long-running consumer that stops takes the
//! whole process down with it: a dispatch service that can no longer hear the
//! broker has nothing useful left to do.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::AppError;
use crate::messaging::wait_for_shutdown;

/// Shutdown flag shared by the HTTP server and every supervised task.
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves on Ctrl-C or once [`trigger`](Self::trigger) has been called.
    pub async fn signalled(&self) {
        let mut rx = self.subscribe();
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    error!(error = %err, "failed to listen for shutdown signal");
                    wait_for_shutdown(&mut rx).await;
                }
            }
            _ = wait_for_shutdown(&mut rx) => {}
        }
    }
}

/// Watches `task` and triggers `shutdown` when it finishes, for whatever
/// reason. The returned handle yields the task's own result; a panic comes
/// back as [`AppError::Internal`].
pub fn supervise(
    name: &'static str,
    task: JoinHandle<Result<(), AppError>>,
    shutdown: Shutdown,
) -> JoinHandle<Result<(), AppError>> {
    tokio::spawn(async move {
        let result = match task.await {
            Ok(result) => result,
            Err(err) => Err(AppError::Internal(format!("{name} task aborted: {err}"))),
        };

        match &result {
            Ok(()) => info!(task = name, "stopped"),
            Err(err) => error!(task = name, error = %err, "stopped with error; shutting down"),
        }
        shutdown.trigger();
        result
    })
}

//! Handle for a background queue listener.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Running listener task with a shutdown signal
#[derive(Debug)]
pub struct ListenerHandle {
    name: String,
    shutdown_sender: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Spawn `body` with a receiver that flips to `true` on shutdown
    pub(crate) fn spawn<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (shutdown_sender, shutdown_receiver) = watch::channel(false);
        let task = tokio::spawn(body(shutdown_receiver));
        Self {
            name: name.into(),
            shutdown_sender,
            task,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the listener and wait for its in-flight work to drain
    pub async fn shutdown(self) {
        if self.shutdown_sender.send(true).is_err() {
            warn!(listener = %self.name, "Listener already stopped");
        }
        match self.task.await {
            Ok(()) => info!(listener = %self.name, "🛑 Listener stopped"),
            Err(e) => warn!(listener = %self.name, error = %e, "⚠️ Listener task ended abnormally"),
        }
    }
}

//! Periodic background tasks.
//!
//! A [`PeriodicTask`] runs an async job on a fixed period until it is
//! stopped. The first run happens one full period after spawning. Job
//! failures are logged and the schedule continues.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Handle to a running periodic job. Dropping it cancels the job.
pub struct PeriodicTask {
    name: String,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn `job` on the current Tokio runtime, every `period`.
    pub fn spawn<F, Fut, E>(name: impl Into<String>, period: Duration, mut job: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let name = name.into();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!(task = %task_name, "Periodic task cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        debug!(task = %task_name, "Running periodic task");
                        if let Err(err) = job().await {
                            warn!(task = %task_name, error = %err, "Periodic task failed");
                        }
                    }
                }
            }
        });

        Self {
            name,
            cancel,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Cancel the job and wait for an in-flight run to finish.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                warn!(task = %self.name, error = %err, "Periodic task ended abnormally");
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

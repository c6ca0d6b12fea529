//! Periodic background tasks with cooperative shutdown
//!
//! Every component owns one [`TaskGroup`] while running. Stopping the group
//! broadcasts on a watch channel and then awaits every spawned handle, so no
//! background work outlives `stop()`.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Group of periodic tasks sharing one shutdown signal
pub struct TaskGroup {
    /// Owning component, used in logs
    component: &'static str,

    /// Shutdown signal
    shutdown: watch::Sender<bool>,

    /// Spawned loops
    handles: Vec<JoinHandle<()>>,
}

impl TaskGroup {
    /// Create an empty group for `component`
    pub fn new(component: &'static str) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            component,
            shutdown,
            handles: Vec::new(),
        }
    }

    /// Number of spawned loops
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether nothing has been spawned
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Spawn a loop calling `tick` every `period`
    ///
    /// The first tick fires one full period after spawning; callers that need
    /// an immediate run do it themselves before spawning. A tick in progress
    /// finishes before the shutdown signal is observed.
    pub fn spawn_periodic<F, Fut>(&mut self, task: &'static str, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let component = self.component;
        let period = period.max(Duration::from_millis(1));
        let mut shutdown_rx = self.shutdown.subscribe();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        tick().await;
                    }
                    _ = shutdown_rx.changed() => {
                        tracing::debug!(component, task, "Periodic task shutting down");
                        break;
                    }
                }
            }
        });

        self.handles.push(handle);
    }

    /// Signal every loop to exit and wait for all of them
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);

        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!(component = self.component, "Background task ended abnormally: {}", e);
            }
        }
    }
}

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::relay::RelayState;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Owns the periodic liveness sweep. Dropping the handle stops it.
pub struct HeartbeatHandle {
    task: Option<JoinHandle<()>>,
}

impl HeartbeatHandle {
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub async fn shutdown(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl RelayState {
    pub fn spawn_heartbeat(&self, interval: Duration) -> HeartbeatHandle {
        let state = self.clone();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let task = tokio::spawn(async move {
            // The first tick completes immediately; probing starts one interval in.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let report = state.heartbeat_sweep();
                debug!(
                    probed = report.probed,
                    reaped = report.reaped,
                    "heartbeat sweep finished"
                );
            }
        });

        HeartbeatHandle { task: Some(task) }
    }
}

use dashmap::DashMap;
use std::{sync::Arc, time::Duration};
use tokio::{sync::Notify, task::JoinHandle};
use tracing::{debug, warn};

use crate::{
    calls::{ActivitySid, CallSid, WorkerSid},
    config::RescheduleMode,
    provider::CallControl,
};

/// Puts workers back to Idle once their cool-down is over.
///
/// Each scheduled transition is a detached task that only issues the
/// idempotent activity update. In [`RescheduleMode::EndOfCall`] a dialed
/// worker's transition waits on the outbound call's completion, with the
/// cool-down as a ceiling.
#[derive(Clone)]
pub struct WorkerRescheduler {
    control: Arc<dyn CallControl>,
    idle: ActivitySid,
    cooldown: Duration,
    mode: RescheduleMode,
    call_ends: Arc<DashMap<CallSid, Arc<Notify>>>,
}

impl WorkerRescheduler {
    pub fn new(
        control: Arc<dyn CallControl>,
        idle: ActivitySid,
        cooldown: Duration,
        mode: RescheduleMode,
    ) -> Self {
        Self {
            control,
            idle,
            cooldown,
            mode,
            call_ends: Arc::new(DashMap::new()),
        }
    }

    /// Set the worker Idle after the fixed cool-down.
    pub fn schedule_cooldown(&self, worker: WorkerSid) -> JoinHandle<()> {
        let control = self.control.clone();
        let idle = self.idle.clone();
        let cooldown = self.cooldown;

        debug!(worker_sid = %worker, cooldown_secs = cooldown.as_secs(), "Scheduling Idle transition");
        tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            set_idle(control.as_ref(), &worker, &idle).await;
        })
    }

    /// Set the worker Idle after the dialed call ends, or after the cool-down
    /// when running on the plain timer.
    pub fn schedule_after_call(&self, worker: WorkerSid, call: CallSid) -> JoinHandle<()> {
        if self.mode == RescheduleMode::Timer {
            return self.schedule_cooldown(worker);
        }

        let ended = Arc::new(Notify::new());
        self.call_ends.insert(call.clone(), ended.clone());

        let control = self.control.clone();
        let idle = self.idle.clone();
        let ceiling = self.cooldown;
        let call_ends = self.call_ends.clone();

        debug!(worker_sid = %worker, call_sid = %call, "Waiting for end of call");
        tokio::spawn(async move {
            tokio::select! {
                _ = ended.notified() => {
                    debug!(call_sid = %call, "Call ended, releasing worker");
                }
                _ = tokio::time::sleep(ceiling) => {
                    debug!(call_sid = %call, "No end-of-call signal before ceiling");
                }
            }
            call_ends.remove(&call);
            set_idle(control.as_ref(), &worker, &idle).await;
        })
    }

    /// Signal that `call` completed. Returns whether a worker was waiting on it.
    pub fn call_ended(&self, call: &CallSid) -> bool {
        match self.call_ends.remove(call) {
            Some((_, ended)) => {
                ended.notify_one();
                true
            }
            None => false,
        }
    }
}

async fn set_idle(control: &dyn CallControl, worker: &WorkerSid, idle: &ActivitySid) {
    debug!(worker_sid = %worker, "Rescheduling agent");
    if let Err(e) = control.update_worker_activity(worker, idle).await {
        warn!(worker_sid = %worker, error = %e, "Unable to update worker activity");
    }
}

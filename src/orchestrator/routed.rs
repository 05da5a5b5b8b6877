//! Task-routing flow: the caller waits in a workflow queue while the worker
//! the router reserved is dialed. A human answer bridges the worker into the
//! queue, which accepts the reservation; anything else rejects it with a
//! follow-up activity for the worker.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::{LegOutcome, Orchestrator, Outcome, OutboundStatus, WebhookReply};
use crate::{
    calls::{
        AttemptState, CallSid, CallStatus, CorrelationKey, Reservation, TaskSid, WorkerActivity,
        WorkerSid,
    },
    error::{AppError, Result},
    events::{EventPayload, WorkerEventData},
    markup,
    provider::{OutboundCallRequest, WorkerRecord},
    registry::RegistryError,
};

/// Worker attribute document. Only the contact address matters here; workers
/// carry it as `contact_uri`, `phone` or both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerAttributes {
    #[serde(default)]
    pub contact_uri: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl WorkerAttributes {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// First non-blank contact address, `contact_uri` before `phone`.
    pub fn contact(&self) -> Option<&str> {
        [self.contact_uri.as_deref(), self.phone.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|c| !c.is_empty())
    }
}

/// Task attribute document written by the enqueue markup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAttributes {
    #[serde(default)]
    pub caller_id: Option<String>,
}

impl TaskAttributes {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Assignment callback for one reservation.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub reservation: Reservation,
    pub worker_attributes: WorkerAttributes,
    pub task_attributes: TaskAttributes,
}

/// Event delivered to the task-router event callback.
#[derive(Debug, Clone, Default)]
pub struct TaskRouterEvent {
    pub event_type: String,
    pub description: Option<String>,
    pub task_sid: Option<TaskSid>,
    pub worker_sid: Option<String>,
    pub worker_name: Option<String>,
    pub worker_activity_sid: Option<String>,
    pub worker_activity_name: Option<String>,
    pub worker_previous_activity_sid: Option<String>,
}

/// Dashboard row for one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentView {
    pub sid: String,
    pub name: String,
    pub activity_sid: Option<String>,
    pub activity_name: Option<String>,
    pub online: bool,
    pub contact_uri: Option<String>,
}

impl From<WorkerRecord> for AgentView {
    fn from(worker: WorkerRecord) -> Self {
        let contact_uri = WorkerAttributes::from_json(&worker.attributes)
            .ok()
            .and_then(|a| a.contact().map(String::from));
        let online = worker.activity_name.as_deref() != Some(WorkerActivity::Offline.catalog_name());
        Self {
            sid: worker.sid,
            name: worker.friendly_name,
            activity_sid: worker.activity_sid,
            activity_name: worker.activity_name,
            online,
            contact_uri,
        }
    }
}

impl Orchestrator {
    /// Put the caller into the workflow queue.
    pub fn enqueue_inbound(&self, inbound: &CallSid, from: Option<&str>) -> Result<Outcome> {
        let workspace = self.workspace()?;
        let xml = markup::enqueue_call(&workspace.workflow_sid, from)?;
        self.track(&CorrelationKey::from(inbound), None, AttemptState::Parked);
        Ok(Outcome::new(AttemptState::Parked, WebhookReply::Markup(xml)))
    }

    /// Dial the reserved worker, or reject the reservation straight away when
    /// the worker has no contact address.
    pub async fn assign(&self, assignment: Assignment) -> Result<Outcome> {
        let workspace = self.workspace()?;
        let Assignment {
            mut reservation,
            worker_attributes,
            task_attributes,
        } = assignment;
        let key = CorrelationKey::from(&reservation.task_sid);

        let contact = match contact_for(&reservation.worker_sid, &worker_attributes) {
            Ok(contact) => contact.to_string(),
            Err(AppError::MissingContact(worker)) => {
                warn!(worker_sid = %worker, reservation_sid = %reservation.sid, "Worker has no contact address, rejecting");
                reservation.reject(WorkerActivity::Offline);
                self.track(&key, None, AttemptState::ReservationRejected);
                return Ok(Outcome::new(
                    AttemptState::ReservationRejected,
                    WebhookReply::Instruction(json!({
                        "instruction": "reject",
                        "activity_sid": workspace.activities.offline.as_str(),
                    })),
                ));
            }
            Err(other) => return Err(other),
        };

        if self.registry.contains(&key) {
            debug!(task_sid = %reservation.task_sid, "Assignment redelivered, already dialing");
            return Ok(Outcome::acknowledged(AttemptState::Dialing));
        }

        let caller_id = self
            .settings
            .caller_id()
            .or(task_attributes.caller_id)
            .ok_or_else(|| AppError::malformed("No caller id configured or on the task"))?;
        let callback = self.urls.reservation_outbound(
            &reservation.task_sid,
            &reservation.sid,
            &reservation.worker_sid,
        )?;

        let outbound = self
            .control
            .create_call(&OutboundCallRequest {
                to: contact,
                from: caller_id,
                url: callback.clone(),
                status_callback: callback,
                machine_detection: true,
            })
            .await?;

        info!(
            task_sid = %reservation.task_sid,
            reservation_sid = %reservation.sid,
            worker_sid = %reservation.worker_sid,
            outbound_sid = %outbound,
            "Dialing reserved worker"
        );

        if let Err(RegistryError::DuplicateKey(_)) = self.registry.register(key.clone(), outbound.clone()) {
            warn!(task_sid = %reservation.task_sid, outbound_sid = %outbound, "Task already dialing, cancelling duplicate");
            self.cancel_orphan(&outbound).await;
            return Ok(Outcome::acknowledged(AttemptState::Dialing));
        }

        self.track(&key, Some(&outbound), AttemptState::Dialing);
        Ok(Outcome::acknowledged(AttemptState::Dialing))
    }

    /// Act on a status callback for the leg dialed to a reserved worker.
    pub async fn handle_reservation_outbound(
        &self,
        mut reservation: Reservation,
        event: OutboundStatus,
    ) -> Result<Outcome> {
        let workspace = self.workspace()?;
        let rescheduler = self.rescheduler()?;
        let key = CorrelationKey::from(&reservation.task_sid);

        let Some(status) = event.status else {
            warn!(task_sid = %reservation.task_sid, "Outbound callback with unknown status");
            return Ok(Outcome::acknowledged(AttemptState::Acknowledged));
        };

        debug!(
            task_sid = %reservation.task_sid,
            reservation_sid = %reservation.sid,
            outbound_sid = event.call_sid.as_ref().map(|s| s.as_str()).unwrap_or("-"),
            status = %status,
            answered_by = ?event.answered_by,
            "Reservation outbound callback"
        );

        // The end of a bridged call arrives after its entry is gone.
        if status == CallStatus::Completed {
            if let Some(call) = &event.call_sid {
                if rescheduler.call_ended(call) {
                    debug!(call_sid = %call, "Bridged call completed");
                }
            }
        }

        let outcome = LegOutcome::classify(status, event.answered_by);
        if outcome == LegOutcome::Progress {
            self.track(&key, event.call_sid.as_ref(), AttemptState::OutboundRinging);
            return Ok(Outcome::acknowledged(AttemptState::OutboundRinging));
        }

        let Some(outbound) = self.claim(&key, event.call_sid.as_ref()) else {
            debug!(task_sid = %reservation.task_sid, status = %status, "Outbound callback already handled or from another leg");
            return Ok(Outcome::acknowledged(AttemptState::AlreadyHandled));
        };

        let result = match outcome {
            LegOutcome::Machine => {
                self.reject(&mut reservation, WorkerActivity::TemporarilyUnavailable)
                    .await;
                rescheduler.schedule_cooldown(reservation.worker_sid.clone());
                Outcome::new(
                    AttemptState::RejectedMachine,
                    WebhookReply::Markup(markup::hangup()?),
                )
            }
            LegOutcome::Answered => {
                // Dialing the queue with the reservation accepts it. The worker
                // lands in Temporarily Unavailable afterwards.
                reservation.accept_by_dial();
                let xml = markup::dial_queue(
                    &reservation.sid,
                    &workspace.activities.temporarily_unavailable,
                )?;
                rescheduler.schedule_after_call(reservation.worker_sid.clone(), outbound.clone());
                Outcome::new(AttemptState::ReservationAccepted, WebhookReply::Markup(xml))
            }
            LegOutcome::Unreachable(CallStatus::Failed) => {
                // Likely a bad number; keep the worker out of rotation.
                self.reject(&mut reservation, WorkerActivity::Offline).await;
                Outcome::acknowledged(AttemptState::ReservationRejected)
            }
            LegOutcome::Unreachable(_) => {
                self.reject(&mut reservation, WorkerActivity::TemporarilyUnavailable)
                    .await;
                rescheduler.schedule_cooldown(reservation.worker_sid.clone());
                Outcome::acknowledged(AttemptState::ReservationRejected)
            }
            LegOutcome::Ended(_) | LegOutcome::Progress => {
                Outcome::acknowledged(AttemptState::Acknowledged)
            }
        };

        debug!(reservation_sid = %reservation.sid, reservation = ?reservation.state, "Reservation settled");
        self.track(&key, Some(&outbound), result.state);
        Ok(result)
    }

    /// Task-router event callback. Always acknowledged.
    pub async fn handle_task_event(&self, event: TaskRouterEvent) -> Result<Outcome> {
        debug!(
            event_type = %event.event_type,
            description = event.description.as_deref().unwrap_or(""),
            "Task router event"
        );

        match event.event_type.as_str() {
            "task.canceled" => {
                let Some(task) = event.task_sid else {
                    warn!("task.canceled without TaskSid");
                    return Ok(Outcome::acknowledged(AttemptState::Acknowledged));
                };
                let key = CorrelationKey::from(&task);
                match self.registry.try_remove(&key) {
                    Some(outbound) => {
                        info!(task_sid = %task, outbound_sid = %outbound, "Task canceled, cancelling outbound call");
                        self.cancel_orphan(&outbound).await;
                        self.track(&key, Some(&outbound), AttemptState::Cancelled);
                        Ok(Outcome::acknowledged(AttemptState::Cancelled))
                    }
                    None => Ok(Outcome::acknowledged(AttemptState::AlreadyHandled)),
                }
            }
            "worker.activity.update" => {
                let workspace = self.workspace()?;
                let previous_activity_name = event
                    .worker_previous_activity_sid
                    .as_deref()
                    .and_then(|sid| workspace.activity_name(sid))
                    .unwrap_or_default()
                    .to_string();
                self.notifier.notify(EventPayload::worker_activity(WorkerEventData {
                    worker_sid: event.worker_sid.unwrap_or_default(),
                    worker_name: event.worker_name.unwrap_or_default(),
                    activity_sid: event.worker_activity_sid.unwrap_or_default(),
                    activity_name: event.worker_activity_name.unwrap_or_default(),
                    previous_activity_name,
                }));
                Ok(Outcome::acknowledged(AttemptState::Acknowledged))
            }
            _ => Ok(Outcome::acknowledged(AttemptState::Acknowledged)),
        }
    }

    /// Dashboard toggle: online means Idle, offline means Offline.
    pub async fn update_worker_presence(&self, worker: &WorkerSid, online: bool) -> Result<()> {
        let workspace = self.workspace()?;
        let activity = if online {
            WorkerActivity::Idle
        } else {
            WorkerActivity::Offline
        };
        info!(worker_sid = %worker, activity = activity.catalog_name(), "Dashboard presence update");
        if let Err(e) = self
            .control
            .update_worker_activity(worker, workspace.activities.sid_for(activity))
            .await
        {
            error!(worker_sid = %worker, error = %e, "Couldn't update worker status");
        }
        Ok(())
    }

    pub async fn list_agents(&self) -> Result<Vec<AgentView>> {
        self.workspace()?;
        let workers = self.control.list_workers().await?;
        Ok(workers.into_iter().map(AgentView::from).collect())
    }

    /// Reject the reservation and move the worker in the same request.
    async fn reject(&self, reservation: &mut Reservation, follow_up: WorkerActivity) {
        let Ok(workspace) = self.workspace() else {
            return;
        };
        info!(
            reservation_sid = %reservation.sid,
            worker_sid = %reservation.worker_sid,
            follow_up = follow_up.catalog_name(),
            "Rejecting reservation"
        );
        if let Err(e) = self
            .control
            .reject_reservation(
                &reservation.task_sid,
                &reservation.sid,
                workspace.activities.sid_for(follow_up),
            )
            .await
        {
            warn!(reservation_sid = %reservation.sid, error = %e, "Unable to update task reservation");
        }
        reservation.reject(follow_up);
    }
}

fn contact_for<'a>(worker: &WorkerSid, attributes: &'a WorkerAttributes) -> Result<&'a str> {
    attributes
        .contact()
        .ok_or_else(|| AppError::MissingContact(worker.clone()))
}

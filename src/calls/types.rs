use serde::{Deserialize, Serialize};
use std::fmt;

use super::domain::{ReservationSid, TaskSid, WorkerSid};

/// Lifecycle state of a call leg as reported in `CallStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    Queued,
    Ringing,
    InProgress,
    Completed,
    Busy,
    Failed,
    NoAnswer,
    Canceled,
}

impl CallStatus {
    /// Parse the provider's wire value. `initiated` is folded into `Queued`.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value.trim() {
            "queued" | "initiated" => Some(CallStatus::Queued),
            "ringing" => Some(CallStatus::Ringing),
            "in-progress" | "answered" => Some(CallStatus::InProgress),
            "completed" => Some(CallStatus::Completed),
            "busy" => Some(CallStatus::Busy),
            "failed" => Some(CallStatus::Failed),
            "no-answer" => Some(CallStatus::NoAnswer),
            "canceled" => Some(CallStatus::Canceled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Queued => "queued",
            CallStatus::Ringing => "ringing",
            CallStatus::InProgress => "in-progress",
            CallStatus::Completed => "completed",
            CallStatus::Busy => "busy",
            CallStatus::Failed => "failed",
            CallStatus::NoAnswer => "no-answer",
            CallStatus::Canceled => "canceled",
        }
    }

    /// Statuses that say the leg has not been decided yet.
    pub fn is_progress(&self) -> bool {
        matches!(self, CallStatus::Queued | CallStatus::Ringing)
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// AMD classification reported in `AnsweredBy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnsweredBy {
    Human,
    Machine,
    Fax,
    Unknown,
}

impl AnsweredBy {
    /// `machine_start` and every `machine_end_*` variant collapse to `Machine`.
    /// An empty value is the provider's way of saying it could not tell.
    pub fn from_wire(value: &str) -> Self {
        match value.trim() {
            "human" => AnsweredBy::Human,
            "fax" => AnsweredBy::Fax,
            v if v.starts_with("machine") => AnsweredBy::Machine,
            _ => AnsweredBy::Unknown,
        }
    }

    /// Machines and fax tones never get joined to a caller.
    pub fn is_automated(&self) -> bool {
        matches!(self, AnsweredBy::Machine | AnsweredBy::Fax)
    }
}

/// Named worker activity slots the orchestrator moves workers between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerActivity {
    Offline,
    Idle,
    TemporarilyUnavailable,
}

impl WorkerActivity {
    /// Friendly name of the activity in the workspace catalog.
    pub fn catalog_name(&self) -> &'static str {
        match self {
            WorkerActivity::Offline => "Offline",
            WorkerActivity::Idle => "Idle",
            WorkerActivity::TemporarilyUnavailable => "Temporarily Unavailable",
        }
    }

    pub const ALL: [WorkerActivity; 3] = [
        WorkerActivity::Offline,
        WorkerActivity::Idle,
        WorkerActivity::TemporarilyUnavailable,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum ReservationState {
    Pending,
    AcceptedByDial,
    Rejected { follow_up: WorkerActivity },
}

/// A worker reservation offered for a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub sid: ReservationSid,
    pub task_sid: TaskSid,
    pub worker_sid: WorkerSid,
    pub state: ReservationState,
}

impl Reservation {
    pub fn pending(sid: ReservationSid, task_sid: TaskSid, worker_sid: WorkerSid) -> Self {
        Self {
            sid,
            task_sid,
            worker_sid,
            state: ReservationState::Pending,
        }
    }

    pub fn accept_by_dial(&mut self) {
        self.state = ReservationState::AcceptedByDial;
    }

    pub fn reject(&mut self, follow_up: WorkerActivity) {
        self.state = ReservationState::Rejected { follow_up };
    }
}

/// Where an attempt ended up after handling one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    Parked,
    Dialing,
    OutboundRinging,
    RejectedMachine,
    Joined,
    Abandoned,
    Unavailable,
    Cancelled,
    ReservationAccepted,
    ReservationRejected,
    AlreadyHandled,
    Acknowledged,
}

impl AttemptState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptState::Parked => "parked",
            AttemptState::Dialing => "dialing",
            AttemptState::OutboundRinging => "outbound_ringing",
            AttemptState::RejectedMachine => "rejected_machine",
            AttemptState::Joined => "joined",
            AttemptState::Abandoned => "abandoned",
            AttemptState::Unavailable => "unavailable",
            AttemptState::Cancelled => "cancelled",
            AttemptState::ReservationAccepted => "reservation_accepted",
            AttemptState::ReservationRejected => "reservation_rejected",
            AttemptState::AlreadyHandled => "already_handled",
            AttemptState::Acknowledged => "acknowledged",
        }
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_status_parses_provider_values() {
        assert_eq!(CallStatus::from_wire("in-progress"), Some(CallStatus::InProgress));
        assert_eq!(CallStatus::from_wire("no-answer"), Some(CallStatus::NoAnswer));
        assert_eq!(CallStatus::from_wire("initiated"), Some(CallStatus::Queued));
        assert_eq!(CallStatus::from_wire("exploded"), None);
        assert!(CallStatus::Ringing.is_progress());
        assert!(!CallStatus::Busy.is_progress());
    }

    #[test]
    fn answered_by_classification() {
        assert_eq!(AnsweredBy::from_wire("human"), AnsweredBy::Human);
        assert_eq!(AnsweredBy::from_wire("machine_start"), AnsweredBy::Machine);
        assert_eq!(AnsweredBy::from_wire("machine_end_beep"), AnsweredBy::Machine);
        assert_eq!(AnsweredBy::from_wire("fax"), AnsweredBy::Fax);
        assert_eq!(AnsweredBy::from_wire(""), AnsweredBy::Unknown);
        assert!(AnsweredBy::Fax.is_automated());
        assert!(!AnsweredBy::Unknown.is_automated());
    }

    #[test]
    fn reservation_transitions() {
        let mut reservation = Reservation::pending(
            ReservationSid::new("WR1").unwrap(),
            TaskSid::new("WT1").unwrap(),
            WorkerSid::new("WK1").unwrap(),
        );
        assert_eq!(reservation.state, ReservationState::Pending);

        reservation.reject(WorkerActivity::Offline);
        assert_eq!(
            reservation.state,
            ReservationState::Rejected {
                follow_up: WorkerActivity::Offline
            }
        );
    }
}

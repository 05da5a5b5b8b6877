//! Typed dashboard events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::calls::{AttemptState, CallSid, CorrelationKey};

pub mod notifier;

pub use notifier::DashboardNotifier;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload {
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub data: EventData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    CallStateChanged,
    WorkerActivityUpdated,
    SystemInit,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::CallStateChanged => write!(f, "call_state_changed"),
            EventType::WorkerActivityUpdated => write!(f, "worker_activity_updated"),
            EventType::SystemInit => write!(f, "system_init"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventData {
    Call(CallEventData),
    Worker(WorkerEventData),
    System(SystemEventData),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEventData {
    pub correlation_key: String,
    pub outbound_sid: Option<String>,
    pub state: AttemptState,
}

/// Mirrors the fields the task-router puts on a `worker.activity.update` event.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkerEventData {
    pub worker_sid: String,
    pub worker_name: String,
    pub activity_sid: String,
    pub activity_name: String,
    pub previous_activity_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemEventData {
    pub component: String,
    pub message: String,
    pub metadata: Option<Value>,
}

impl EventPayload {
    pub fn call_state(key: &CorrelationKey, outbound: Option<&CallSid>, state: AttemptState) -> Self {
        Self {
            event_type: EventType::CallStateChanged,
            timestamp: Utc::now(),
            data: EventData::Call(CallEventData {
                correlation_key: key.to_string(),
                outbound_sid: outbound.map(|sid| sid.to_string()),
                state,
            }),
        }
    }

    pub fn worker_activity(data: WorkerEventData) -> Self {
        Self {
            event_type: EventType::WorkerActivityUpdated,
            timestamp: Utc::now(),
            data: EventData::Worker(data),
        }
    }

    pub fn system_init(mode: &str) -> Self {
        Self {
            event_type: EventType::SystemInit,
            timestamp: Utc::now(),
            data: EventData::System(SystemEventData {
                component: "forward-amd".to_string(),
                message: "Dashboard stream connected".to_string(),
                metadata: Some(serde_json::json!({ "mode": mode })),
            }),
        }
    }

    /// JSON body sent to dashboard clients.
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "type": self.event_type.to_string(),
            "timestamp": self.timestamp.to_rfc3339(),
            "data": self.data,
        })
    }
}

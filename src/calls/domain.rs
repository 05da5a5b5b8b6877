use serde::{Deserialize, Serialize};
use std::fmt;

/// Declares a provider identifier newtype that refuses blank values.
macro_rules! provider_sid {
    ($(#[$meta:meta])* $name:ident, $error:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(DomainError::$error);
                }
                Ok(Self(id))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

provider_sid!(
    /// Provider call SID, one per call leg.
    CallSid,
    InvalidCallSid
);
provider_sid!(
    /// Task-routing task SID.
    TaskSid,
    InvalidTaskSid
);
provider_sid!(ReservationSid, InvalidReservationSid);
provider_sid!(WorkerSid, InvalidWorkerSid);
provider_sid!(ActivitySid, InvalidActivitySid);
provider_sid!(WorkflowSid, InvalidWorkflowSid);
provider_sid!(WorkspaceSid, InvalidWorkspaceSid);

/// Key under which an in-flight outbound attempt is tracked: the inbound call
/// SID in the conference flow, the task SID in the task-routing flow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationKey(String);

impl CorrelationKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&CallSid> for CorrelationKey {
    fn from(inbound: &CallSid) -> Self {
        Self(inbound.as_str().to_string())
    }
}

impl From<&TaskSid> for CorrelationKey {
    fn from(task: &TaskSid) -> Self {
        Self(task.as_str().to_string())
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid call SID: cannot be empty")]
    InvalidCallSid,
    #[error("Invalid task SID: cannot be empty")]
    InvalidTaskSid,
    #[error("Invalid reservation SID: cannot be empty")]
    InvalidReservationSid,
    #[error("Invalid worker SID: cannot be empty")]
    InvalidWorkerSid,
    #[error("Invalid activity SID: cannot be empty")]
    InvalidActivitySid,
    #[error("Invalid workflow SID: cannot be empty")]
    InvalidWorkflowSid,
    #[error("Invalid workspace SID: cannot be empty")]
    InvalidWorkspaceSid,
}

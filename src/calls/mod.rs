pub mod domain;
pub mod types;

pub use domain::{
    ActivitySid, CallSid, CorrelationKey, DomainError, ReservationSid, TaskSid, WorkerSid,
    WorkflowSid, WorkspaceSid,
};
pub use types::{AnsweredBy, AttemptState, CallStatus, Reservation, ReservationState, WorkerActivity};

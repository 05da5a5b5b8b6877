//! Telephony provider call-control surface.
//!
//! [`CallControl`] is the seam between the orchestrator and the provider's REST
//! API. Every method is a single stateless request; callers decide whether a
//! failure is fatal (call creation) or merely logged (housekeeping).

pub mod rest;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::calls::{ActivitySid, CallSid, ReservationSid, TaskSid, WorkerSid};

pub use rest::{ProviderCredentials, ProviderEndpoints, RestCallControl};

/// Non-2xx answer from the provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (status {status})")]
pub struct ProviderError {
    /// HTTP status of the failed request, 0 when the request never completed.
    pub status: u16,
    /// Provider-specific error code when the body carried one.
    pub code: Option<u32>,
    pub message: String,
}

impl ProviderError {
    pub fn new(status: u16, code: Option<u32>, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn transport(err: reqwest::Error) -> Self {
        Self::new(err.status().map(|s| s.as_u16()).unwrap_or(0), None, err.to_string())
    }
}

/// Parameters for placing an outbound leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundCallRequest {
    pub to: String,
    pub from: String,
    /// Fetched by the provider when the call is answered.
    pub url: String,
    pub status_callback: String,
    pub machine_detection: bool,
}

/// A task-routing worker as listed by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub sid: String,
    pub friendly_name: String,
    pub activity_sid: Option<String>,
    pub activity_name: Option<String>,
    /// Raw JSON attribute document.
    #[serde(default)]
    pub attributes: String,
}

/// Name/SID pair from a workspace catalog listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub sid: String,
    pub friendly_name: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CallControl: Send + Sync {
    async fn create_call(&self, request: &OutboundCallRequest) -> Result<CallSid, ProviderError>;

    /// Replace a live call's instructions with markup fetched from `markup_url`.
    async fn redirect_call(&self, sid: &CallSid, markup_url: &str) -> Result<(), ProviderError>;

    async fn cancel_call(&self, sid: &CallSid) -> Result<(), ProviderError>;

    /// Whether an in-progress conference with this friendly name exists.
    /// Lookup failures answer `false`.
    async fn conference_is_active(&self, friendly_name: &str) -> bool;

    async fn update_worker_activity(
        &self,
        worker: &WorkerSid,
        activity: &ActivitySid,
    ) -> Result<(), ProviderError>;

    async fn reject_reservation(
        &self,
        task: &TaskSid,
        reservation: &ReservationSid,
        follow_up: &ActivitySid,
    ) -> Result<(), ProviderError>;

    async fn list_workers(&self) -> Result<Vec<WorkerRecord>, ProviderError>;
}

//! Call-leg correlation and reservation state machine.
//!
//! Every webhook delivery becomes one call into the [`Orchestrator`], which
//! decides the next instruction, issues at most a couple of provider commands
//! and returns a [`WebhookReply`]. Deliveries may arrive concurrently and in
//! any order; the only shared mutable state is the [`PendingCallRegistry`],
//! whose single-winner removal decides which delivery gets to act.

pub mod conference;
pub mod reschedule;
pub mod routed;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use crate::{
    calls::{AnsweredBy, AttemptState, CallSid, CallStatus, CorrelationKey, ReservationSid, TaskSid, WorkerSid},
    config::ForwardingSettings,
    error::{AppError, Result},
    events::{DashboardNotifier, EventPayload},
    markup::StaticFragment,
    provider::CallControl,
    registry::PendingCallRegistry,
    workspace::WorkspaceSnapshot,
};

pub use reschedule::WorkerRescheduler;
pub use routed::{AgentView, Assignment, TaskAttributes, TaskRouterEvent, WorkerAttributes};

/// What goes back to the provider for one webhook delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookReply {
    /// Call-control markup, served as `text/xml`.
    Markup(String),
    /// Assignment instruction for the task router.
    Instruction(Value),
    /// Plain `204 No Content`.
    Acknowledge,
}

impl IntoResponse for WebhookReply {
    fn into_response(self) -> Response {
        match self {
            WebhookReply::Markup(body) => {
                ([(header::CONTENT_TYPE, "text/xml")], body).into_response()
            }
            WebhookReply::Instruction(value) => Json(value).into_response(),
            WebhookReply::Acknowledge => StatusCode::NO_CONTENT.into_response(),
        }
    }
}

/// Result of handling one event: where the attempt ended up and the reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub state: AttemptState,
    pub reply: WebhookReply,
}

impl Outcome {
    pub fn new(state: AttemptState, reply: WebhookReply) -> Self {
        Self { state, reply }
    }

    pub fn acknowledged(state: AttemptState) -> Self {
        Self::new(state, WebhookReply::Acknowledge)
    }
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        self.reply.into_response()
    }
}

/// Status callback for an outbound leg, as parsed from the webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundStatus {
    pub call_sid: Option<CallSid>,
    /// `None` when the provider sent a status this crate does not know.
    pub status: Option<CallStatus>,
    pub answered_by: Option<AnsweredBy>,
}

/// How an outbound status callback reads, independent of variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegOutcome {
    /// Queued or ringing; nothing is decided yet.
    Progress,
    /// Answered by a machine or fax.
    Machine,
    /// Answered by a human, or AMD could not tell.
    Answered,
    /// Busy, failed or not answered.
    Unreachable(CallStatus),
    /// Completed or canceled.
    Ended(CallStatus),
}

impl LegOutcome {
    pub fn classify(status: CallStatus, answered_by: Option<AnsweredBy>) -> Self {
        match status {
            s if s.is_progress() => LegOutcome::Progress,
            CallStatus::InProgress if answered_by.is_some_and(|a| a.is_automated()) => {
                LegOutcome::Machine
            }
            CallStatus::InProgress => LegOutcome::Answered,
            CallStatus::Busy | CallStatus::Failed | CallStatus::NoAnswer => {
                LegOutcome::Unreachable(status)
            }
            CallStatus::Completed | CallStatus::Canceled => LegOutcome::Ended(status),
            CallStatus::Queued | CallStatus::Ringing => LegOutcome::Progress,
        }
    }
}

/// Absolute URLs handed to the provider for callbacks and redirects.
#[derive(Debug, Clone)]
pub struct CallbackUrls {
    base: Url,
}

impl CallbackUrls {
    pub fn new(public_url: &str) -> Result<Self> {
        let mut base = Url::parse(public_url).map_err(|e| {
            AppError::Configuration(format!("Invalid public URL {}: {}", public_url, e))
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { base })
    }

    pub fn base(&self) -> &str {
        self.base.as_str()
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| AppError::Configuration(format!("Invalid callback path {}: {}", path, e)))
    }

    /// `/outbound?InboundSid=...`
    pub fn conference_outbound(&self, inbound: &CallSid) -> Result<String> {
        let mut url = self.endpoint("outbound")?;
        url.query_pairs_mut().append_pair("InboundSid", inbound.as_str());
        Ok(url.into())
    }

    /// `/outbound?TaskSid=...&ReservationSid=...&WorkerSid=...`
    pub fn reservation_outbound(
        &self,
        task: &TaskSid,
        reservation: &ReservationSid,
        worker: &WorkerSid,
    ) -> Result<String> {
        let mut url = self.endpoint("outbound")?;
        url.query_pairs_mut()
            .append_pair("TaskSid", task.as_str())
            .append_pair("ReservationSid", reservation.as_str())
            .append_pair("WorkerSid", worker.as_str());
        Ok(url.into())
    }

    pub fn fragment(&self, fragment: StaticFragment) -> Result<String> {
        Ok(self
            .endpoint(&format!("static/{}", fragment.file_name()))?
            .into())
    }
}

/// Drives inbound, outbound and task-router events through the attempt states.
pub struct Orchestrator {
    control: Arc<dyn CallControl>,
    registry: Arc<PendingCallRegistry>,
    notifier: Arc<dyn DashboardNotifier>,
    urls: CallbackUrls,
    settings: Arc<ForwardingSettings>,
    workspace: Option<Arc<WorkspaceSnapshot>>,
    rescheduler: Option<WorkerRescheduler>,
}

impl Orchestrator {
    pub fn new(
        control: Arc<dyn CallControl>,
        registry: Arc<PendingCallRegistry>,
        notifier: Arc<dyn DashboardNotifier>,
        urls: CallbackUrls,
        settings: Arc<ForwardingSettings>,
    ) -> Self {
        Self {
            control,
            registry,
            notifier,
            urls,
            settings,
            workspace: None,
            rescheduler: None,
        }
    }

    /// Enable the task-routing flow against a resolved workspace.
    pub fn with_task_router(
        mut self,
        workspace: Arc<WorkspaceSnapshot>,
        rescheduler: WorkerRescheduler,
    ) -> Self {
        self.workspace = Some(workspace);
        self.rescheduler = Some(rescheduler);
        self
    }

    pub fn registry(&self) -> &Arc<PendingCallRegistry> {
        &self.registry
    }

    fn workspace(&self) -> Result<&WorkspaceSnapshot> {
        self.workspace
            .as_deref()
            .ok_or_else(|| AppError::Configuration("Task router is not configured".to_string()))
    }

    fn rescheduler(&self) -> Result<&WorkerRescheduler> {
        self.rescheduler
            .as_ref()
            .ok_or_else(|| AppError::Configuration("Task router is not configured".to_string()))
    }

    /// Take the pending entry an outbound callback reports on. When the
    /// callback names its leg, only that leg's entry is taken.
    fn claim(&self, key: &CorrelationKey, leg: Option<&CallSid>) -> Option<CallSid> {
        match leg {
            Some(sid) => self.registry.try_remove_if(key, sid),
            None => self.registry.try_remove(key),
        }
    }

    /// Log the transition and push it to the dashboard.
    fn track(&self, key: &CorrelationKey, outbound: Option<&CallSid>, state: AttemptState) {
        info!(
            correlation_key = %key,
            outbound_sid = outbound.map(|s| s.as_str()).unwrap_or("-"),
            state = %state,
            "Call attempt transitioned"
        );
        self.notifier
            .notify(EventPayload::call_state(key, outbound, state));
    }

    /// Cancel an outbound leg nobody will ever act on. Failures are logged.
    async fn cancel_orphan(&self, sid: &CallSid) {
        if let Err(e) = self.control.cancel_call(sid).await {
            warn!(call_sid = %sid, error = %e, "Unable to cancel outbound call");
        }
    }

    /// Point a live call at one of the static fragments. Failures are logged.
    async fn redirect_to(&self, sid: &CallSid, fragment: StaticFragment) {
        let url = match self.urls.fragment(fragment) {
            Ok(url) => url,
            Err(e) => {
                warn!(call_sid = %sid, error = %e, "Unable to build redirect URL");
                return;
            }
        };
        if let Err(e) = self.control.redirect_call(sid, &url).await {
            warn!(call_sid = %sid, error = %e, "Unable to modify call");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn classify_separates_machines_from_humans() {
        assert_eq!(
            LegOutcome::classify(CallStatus::InProgress, Some(AnsweredBy::Machine)),
            LegOutcome::Machine
        );
        assert_eq!(
            LegOutcome::classify(CallStatus::InProgress, Some(AnsweredBy::Fax)),
            LegOutcome::Machine
        );
        assert_eq!(
            LegOutcome::classify(CallStatus::InProgress, Some(AnsweredBy::Unknown)),
            LegOutcome::Answered
        );
        assert_eq!(LegOutcome::classify(CallStatus::InProgress, None), LegOutcome::Answered);
        assert_eq!(LegOutcome::classify(CallStatus::Ringing, None), LegOutcome::Progress);
        assert_eq!(
            LegOutcome::classify(CallStatus::NoAnswer, None),
            LegOutcome::Unreachable(CallStatus::NoAnswer)
        );
        assert_eq!(
            LegOutcome::classify(CallStatus::Canceled, None),
            LegOutcome::Ended(CallStatus::Canceled)
        );
    }

    #[test]
    fn callback_urls_carry_correlation_parameters() {
        let urls = CallbackUrls::new("https://abc.ngrok.io").unwrap();
        let inbound = CallSid::new("CA1").unwrap();
        assert_eq!(
            urls.conference_outbound(&inbound).unwrap(),
            "https://abc.ngrok.io/outbound?InboundSid=CA1"
        );

        let reservation_url = urls
            .reservation_outbound(
                &TaskSid::new("WT1").unwrap(),
                &ReservationSid::new("WR1").unwrap(),
                &WorkerSid::new("WK1").unwrap(),
            )
            .unwrap();
        assert_eq!(
            reservation_url,
            "https://abc.ngrok.io/outbound?TaskSid=WT1&ReservationSid=WR1&WorkerSid=WK1"
        );
        assert_eq!(
            urls.fragment(StaticFragment::NotAvailable).unwrap(),
            "https://abc.ngrok.io/static/not_available.xml"
        );
    }

    #[test]
    fn callback_urls_keep_a_path_prefix() {
        let urls = CallbackUrls::new("https://example.com/forward").unwrap();
        assert_eq!(urls.base(), "https://example.com/forward/");
        assert_eq!(
            urls.fragment(StaticFragment::Hangup).unwrap(),
            "https://example.com/forward/static/hangup.xml"
        );
    }

    #[test]
    fn invalid_public_url_is_a_configuration_error() {
        assert!(matches!(
            CallbackUrls::new("not a url"),
            Err(AppError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn replies_map_to_http_responses() {
        let markup = WebhookReply::Markup("<Response/>".to_string()).into_response();
        assert_eq!(markup.headers()[header::CONTENT_TYPE], "text/xml");
        let body = to_bytes(markup.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"<Response/>");

        let ack = WebhookReply::Acknowledge.into_response();
        assert_eq!(ack.status(), StatusCode::NO_CONTENT);

        let instruction =
            WebhookReply::Instruction(serde_json::json!({"instruction": "reject"})).into_response();
        assert_eq!(instruction.headers()[header::CONTENT_TYPE], "application/json");
    }
}

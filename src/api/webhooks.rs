//! Provider webhook handlers. Parameters arrive in the query string, the
//! form body or both; [`WebhookParams`] merges them with the query string
//! winning, and every required parameter is checked before the orchestrator
//! sees the event.

use axum::{
    async_trait,
    extract::{FromRequest, Query, Request, State},
    http::{header, Method},
    Form,
};
use std::collections::HashMap;
use tracing::debug;

use crate::{
    calls::{AnsweredBy, CallSid, CallStatus, DomainError, Reservation, ReservationSid, TaskSid, WorkerSid},
    config::ForwardingMode,
    error::{AppError, Result},
    markup::StaticFragment,
    orchestrator::{
        Assignment, OutboundStatus, Outcome, TaskAttributes, TaskRouterEvent, WebhookReply,
        WorkerAttributes,
    },
    server::AppState,
};

/// Merged webhook parameters.
#[derive(Debug, Clone, Default)]
pub struct WebhookParams(HashMap<String, String>);

#[async_trait]
impl<S> FromRequest<S> for WebhookParams
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let Query(query) = Query::<HashMap<String, String>>::try_from_uri(req.uri())
            .map_err(|e| AppError::malformed(e.body_text()))?;

        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

        let mut params = if req.method() == Method::POST && is_form {
            let Form(body) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|e| AppError::malformed(e.body_text()))?;
            body
        } else {
            HashMap::new()
        };
        params.extend(query);

        Ok(Self(params))
    }
}

impl WebhookParams {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    /// Non-empty value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn require(&self, name: &str) -> Result<&str> {
        self.get(name)
            .ok_or_else(|| AppError::malformed(format!("Missing {}", name)))
    }

    fn sid<T>(&self, name: &str, parse: impl FnOnce(String) -> std::result::Result<T, DomainError>) -> Result<T> {
        Ok(parse(self.require(name)?.to_string())?)
    }

    /// Outbound leg status fields. None of them are required.
    pub fn outbound_status(&self) -> OutboundStatus {
        OutboundStatus {
            call_sid: self.get("CallSid").and_then(|v| CallSid::new(v).ok()),
            status: self.get("CallStatus").and_then(CallStatus::from_wire),
            answered_by: self.get("AnsweredBy").map(AnsweredBy::from_wire),
        }
    }

    /// Task, reservation and worker from the outbound callback URL.
    pub fn reservation(&self) -> Result<Reservation> {
        let task = self.sid("TaskSid", TaskSid::new)?;
        let reservation = self.sid("ReservationSid", ReservationSid::new)?;
        let worker = self.sid("WorkerSid", WorkerSid::new)?;
        Ok(Reservation::pending(reservation, task, worker))
    }

    pub fn assignment(&self) -> Result<Assignment> {
        let reservation = self.reservation()?;
        let worker_attributes = self
            .get("WorkerAttributes")
            .map(WorkerAttributes::from_json)
            .transpose()?
            .unwrap_or_default();
        let task_attributes = self
            .get("TaskAttributes")
            .map(TaskAttributes::from_json)
            .transpose()?
            .unwrap_or_default();
        Ok(Assignment {
            reservation,
            worker_attributes,
            task_attributes,
        })
    }

    pub fn task_router_event(&self) -> TaskRouterEvent {
        let owned = |name: &str| self.get(name).map(String::from);
        TaskRouterEvent {
            event_type: self.get("EventType").unwrap_or_default().to_string(),
            description: owned("EventDescription"),
            task_sid: self.get("TaskSid").and_then(|v| TaskSid::new(v).ok()),
            worker_sid: owned("WorkerSid"),
            worker_name: owned("WorkerName"),
            worker_activity_sid: owned("WorkerActivitySid"),
            worker_activity_name: owned("WorkerActivityName"),
            worker_previous_activity_sid: owned("WorkerPreviousActivitySid"),
        }
    }
}

/// POST /inbound
pub async fn inbound(State(state): State<AppState>, params: WebhookParams) -> Result<Outcome> {
    let call_sid = params.sid("CallSid", CallSid::new)?;
    let from = params.get("From");
    debug!(call_sid = %call_sid, from = from.unwrap_or("-"), "Inbound call");

    match state.config.mode {
        ForwardingMode::Conference => {
            state
                .orchestrator
                .park_inbound(call_sid, from.map(String::from))
                .await
        }
        ForwardingMode::TaskRouter => state.orchestrator.enqueue_inbound(&call_sid, from),
    }
}

/// POST /outbound
pub async fn outbound(State(state): State<AppState>, params: WebhookParams) -> Result<Outcome> {
    let status = params.outbound_status();
    match state.config.mode {
        ForwardingMode::Conference => {
            let inbound = params.sid("InboundSid", CallSid::new)?;
            state.orchestrator.handle_outbound_status(inbound, status).await
        }
        ForwardingMode::TaskRouter => {
            let reservation = params.reservation()?;
            state
                .orchestrator
                .handle_reservation_outbound(reservation, status)
                .await
        }
    }
}

/// POST /inbound_ended
pub async fn inbound_ended(
    State(state): State<AppState>,
    params: WebhookParams,
) -> Result<Outcome> {
    let inbound = match params.get("InboundSid") {
        Some(sid) => CallSid::new(sid)?,
        None => params.sid("CallSid", CallSid::new)?,
    };
    if let Some(outbound) = params.get("OutboundSid") {
        debug!(inbound_sid = %inbound, outbound_sid = outbound, "Inbound ended");
    }
    state.orchestrator.handle_inbound_ended(inbound).await
}

/// POST /assign
pub async fn assign(State(state): State<AppState>, params: WebhookParams) -> Result<Outcome> {
    let assignment = params.assignment()?;
    state.orchestrator.assign(assignment).await
}

/// POST /trevents
pub async fn task_router_events(
    State(state): State<AppState>,
    params: WebhookParams,
) -> Result<Outcome> {
    state
        .orchestrator
        .handle_task_event(params.task_router_event())
        .await
}

/// GET|POST /static/hangup.xml
pub async fn hangup_fragment() -> Result<WebhookReply> {
    Ok(WebhookReply::Markup(StaticFragment::Hangup.render()?))
}

/// GET|POST /static/not_available.xml
pub async fn not_available_fragment() -> Result<WebhookReply> {
    Ok(WebhookReply::Markup(StaticFragment::NotAvailable.render()?))
}

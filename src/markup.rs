//! Provider call-control markup rendered from `templates/`.

use askama::Template;
use serde_json::json;

use crate::{
    calls::{ActivitySid, ReservationSid, WorkflowSid},
    error::Result,
};

#[derive(Template)]
#[template(path = "join_conference.xml", escape = "html")]
struct JoinConferenceTemplate<'a> {
    conference_name: &'a str,
}

#[derive(Template)]
#[template(path = "enqueue_call.xml", escape = "html")]
struct EnqueueCallTemplate<'a> {
    workflow_sid: &'a str,
    task_attributes: String,
}

#[derive(Template)]
#[template(path = "dial_queue.xml", escape = "html")]
struct DialQueueTemplate<'a> {
    reservation_sid: &'a str,
    post_work_activity_sid: &'a str,
}

#[derive(Template)]
#[template(path = "hangup.xml", escape = "html")]
struct HangupTemplate;

#[derive(Template)]
#[template(path = "not_available.xml", escape = "html")]
struct NotAvailableTemplate;

/// Static fragments the provider is redirected to by URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticFragment {
    Hangup,
    NotAvailable,
}

impl StaticFragment {
    pub fn file_name(&self) -> &'static str {
        match self {
            StaticFragment::Hangup => "hangup.xml",
            StaticFragment::NotAvailable => "not_available.xml",
        }
    }

    pub fn render(&self) -> Result<String> {
        Ok(match self {
            StaticFragment::Hangup => HangupTemplate.render()?,
            StaticFragment::NotAvailable => NotAvailableTemplate.render()?,
        })
    }
}

/// Put a leg into the conference named after the parked inbound call.
pub fn join_conference(conference_name: &str) -> Result<String> {
    Ok(JoinConferenceTemplate { conference_name }.render()?)
}

/// Enqueue the caller into the workflow, carrying its caller id as a task attribute.
pub fn enqueue_call(workflow_sid: &WorkflowSid, caller_id: Option<&str>) -> Result<String> {
    let task_attributes = serde_json::to_string(&json!({ "caller_id": caller_id }))?;
    Ok(EnqueueCallTemplate {
        workflow_sid: workflow_sid.as_str(),
        task_attributes,
    }
    .render()?)
}

/// Bridge the answered worker to the queued caller. Dialing the queue with the
/// reservation SID accepts the reservation.
pub fn dial_queue(reservation: &ReservationSid, post_work_activity: &ActivitySid) -> Result<String> {
    Ok(DialQueueTemplate {
        reservation_sid: reservation.as_str(),
        post_work_activity_sid: post_work_activity.as_str(),
    }
    .render()?)
}

pub fn hangup() -> Result<String> {
    StaticFragment::Hangup.render()
}

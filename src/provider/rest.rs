use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{CallControl, CatalogEntry, OutboundCallRequest, ProviderError, WorkerRecord};
use crate::calls::{ActivitySid, CallSid, ReservationSid, TaskSid, WorkerSid, WorkspaceSid};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const PAGE_SIZE: &str = "1000";

#[derive(Debug, Clone)]
pub struct ProviderCredentials {
    pub account_sid: String,
    pub auth_token: String,
}

/// Base URLs of the voice API and the task-routing API.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub api_base: String,
    pub taskrouter_base: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            api_base: "https://api.twilio.com".to_string(),
            taskrouter_base: "https://taskrouter.twilio.com".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallResource {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct ConferencePage {
    #[serde(default)]
    conferences: Vec<ConferenceResource>,
}

#[derive(Debug, Deserialize)]
struct ConferenceResource {
    #[allow(dead_code)]
    sid: String,
}

#[derive(Debug, Deserialize)]
struct WorkspacePage {
    #[serde(default)]
    workspaces: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct WorkflowPage {
    #[serde(default)]
    workflows: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct ActivityPage {
    #[serde(default)]
    activities: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct WorkerPage {
    #[serde(default)]
    workers: Vec<WorkerRecord>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<u32>,
    message: Option<String>,
}

/// [`CallControl`] over the provider's REST API.
#[derive(Debug, Clone)]
pub struct RestCallControl {
    http: Client,
    credentials: ProviderCredentials,
    endpoints: ProviderEndpoints,
    workspace_sid: Option<WorkspaceSid>,
}

impl RestCallControl {
    pub fn new(
        credentials: ProviderCredentials,
        endpoints: ProviderEndpoints,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ProviderError::transport)?;

        Ok(Self {
            http,
            credentials,
            endpoints,
            workspace_sid: None,
        })
    }

    /// Scope task-routing operations to a workspace.
    pub fn with_workspace(mut self, workspace_sid: WorkspaceSid) -> Self {
        self.workspace_sid = Some(workspace_sid);
        self
    }

    pub async fn fetch_workspaces(
        &self,
        friendly_name: &str,
    ) -> Result<Vec<CatalogEntry>, ProviderError> {
        let url = format!("{}/v1/Workspaces", self.taskrouter_base());
        let page: WorkspacePage = self
            .get_json(&url, &[("FriendlyName", friendly_name), ("PageSize", PAGE_SIZE)])
            .await?;
        Ok(page.workspaces)
    }

    pub async fn fetch_workflows(
        &self,
        workspace: &WorkspaceSid,
    ) -> Result<Vec<CatalogEntry>, ProviderError> {
        let url = format!("{}/v1/Workspaces/{}/Workflows", self.taskrouter_base(), workspace);
        let page: WorkflowPage = self.get_json(&url, &[("PageSize", PAGE_SIZE)]).await?;
        Ok(page.workflows)
    }

    pub async fn fetch_activities(
        &self,
        workspace: &WorkspaceSid,
    ) -> Result<Vec<CatalogEntry>, ProviderError> {
        let url = format!("{}/v1/Workspaces/{}/Activities", self.taskrouter_base(), workspace);
        let page: ActivityPage = self.get_json(&url, &[("PageSize", PAGE_SIZE)]).await?;
        Ok(page.activities)
    }

    fn api_base(&self) -> &str {
        self.endpoints.api_base.trim_end_matches('/')
    }

    fn taskrouter_base(&self) -> &str {
        self.endpoints.taskrouter_base.trim_end_matches('/')
    }

    fn account_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}",
            self.api_base(),
            self.credentials.account_sid
        )
    }

    fn workspace_url(&self) -> Result<String, ProviderError> {
        let workspace = self.workspace_sid.as_ref().ok_or_else(|| {
            ProviderError::new(0, None, "No task-router workspace configured")
        })?;
        Ok(format!("{}/v1/Workspaces/{}", self.taskrouter_base(), workspace))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        debug!(url = %url, "Provider GET");
        let response = self
            .http
            .get(url)
            .basic_auth(&self.credentials.account_sid, Some(&self.credentials.auth_token))
            .query(query)
            .send()
            .await
            .map_err(ProviderError::transport)?;

        Self::check(response)
            .await?
            .json::<T>()
            .await
            .map_err(ProviderError::transport)
    }

    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Response, ProviderError> {
        debug!(url = %url, "Provider POST");
        let response = self
            .http
            .post(url)
            .basic_auth(&self.credentials.account_sid, Some(&self.credentials.auth_token))
            .form(form)
            .send()
            .await
            .map_err(ProviderError::transport)?;

        Self::check(response).await
    }

    async fn check(response: Response) -> Result<Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let parsed = serde_json::from_str::<ErrorBody>(&body).ok();
        let code = parsed.as_ref().and_then(|b| b.code);
        let message = parsed
            .and_then(|b| b.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| {
                if body.is_empty() {
                    status.canonical_reason().unwrap_or("provider error").to_string()
                } else {
                    body
                }
            });

        Err(ProviderError::new(status.as_u16(), code, message))
    }
}

#[async_trait]
impl CallControl for RestCallControl {
    async fn create_call(&self, request: &OutboundCallRequest) -> Result<CallSid, ProviderError> {
        let url = format!("{}/Calls.json", self.account_url());
        let mut form = vec![
            ("To", request.to.as_str()),
            ("From", request.from.as_str()),
            ("Url", request.url.as_str()),
            ("StatusCallback", request.status_callback.as_str()),
        ];
        if request.machine_detection {
            form.push(("MachineDetection", "Enable"));
        }

        let call: CallResource = self
            .post_form(&url, &form)
            .await?
            .json()
            .await
            .map_err(ProviderError::transport)?;

        CallSid::new(call.sid)
            .map_err(|e| ProviderError::new(200, None, format!("Provider returned {}", e)))
    }

    async fn redirect_call(&self, sid: &CallSid, markup_url: &str) -> Result<(), ProviderError> {
        let url = format!("{}/Calls/{}.json", self.account_url(), sid);
        self.post_form(&url, &[("Url", markup_url), ("Method", "GET")])
            .await?;
        Ok(())
    }

    async fn cancel_call(&self, sid: &CallSid) -> Result<(), ProviderError> {
        let url = format!("{}/Calls/{}.json", self.account_url(), sid);
        self.post_form(&url, &[("Status", "canceled")]).await?;
        Ok(())
    }

    async fn conference_is_active(&self, friendly_name: &str) -> bool {
        let url = format!("{}/Conferences.json", self.account_url());
        let page: Result<ConferencePage, _> = self
            .get_json(&url, &[("Status", "in-progress"), ("FriendlyName", friendly_name)])
            .await;

        match page {
            Ok(page) => !page.conferences.is_empty(),
            Err(e) => {
                warn!(conference = %friendly_name, error = %e, "Can't find conference");
                false
            }
        }
    }

    async fn update_worker_activity(
        &self,
        worker: &WorkerSid,
        activity: &ActivitySid,
    ) -> Result<(), ProviderError> {
        let url = format!("{}/Workers/{}", self.workspace_url()?, worker);
        self.post_form(&url, &[("ActivitySid", activity.as_str())])
            .await?;
        Ok(())
    }

    async fn reject_reservation(
        &self,
        task: &TaskSid,
        reservation: &ReservationSid,
        follow_up: &ActivitySid,
    ) -> Result<(), ProviderError> {
        let url = format!(
            "{}/Tasks/{}/Reservations/{}",
            self.workspace_url()?,
            task,
            reservation
        );
        self.post_form(
            &url,
            &[
                ("ReservationStatus", "rejected"),
                ("WorkerActivitySid", follow_up.as_str()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn list_workers(&self) -> Result<Vec<WorkerRecord>, ProviderError> {
        let url = format!("{}/Workers", self.workspace_url()?);
        let page: WorkerPage = self.get_json(&url, &[("PageSize", PAGE_SIZE)]).await?;
        Ok(page.workers)
    }
}

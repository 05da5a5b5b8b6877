//! Task-routing workspace snapshot, resolved once at startup.

use std::collections::HashMap;
use tracing::info;

use crate::{
    calls::{ActivitySid, WorkerActivity, WorkflowSid, WorkspaceSid},
    error::{AppError, Result},
    provider::{CatalogEntry, RestCallControl},
};

/// Activity SIDs for the slots the orchestrator moves workers between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivitySet {
    pub offline: ActivitySid,
    pub idle: ActivitySid,
    pub temporarily_unavailable: ActivitySid,
}

impl ActivitySet {
    pub fn sid_for(&self, activity: WorkerActivity) -> &ActivitySid {
        match activity {
            WorkerActivity::Offline => &self.offline,
            WorkerActivity::Idle => &self.idle,
            WorkerActivity::TemporarilyUnavailable => &self.temporarily_unavailable,
        }
    }
}

/// Immutable view of the workspace: its SID, the default workflow and the
/// activity catalog by SID.
#[derive(Debug, Clone)]
pub struct WorkspaceSnapshot {
    pub sid: WorkspaceSid,
    pub workflow_sid: WorkflowSid,
    pub activities: ActivitySet,
    activity_names: HashMap<String, String>,
}

impl WorkspaceSnapshot {
    /// Build from catalog listings. The first workflow is the default one.
    pub fn from_catalog(
        sid: WorkspaceSid,
        workflows: &[CatalogEntry],
        activities: &[CatalogEntry],
    ) -> Result<Self> {
        let workflow = workflows.first().ok_or_else(|| {
            AppError::Configuration(format!("Workspace {} contains no workflows", sid))
        })?;
        let workflow_sid = WorkflowSid::new(workflow.sid.clone())?;

        let mut activity_names = HashMap::new();
        let mut activity_sids = HashMap::new();
        for activity in activities {
            activity_names.insert(activity.sid.clone(), activity.friendly_name.clone());
            activity_sids.insert(activity.friendly_name.clone(), activity.sid.clone());
        }

        let resolve = |slot: WorkerActivity| -> Result<ActivitySid> {
            let sid = activity_sids.get(slot.catalog_name()).ok_or_else(|| {
                AppError::Configuration(format!("Missing activity {}", slot.catalog_name()))
            })?;
            Ok(ActivitySid::new(sid.clone())?)
        };

        let activities = ActivitySet {
            offline: resolve(WorkerActivity::Offline)?,
            idle: resolve(WorkerActivity::Idle)?,
            temporarily_unavailable: resolve(WorkerActivity::TemporarilyUnavailable)?,
        };

        Ok(Self {
            sid,
            workflow_sid,
            activities,
            activity_names,
        })
    }

    /// Look up a workspace by friendly name and snapshot its catalog.
    pub async fn discover(client: &RestCallControl, name: &str) -> Result<Self> {
        let workspaces = client.fetch_workspaces(name).await?;
        let workspace = workspaces
            .into_iter()
            .find(|w| w.friendly_name == name)
            .ok_or_else(|| AppError::Configuration(format!("No workspace named {}", name)))?;
        let sid = WorkspaceSid::new(workspace.sid)?;

        let workflows = client.fetch_workflows(&sid).await?;
        let activities = client.fetch_activities(&sid).await?;
        let snapshot = Self::from_catalog(sid, &workflows, &activities)?;

        info!(
            workspace = %snapshot.sid,
            workflow = %snapshot.workflow_sid,
            activities = activities.len(),
            "Resolved task-router workspace"
        );
        Ok(snapshot)
    }

    pub fn activity_name(&self, sid: &str) -> Option<&str> {
        self.activity_names.get(sid).map(String::as_str)
    }
}

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{
    error::{AppError, Result},
    provider::{ProviderCredentials, ProviderEndpoints},
};

/// Which parking strategy the server runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ForwardingMode {
    /// Park the caller in a conference and dial the configured destination.
    Conference,
    /// Enqueue the caller and dial whichever worker the task router reserves.
    TaskRouter,
}

impl ForwardingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForwardingMode::Conference => "conference",
            ForwardingMode::TaskRouter => "task-router",
        }
    }
}

/// How a worker gets back to Idle after a dialed reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum RescheduleMode {
    /// Fixed cool-down timer, regardless of when the call ends.
    #[default]
    Timer,
    /// The outbound call's completion drives the transition; the cool-down is a ceiling.
    EndOfCall,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub mode: ForwardingMode,
    pub credentials: ProviderCredentials,
    pub endpoints: ProviderEndpoints,
    pub caller_id: Option<String>,
    pub destination_number: Option<String>,
    pub workspace_name: Option<String>,
    pub public_url: Option<String>,
    pub cooldown_secs: u64,
    pub reschedule: RescheduleMode,
}

impl Config {
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn local_url(&self) -> String {
        let host = if self.host == "0.0.0.0" { "localhost" } else { &self.host };
        format!("http://{}:{}", host, self.port)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.credentials.account_sid.trim().is_empty()
            || self.credentials.auth_token.trim().is_empty()
        {
            return Err(AppError::Configuration(
                "Provider account SID and auth token are required".to_string(),
            ));
        }

        match self.mode {
            ForwardingMode::Conference if blank(&self.destination_number) => {
                Err(AppError::Configuration(
                    "Conference mode requires a destination number".to_string(),
                ))
            }
            ForwardingMode::TaskRouter if blank(&self.workspace_name) => Err(
                AppError::Configuration("Task-router mode requires a workspace name".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// Caller id and destination, editable while the server runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    pub caller_id: Option<String>,
    pub destination_number: Option<String>,
}

#[derive(Debug, Default)]
pub struct ForwardingSettings {
    inner: RwLock<SettingsSnapshot>,
}

impl ForwardingSettings {
    pub fn new(caller_id: Option<String>, destination_number: Option<String>) -> Self {
        Self {
            inner: RwLock::new(SettingsSnapshot {
                caller_id: normalize(caller_id),
                destination_number: normalize(destination_number),
            }),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.caller_id.clone(), config.destination_number.clone())
    }

    pub fn snapshot(&self) -> SettingsSnapshot {
        self.inner.read().clone()
    }

    pub fn caller_id(&self) -> Option<String> {
        self.inner.read().caller_id.clone()
    }

    pub fn destination_number(&self) -> Option<String> {
        self.inner.read().destination_number.clone()
    }

    /// Replace both values; blanks clear a value.
    pub fn update(&self, update: SettingsSnapshot) -> SettingsSnapshot {
        let mut inner = self.inner.write();
        inner.caller_id = normalize(update.caller_id);
        inner.destination_number = normalize(update.destination_number);
        inner.clone()
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

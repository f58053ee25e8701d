//! Streaming events emitted while a deployment runs
//!
//! Three event kinds, all keyed by deployment identifier: incremental log
//! text, incremental error text, and exactly one terminal `Complete` per
//! deployment carrying the success flag and a summary message.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeployEvent {
    Log {
        deployment_id: String,
        text: String,
    },
    ErrorLog {
        deployment_id: String,
        text: String,
    },
    Complete {
        deployment_id: String,
        success: bool,
        message: String,
    },
}

impl DeployEvent {
    pub fn log(deployment_id: impl Into<String>, text: impl Into<String>) -> Self {
        DeployEvent::Log {
            deployment_id: deployment_id.into(),
            text: text.into(),
        }
    }

    pub fn error_log(deployment_id: impl Into<String>, text: impl Into<String>) -> Self {
        DeployEvent::ErrorLog {
            deployment_id: deployment_id.into(),
            text: text.into(),
        }
    }

    pub fn complete(
        deployment_id: impl Into<String>,
        success: bool,
        message: impl Into<String>,
    ) -> Self {
        DeployEvent::Complete {
            deployment_id: deployment_id.into(),
            success,
            message: message.into(),
        }
    }

    pub fn deployment_id(&self) -> &str {
        match self {
            DeployEvent::Log { deployment_id, .. }
            | DeployEvent::ErrorLog { deployment_id, .. }
            | DeployEvent::Complete { deployment_id, .. } => deployment_id,
        }
    }

    /// True for the single event that ends a deployment's stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeployEvent::Complete { .. })
    }
}

//! On-disk deployment bookkeeping
//!
//! Every deployment gets its own directory under the workspace root, named
//! by its (sanitized) identifier, holding the downloaded configuration plus
//! a `deployment.json` record. Listing reads the records back, newest first.

use crate::errors::PilotError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const RECORD_FILE: &str = "deployment.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub id: String,
    pub repo: String,
    pub action: String,
    pub status: DeploymentStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub struct DeploymentStore {
    root: PathBuf,
}

impl DeploymentStore {
    pub fn new(root: PathBuf) -> Result<Self, PilotError> {
        fs::create_dir_all(&root).map_err(|e| {
            PilotError::Config(format!(
                "Failed to create workspace directory {}: {}",
                root.display(),
                e
            ))
        })?;
        Ok(Self { root })
    }

    /// Default workspace root under the user data directory.
    pub fn default_root() -> Result<PathBuf, PilotError> {
        let base = dirs::data_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
            .ok_or_else(|| {
                PilotError::Config("Unable to determine a data directory".to_string())
            })?;
        Ok(base.join("tfpilot").join("deployments"))
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// The working directory for one deployment.
    pub fn deployment_dir(&self, id: &str) -> PathBuf {
        let sanitized: String = id
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        self.root.join(sanitized)
    }

    /// Create the deployment directory and write its initial record.
    pub fn create(&self, id: &str, repo: &str, action: &str) -> Result<PathBuf, PilotError> {
        let dir = self.deployment_dir(id);
        fs::create_dir_all(&dir)?;
        let record = DeploymentRecord {
            id: id.to_string(),
            repo: repo.to_string(),
            action: action.to_string(),
            status: DeploymentStatus::Running,
            created_at: Utc::now(),
            finished_at: None,
            message: None,
        };
        self.write_record(&dir, &record)?;
        Ok(dir)
    }

    /// Mark a deployment finished.
    pub fn finish(&self, id: &str, success: bool, message: &str) -> Result<(), PilotError> {
        let dir = self.deployment_dir(id);
        let mut record = self.read_record(&dir)?;
        record.status = if success {
            DeploymentStatus::Succeeded
        } else {
            DeploymentStatus::Failed
        };
        record.finished_at = Some(Utc::now());
        record.message = Some(message.to_string());
        self.write_record(&dir, &record)
    }

    /// All known deployments, newest first. Unreadable entries are skipped.
    pub fn list(&self) -> Result<Vec<DeploymentRecord>, PilotError> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            match self.read_record(&entry.path()) {
                Ok(record) => records.push(record),
                Err(e) => {
                    log::debug!("Skipping {}: {}", entry.path().display(), e);
                }
            }
        }
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    fn write_record(&self, dir: &PathBuf, record: &DeploymentRecord) -> Result<(), PilotError> {
        let content = serde_json::to_string_pretty(record)?;
        fs::write(dir.join(RECORD_FILE), content)?;
        Ok(())
    }

    fn read_record(&self, dir: &PathBuf) -> Result<DeploymentRecord, PilotError> {
        let content = fs::read_to_string(dir.join(RECORD_FILE))?;
        Ok(serde_json::from_str(&content)?)
    }
}

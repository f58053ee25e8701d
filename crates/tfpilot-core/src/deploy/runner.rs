//! Child-process wrapper around the provisioning executable
//!
//! Runs `init` followed by `apply` or `destroy` in a deployment directory,
//! forwarding each stdout/stderr line to the event channel as it appears.
//! Exactly one terminal `Complete` event is emitted per execution, carrying
//! the success flag and, on failure, the exit code.
//!
//! The child environment is built from the explicit captured map; only PATH
//! and HOME are carried over from the parent so the binary can run at all.

use crate::errors::PilotError;
use crate::events::DeployEvent;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployAction {
    Apply,
    Destroy,
}

impl DeployAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployAction::Apply => "apply",
            DeployAction::Destroy => "destroy",
        }
    }
}

impl std::fmt::Display for DeployAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct TerraformRunner {
    binary: PathBuf,
}

impl TerraformRunner {
    /// Locate the provisioning executable on PATH.
    pub fn locate(binary_name: &str) -> Result<Self, PilotError> {
        let binary = which::which(binary_name).map_err(|e| {
            PilotError::Deploy(format!(
                "provisioning executable '{}' not found: {}",
                binary_name, e
            ))
        })?;
        log::debug!("Using provisioning executable at {}", binary.display());
        Ok(Self { binary })
    }

    pub fn with_path(binary: PathBuf) -> Self {
        Self { binary }
    }

    /// Run init then the requested action, streaming output as events.
    ///
    /// Returns the overall success flag after sending the terminal event.
    pub async fn execute(
        &self,
        working_dir: &Path,
        action: DeployAction,
        env: &HashMap<String, String>,
        deployment_id: &str,
        events: &mpsc::Sender<DeployEvent>,
    ) -> bool {
        match self
            .run_stage(working_dir, &["init", "-input=false", "-no-color"], env, deployment_id, events)
            .await
        {
            Ok(status) if !status.success() => {
                let message = format!(
                    "terraform init failed with exit code {}",
                    describe_exit(&status)
                );
                let _ = events
                    .send(DeployEvent::complete(deployment_id, false, message))
                    .await;
                return false;
            }
            Err(e) => {
                let _ = events
                    .send(DeployEvent::complete(
                        deployment_id,
                        false,
                        format!("terraform init could not start: {}", e),
                    ))
                    .await;
                return false;
            }
            Ok(_) => {}
        }

        let args: &[&str] = match action {
            DeployAction::Apply => &["apply", "-auto-approve", "-input=false", "-no-color"],
            DeployAction::Destroy => &["destroy", "-auto-approve", "-input=false", "-no-color"],
        };
        match self
            .run_stage(working_dir, args, env, deployment_id, events)
            .await
        {
            Ok(status) if status.success() => {
                let _ = events
                    .send(DeployEvent::complete(
                        deployment_id,
                        true,
                        format!("terraform {} completed successfully", action),
                    ))
                    .await;
                true
            }
            Ok(status) => {
                let _ = events
                    .send(DeployEvent::complete(
                        deployment_id,
                        false,
                        format!(
                            "terraform {} failed with exit code {}",
                            action,
                            describe_exit(&status)
                        ),
                    ))
                    .await;
                false
            }
            Err(e) => {
                let _ = events
                    .send(DeployEvent::complete(
                        deployment_id,
                        false,
                        format!("terraform {} could not start: {}", action, e),
                    ))
                    .await;
                false
            }
        }
    }

    async fn run_stage(
        &self,
        working_dir: &Path,
        args: &[&str],
        env: &HashMap<String, String>,
        deployment_id: &str,
        events: &mpsc::Sender<DeployEvent>,
    ) -> Result<std::process::ExitStatus, PilotError> {
        log::info!(
            "[{}] running {} {}",
            deployment_id,
            self.binary.display(),
            args.join(" ")
        );

        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .current_dir(working_dir)
            .env_clear()
            .env("TF_IN_AUTOMATION", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for inherited in ["PATH", "HOME"] {
            if let Ok(value) = std::env::var(inherited) {
                command.env(inherited, value);
            }
        }
        command.envs(env);

        let mut child = command
            .spawn()
            .map_err(|e| PilotError::Deploy(format!("failed to spawn: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PilotError::Deploy("child stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| PilotError::Deploy("child stderr unavailable".to_string()))?;

        let out_task = forward_lines(stdout, events.clone(), deployment_id.to_string(), false);
        let err_task = forward_lines(stderr, events.clone(), deployment_id.to_string(), true);

        let status = child
            .wait()
            .await
            .map_err(|e| PilotError::Deploy(format!("failed to wait for child: {}", e)))?;

        let _ = out_task.await;
        let _ = err_task.await;
        Ok(status)
    }
}

fn forward_lines<R>(
    reader: R,
    events: mpsc::Sender<DeployEvent>,
    deployment_id: String,
    is_error: bool,
) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let event = if is_error {
                DeployEvent::error_log(&deployment_id, line)
            } else {
                DeployEvent::log(&deployment_id, line)
            };
            if events.send(event).await.is_err() {
                break;
            }
        }
    })
}

fn describe_exit(status: &std::process::ExitStatus) -> String {
    match status.code() {
        Some(code) => code.to_string(),
        None => "unknown (terminated by signal)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The runner is exercised against /bin/sh rather than a real terraform
    // binary; the contract under test is the streaming and the single
    // terminal event, not terraform itself.

    async fn collect_events(
        script_behavior: &str,
    ) -> (bool, Vec<DeployEvent>) {
        let dir = tempfile::tempdir().unwrap();
        // A fake binary that understands "init" and "apply" subcommands.
        let fake = dir.path().join("fake-terraform");
        std::fs::write(&fake, format!("#!/bin/sh\n{}\n", script_behavior)).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let runner = TerraformRunner::with_path(fake);
        let (tx, mut rx) = mpsc::channel(64);
        let success = runner
            .execute(dir.path(), DeployAction::Apply, &HashMap::new(), "dep-1", &tx)
            .await;
        drop(tx);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (success, events)
    }

    #[tokio::test]
    async fn test_successful_run_emits_single_terminal_event() {
        let (success, events) = collect_events("echo running $1; exit 0").await;
        assert!(success);
        let terminals: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
        assert_eq!(terminals.len(), 1);
        match terminals[0] {
            DeployEvent::Complete {
                success, message, ..
            } => {
                assert!(success);
                assert!(message.contains("apply"));
            }
            _ => unreachable!(),
        }
        // Both stages logged their stdout line
        let logs: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, DeployEvent::Log { .. }))
            .collect();
        assert_eq!(logs.len(), 2);
    }

    #[tokio::test]
    async fn test_init_failure_short_circuits() {
        let (success, events) =
            collect_events("if [ \"$1\" = \"init\" ]; then echo bad >&2; exit 3; fi; exit 0")
                .await;
        assert!(!success);
        let terminals: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
        assert_eq!(terminals.len(), 1);
        match terminals[0] {
            DeployEvent::Complete {
                success, message, ..
            } => {
                assert!(!success);
                assert!(message.contains("init"));
                assert!(message.contains('3'));
            }
            _ => unreachable!(),
        }
        // stderr came through as an error-log event
        assert!(events
            .iter()
            .any(|e| matches!(e, DeployEvent::ErrorLog { text, .. } if text == "bad")));
    }

    #[tokio::test]
    async fn test_apply_failure_reports_exit_code() {
        let (success, events) =
            collect_events("if [ \"$1\" = \"apply\" ]; then exit 7; fi; exit 0").await;
        assert!(!success);
        match events.last().unwrap() {
            DeployEvent::Complete {
                success, message, ..
            } => {
                assert!(!success);
                assert!(message.contains("apply"));
                assert!(message.contains('7'));
            }
            _ => panic!("last event must be terminal"),
        }
    }

    #[tokio::test]
    async fn test_missing_binary_reports_via_channel() {
        let runner = TerraformRunner::with_path(PathBuf::from(
            "/nonexistent/definitely-not-terraform",
        ));
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let success = runner
            .execute(dir.path(), DeployAction::Apply, &HashMap::new(), "dep-2", &tx)
            .await;
        drop(tx);
        assert!(!success);
        let event = rx.recv().await.unwrap();
        assert!(event.is_terminal());
    }
}

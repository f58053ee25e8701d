//! Top-level service facade
//!
//! `Pilot` wires the GitHub source, the variable engine, and the deploy
//! driver together. Parsing is synchronous request/response; deployments are
//! accepted first and then report exclusively through the event channel.

use crate::config::PilotConfig;
use crate::deploy::{
    render_backend, render_tfvars, DeployAction, DeploymentRecord, DeploymentStore,
    TerraformRunner,
};
use crate::errors::PilotError;
use crate::events::DeployEvent;
use crate::github::{fetch_repo_contents, GithubClient, RepoLocator, RepoSource};
use crate::variables::{
    merge_variables, readme, terraform, tfvars, MergeOptions, ReadmeRecord, TfvarsRecord,
    VariableRecord,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

const README_EXCERPT_LIMIT: usize = 2000;
const TFVARS_ARTIFACT: &str = "tfpilot.auto.tfvars";
const BACKEND_ARTIFACT: &str = "backend.tf.json";
const ENV_VAR_PREFIX: &str = "TF_VAR_";

/// Result of one parse operation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseOutcome {
    pub repo: String,
    /// The merged, canonical variable model.
    pub variables: BTreeMap<String, VariableRecord>,
    /// Raw per-extractor maps, for transparency.
    pub terraform: BTreeMap<String, VariableRecord>,
    pub tfvars: BTreeMap<String, TfvarsRecord>,
    pub readme: BTreeMap<String, ReadmeRecord>,
    /// Leading excerpt of the documentation file.
    pub readme_excerpt: String,
}

/// One accepted deployment request.
#[derive(Debug, Clone)]
pub struct DeploymentRequest {
    pub repo: String,
    pub variables: BTreeMap<String, Value>,
    pub deployment_id: String,
    pub action: DeployAction,
}

pub struct Pilot {
    config: PilotConfig,
    source: Arc<dyn RepoSource>,
    store: DeploymentStore,
    /// Credential environment captured once at construction.
    credentials: HashMap<String, String>,
}

impl Pilot {
    pub fn from_config(config: PilotConfig) -> Result<Self, PilotError> {
        let source = Arc::new(GithubClient::new(&config.github)?);
        Self::with_source(config, source)
    }

    /// Construct with a custom repository source (tests, mirrors).
    pub fn with_source(
        config: PilotConfig,
        source: Arc<dyn RepoSource>,
    ) -> Result<Self, PilotError> {
        let root = match &config.workspace_dir {
            Some(dir) => dir.clone(),
            None => DeploymentStore::default_root()?,
        };
        let store = DeploymentStore::new(root)?;
        let credentials = config.environment.capture();
        log::debug!(
            "Captured {} credential variable(s) for child processes",
            credentials.len()
        );
        Ok(Self {
            config,
            source,
            store,
            credentials,
        })
    }

    /// Fetch a repository directory and build the merged variable model.
    pub async fn parse_repository(&self, locator_str: &str) -> Result<ParseOutcome, PilotError> {
        let locator = RepoLocator::parse(locator_str)?;
        log::info!("Parsing {}", locator.slug());

        let contents = fetch_repo_contents(self.source.as_ref(), &locator).await?;

        let declared = terraform::extract_from_files(
            contents
                .terraform_files
                .iter()
                .map(|(name, text)| (name.as_str(), text.as_str())),
        );
        let defaults = contents
            .tfvars_file
            .as_ref()
            .map(|(_, text)| tfvars::extract(text))
            .unwrap_or_default();
        let documented = contents
            .readme_file
            .as_ref()
            .map(|(_, text)| readme::extract(text))
            .unwrap_or_default();
        let readme_excerpt = contents
            .readme_file
            .as_ref()
            .map(|(_, text)| text.chars().take(README_EXCERPT_LIMIT).collect())
            .unwrap_or_default();

        let variables = merge_variables(
            declared.clone(),
            &documented,
            &defaults,
            MergeOptions { apply_tfvars: true },
        );
        log::info!(
            "Parsed {}: {} variable(s) from {} file(s)",
            locator.slug(),
            variables.len(),
            contents.terraform_files.len()
        );

        Ok(ParseOutcome {
            repo: locator.slug(),
            variables,
            terraform: declared,
            tfvars: defaults,
            readme: documented,
            readme_excerpt,
        })
    }

    /// Run an accepted deployment to completion.
    ///
    /// Never returns an error: everything past acceptance is reported on the
    /// event channel, ending in exactly one terminal event.
    pub async fn execute_deployment(
        &self,
        request: DeploymentRequest,
        events: mpsc::Sender<DeployEvent>,
    ) {
        let id = request.deployment_id.clone();
        match self.prepare_and_run(&request, &events).await {
            Ok(success) => {
                let outcome = if success { "succeeded" } else { "failed" };
                if let Err(e) = self.store.finish(&id, success, outcome) {
                    log::warn!("[{}] could not update history record: {}", id, e);
                }
            }
            Err(e) => {
                log::error!("[{}] deployment aborted: {}", id, e);
                if let Err(record_err) = self.store.finish(&id, false, &e.to_string()) {
                    log::warn!("[{}] could not update history record: {}", id, record_err);
                }
                let _ = events
                    .send(DeployEvent::complete(&id, false, e.to_string()))
                    .await;
            }
        }
    }

    /// Everything that can fail before the provisioning executable starts.
    /// Once the runner takes over it emits the terminal event itself.
    async fn prepare_and_run(
        &self,
        request: &DeploymentRequest,
        events: &mpsc::Sender<DeployEvent>,
    ) -> Result<bool, PilotError> {
        let locator = RepoLocator::parse(&request.repo)?;
        let id = &request.deployment_id;

        let dir = self
            .store
            .create(id, &locator.slug(), request.action.as_str())?;

        let _ = events
            .send(DeployEvent::log(
                id,
                format!("Fetching {}", locator.slug()),
            ))
            .await;
        let count = self.source.download_directory(&locator, &dir).await?;
        let _ = events
            .send(DeployEvent::log(id, format!("Downloaded {} file(s)", count)))
            .await;

        let sensitive = sensitive_names(&dir)?;
        let artifact = render_tfvars(&request.variables, &sensitive);
        std::fs::write(dir.join(TFVARS_ARTIFACT), artifact)?;

        if let Some(backend) = &self.config.backend {
            std::fs::write(dir.join(BACKEND_ARTIFACT), render_backend(backend))?;
            let _ = events
                .send(DeployEvent::log(
                    id,
                    format!("Configured {} backend", backend.backend_type),
                ))
                .await;
        }

        let mut env = self.credentials.clone();
        for (name, value) in &request.variables {
            if sensitive.contains(name) {
                env.insert(
                    format!("{}{}", ENV_VAR_PREFIX, name),
                    env_value(value),
                );
            }
        }

        let runner = TerraformRunner::locate(&self.config.terraform_bin)?;
        Ok(runner
            .execute(&dir, request.action, &env, id, events)
            .await)
    }

    /// Deployment history, newest first.
    pub fn history(&self) -> Result<Vec<DeploymentRecord>, PilotError> {
        self.store.list()
    }
}

/// Names declared sensitive by the downloaded configuration.
///
/// The merged parse model is not persisted across the parse/deploy boundary;
/// sensitivity is re-derived from the declaration files on disk.
fn sensitive_names(dir: &Path) -> Result<BTreeSet<String>, PilotError> {
    let mut names = BTreeSet::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("tf") {
            continue;
        }
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let content = std::fs::read_to_string(&path)?;
        for (name, record) in terraform::extract_from_file(&content, &file_name) {
            if record.sensitive {
                names.insert(name);
            }
        }
    }
    Ok(names)
}

/// Environment representation of a variable value.
fn env_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => crate::deploy::artifact::render_value(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GithubSettings;
    use crate::github::RepoEntry;
    use async_trait::async_trait;
    use serde_json::json;

    struct StaticSource {
        files: Vec<(String, String)>,
    }

    #[async_trait]
    impl RepoSource for StaticSource {
        async fn list_directory(
            &self,
            locator: &RepoLocator,
        ) -> Result<Vec<RepoEntry>, PilotError> {
            Ok(self
                .files
                .iter()
                .map(|(name, _)| RepoEntry {
                    name: name.clone(),
                    path: format!("{}/{}", locator.path, name),
                    entry_type: "file".to_string(),
                    download_url: Some(format!("mock://{}", name)),
                })
                .collect())
        }

        async fn fetch_file(&self, entry: &RepoEntry) -> Result<String, PilotError> {
            self.files
                .iter()
                .find(|(name, _)| *name == entry.name)
                .map(|(_, content)| content.clone())
                .ok_or_else(|| PilotError::Fetch(format!("{} unavailable", entry.name)))
        }

        async fn download_directory(
            &self,
            _locator: &RepoLocator,
            dest: &Path,
        ) -> Result<usize, PilotError> {
            std::fs::create_dir_all(dest)?;
            for (name, content) in &self.files {
                std::fs::write(dest.join(name), content)?;
            }
            Ok(self.files.len())
        }
    }

    fn pilot_with(files: Vec<(&str, &str)>, workspace: &Path) -> Pilot {
        let config = PilotConfig {
            workspace_dir: Some(workspace.to_path_buf()),
            github: GithubSettings::default(),
            ..PilotConfig::default()
        };
        let source = Arc::new(StaticSource {
            files: files
                .into_iter()
                .map(|(n, c)| (n.to_string(), c.to_string()))
                .collect(),
        });
        Pilot::with_source(config, source).unwrap()
    }

    #[tokio::test]
    async fn test_parse_merges_all_three_sources() {
        let tmp = tempfile::tempdir().unwrap();
        let pilot = pilot_with(
            vec![
                (
                    "main.tf",
                    r#"variable "region" { type = string default = "us-west-2" }"#,
                ),
                ("terraform.tfvars", "region = \"eu-central-1\"\n"),
                (
                    "README.md",
                    "# Stack\n\n| region | Region to deploy | string | us-west-2 |\n",
                ),
            ],
            tmp.path(),
        );

        let outcome = pilot
            .parse_repository("acme/infra/main/envs/prod")
            .await
            .unwrap();

        assert_eq!(outcome.repo, "acme/infra@main:envs/prod");
        let region = outcome.variables.get("region").unwrap();
        assert_eq!(region.value, json!("eu-central-1"));
        assert_eq!(region.description, "Region to deploy");
        assert_eq!(region.sources.len(), 3);
        // Raw maps are preserved untouched
        assert_eq!(
            outcome.terraform.get("region").unwrap().value,
            json!("us-west-2")
        );
        assert!(outcome.readme_excerpt.starts_with("# Stack"));
    }

    #[tokio::test]
    async fn test_parse_without_terraform_files_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let pilot = pilot_with(vec![("README.md", "docs only")], tmp.path());
        let err = pilot
            .parse_repository("acme/infra/main/docs")
            .await
            .unwrap_err();
        assert!(matches!(err, PilotError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_parse_rejects_malformed_locator_before_fetch() {
        let tmp = tempfile::tempdir().unwrap();
        // A source that would fail loudly if consulted
        struct Unreachable;
        #[async_trait]
        impl RepoSource for Unreachable {
            async fn list_directory(
                &self,
                _l: &RepoLocator,
            ) -> Result<Vec<RepoEntry>, PilotError> {
                panic!("network must not be touched for malformed locators")
            }
            async fn fetch_file(&self, _e: &RepoEntry) -> Result<String, PilotError> {
                panic!("network must not be touched for malformed locators")
            }
            async fn download_directory(
                &self,
                _l: &RepoLocator,
                _d: &Path,
            ) -> Result<usize, PilotError> {
                panic!("network must not be touched for malformed locators")
            }
        }
        let config = PilotConfig {
            workspace_dir: Some(tmp.path().to_path_buf()),
            ..PilotConfig::default()
        };
        let pilot = Pilot::with_source(config, Arc::new(Unreachable)).unwrap();

        let err = pilot.parse_repository("acme/infra").await.unwrap_err();
        assert!(matches!(err, PilotError::MalformedLocator(_)));
    }

    #[tokio::test]
    async fn test_deployment_failure_reported_only_via_events() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = PilotConfig::default();
        config.workspace_dir = Some(tmp.path().to_path_buf());
        // A binary name that cannot exist on PATH
        config.terraform_bin = "tfpilot-test-no-such-binary".to_string();
        let source = Arc::new(StaticSource {
            files: vec![(
                "main.tf".to_string(),
                r#"variable "region" { default = "x" }"#.to_string(),
            )],
        });
        let pilot = Pilot::with_source(config, source).unwrap();

        let (tx, mut rx) = mpsc::channel(64);
        pilot
            .execute_deployment(
                DeploymentRequest {
                    repo: "acme/infra/main/prod".to_string(),
                    variables: BTreeMap::new(),
                    deployment_id: "dep-err".to_string(),
                    action: DeployAction::Apply,
                },
                tx,
            )
            .await;

        let mut terminal = None;
        while let Some(event) = rx.recv().await {
            if event.is_terminal() {
                terminal = Some(event);
            }
        }
        match terminal.expect("terminal event must arrive") {
            DeployEvent::Complete { success, .. } => assert!(!success),
            _ => unreachable!(),
        }

        // History reflects the failure
        let records = pilot.history().unwrap();
        assert_eq!(records[0].status, crate::deploy::DeploymentStatus::Failed);
    }

    #[tokio::test]
    async fn test_sensitive_values_kept_out_of_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("dep");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("main.tf"),
            r#"
variable "token" { type = string sensitive = true nullable = false }
variable "region" { type = string default = "us-west-2" }
"#,
        )
        .unwrap();

        let sensitive = sensitive_names(&dir).unwrap();
        assert!(sensitive.contains("token"));
        assert!(!sensitive.contains("region"));

        let mut values = BTreeMap::new();
        values.insert("token".to_string(), json!("s3cret"));
        values.insert("region".to_string(), json!("us-west-2"));
        let artifact = render_tfvars(&values, &sensitive);
        assert!(!artifact.contains("token"));
        assert!(artifact.contains("region"));
    }

    #[test]
    fn test_env_value_renders_complex_values() {
        assert_eq!(env_value(&json!("plain")), "plain");
        assert_eq!(env_value(&json!(true)), "true");
        assert_eq!(env_value(&json!(["a"])), "[\"a\"]");
    }
}

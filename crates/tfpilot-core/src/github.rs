//! GitHub repository listing and download
//!
//! Repositories are addressed by a 4-part locator (owner, repo, branch,
//! directory path). Listing goes through the contents API; downloads fetch
//! each file's raw content, and the git trees API supplies blob modes so
//! executable scripts come back executable. Individual file failures are
//! logged and skipped: one bad file must not abort a parse.

use crate::errors::PilotError;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = "tfpilot/0.1.0";

/// Parsed repository locator: `owner/repo/branch/path[/...]`.
///
/// The `https://github.com/owner/repo/tree/branch/path` web URL form is
/// accepted too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLocator {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub path: String,
}

impl RepoLocator {
    pub fn parse(input: &str) -> Result<Self, PilotError> {
        let trimmed = input.trim();
        let stripped = trimmed
            .strip_prefix("https://github.com/")
            .or_else(|| trimmed.strip_prefix("http://github.com/"))
            .or_else(|| trimmed.strip_prefix("github.com/"))
            .unwrap_or(trimmed);

        let mut parts: Vec<&str> = stripped.split('/').filter(|s| !s.is_empty()).collect();
        // Web URLs carry a /tree/ (or /blob/) segment between repo and branch
        if parts.len() > 2 && (parts[2] == "tree" || parts[2] == "blob") {
            parts.remove(2);
        }
        if parts.len() < 4 {
            return Err(PilotError::MalformedLocator(format!(
                "expected owner/repo/branch/path, got '{}'",
                input
            )));
        }
        Ok(Self {
            owner: parts[0].to_string(),
            repo: parts[1].to_string(),
            branch: parts[2].to_string(),
            path: parts[3..].join("/"),
        })
    }

    /// Short human-readable form for logs and history records.
    pub fn slug(&self) -> String {
        format!(
            "{}/{}@{}:{}",
            self.owner, self.repo, self.branch, self.path
        )
    }
}

/// One entry from a directory listing.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub download_url: Option<String>,
}

impl RepoEntry {
    pub fn is_file(&self) -> bool {
        self.entry_type == "file"
    }

    pub fn is_dir(&self) -> bool {
        self.entry_type == "dir"
    }
}

/// Classification of a listed file for the extraction pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Terraform,
    Tfvars,
    Readme,
    Other,
}

pub fn classify(name: &str) -> FileKind {
    let lowered = name.to_lowercase();
    if lowered.ends_with(".tf") {
        FileKind::Terraform
    } else if lowered.ends_with(".tfvars") {
        FileKind::Tfvars
    } else if lowered.starts_with("readme") || lowered.ends_with(".md") {
        FileKind::Readme
    } else {
        FileKind::Other
    }
}

/// Remote source of repository files.
///
/// The GitHub client is the production implementation; tests substitute an
/// in-memory one.
#[async_trait]
pub trait RepoSource: Send + Sync {
    async fn list_directory(&self, locator: &RepoLocator) -> Result<Vec<RepoEntry>, PilotError>;
    async fn fetch_file(&self, entry: &RepoEntry) -> Result<String, PilotError>;
    /// Materialize the locator's directory tree under `dest`, restoring the
    /// executable bit where the repository recorded one. Returns the number
    /// of files written.
    async fn download_directory(
        &self,
        locator: &RepoLocator,
        dest: &Path,
    ) -> Result<usize, PilotError>;
}

/// Classified contents of one repository directory.
#[derive(Debug, Clone, Default)]
pub struct RepoContents {
    /// `(file name, content)` pairs in remote listing order.
    pub terraform_files: Vec<(String, String)>,
    pub tfvars_file: Option<(String, String)>,
    pub readme_file: Option<(String, String)>,
}

/// List and fetch the directory's classified files.
///
/// Fetch failures for individual files are swallowed with a warning; the
/// only hard failure is a directory with no declaration files at all.
pub async fn fetch_repo_contents(
    source: &dyn RepoSource,
    locator: &RepoLocator,
) -> Result<RepoContents, PilotError> {
    let entries = source.list_directory(locator).await?;
    let mut contents = RepoContents::default();

    for entry in entries.iter().filter(|e| e.is_file()) {
        let kind = classify(&entry.name);
        if kind == FileKind::Other {
            continue;
        }
        let text = match source.fetch_file(entry).await {
            Ok(text) => text,
            Err(e) => {
                log::warn!("Skipping {}: {}", entry.path, e);
                continue;
            }
        };
        match kind {
            FileKind::Terraform => contents.terraform_files.push((entry.name.clone(), text)),
            FileKind::Tfvars => {
                // terraform.tfvars beats any other *.tfvars file
                let preferred = entry.name.eq_ignore_ascii_case("terraform.tfvars");
                if contents.tfvars_file.is_none() || preferred {
                    contents.tfvars_file = Some((entry.name.clone(), text));
                }
            }
            FileKind::Readme => {
                let preferred = entry.name.to_lowercase().starts_with("readme");
                let current_preferred = contents
                    .readme_file
                    .as_ref()
                    .map(|(name, _)| name.to_lowercase().starts_with("readme"))
                    .unwrap_or(false);
                if contents.readme_file.is_none() || (preferred && !current_preferred) {
                    contents.readme_file = Some((entry.name.clone(), text));
                }
            }
            FileKind::Other => unreachable!(),
        }
    }

    if contents.terraform_files.is_empty() {
        return Err(PilotError::NotFound(format!(
            "no Terraform files in {}",
            locator.slug()
        )));
    }
    Ok(contents)
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    mode: String,
    #[serde(rename = "type")]
    entry_type: String,
}

/// GitHub API client.
pub struct GithubClient {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(settings: &crate::config::GithubSettings) -> Result<Self, PilotError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| PilotError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
    }

    fn contents_url(&self, locator: &RepoLocator, path: &str) -> String {
        let encoded: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::encode(s).into_owned())
            .collect();
        format!(
            "{}/repos/{}/{}/contents/{}?ref={}",
            self.api_base,
            urlencoding::encode(&locator.owner),
            urlencoding::encode(&locator.repo),
            encoded.join("/"),
            urlencoding::encode(&locator.branch)
        )
    }

    async fn list_path(
        &self,
        locator: &RepoLocator,
        path: &str,
    ) -> Result<Vec<RepoEntry>, PilotError> {
        let url = self.contents_url(locator, path);
        log::debug!("Listing {}", url);
        let response = self.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PilotError::NotFound(format!(
                "{} not found on branch {}",
                path, locator.branch
            )));
        }
        if !response.status().is_success() {
            return Err(PilotError::Fetch(format!(
                "GitHub returned HTTP {} for {}",
                response.status(),
                url
            )));
        }
        let entries: Vec<RepoEntry> = response.json().await?;
        Ok(entries)
    }

    /// Blob modes for the branch, used to restore executable bits.
    async fn fetch_modes(&self, locator: &RepoLocator) -> Result<Vec<TreeEntry>, PilotError> {
        let url = format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            self.api_base,
            urlencoding::encode(&locator.owner),
            urlencoding::encode(&locator.repo),
            urlencoding::encode(&locator.branch)
        );
        let response = self.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(PilotError::Fetch(format!(
                "GitHub returned HTTP {} for {}",
                response.status(),
                url
            )));
        }
        let tree: TreeResponse = response.json().await?;
        Ok(tree.tree)
    }
}

#[async_trait]
impl RepoSource for GithubClient {
    async fn list_directory(&self, locator: &RepoLocator) -> Result<Vec<RepoEntry>, PilotError> {
        self.list_path(locator, &locator.path).await
    }

    async fn fetch_file(&self, entry: &RepoEntry) -> Result<String, PilotError> {
        let url = entry.download_url.as_ref().ok_or_else(|| {
            PilotError::Fetch(format!("{} has no download URL", entry.path))
        })?;
        let response = self.get(url).send().await?;
        if !response.status().is_success() {
            return Err(PilotError::Fetch(format!(
                "GitHub returned HTTP {} for {}",
                response.status(),
                url
            )));
        }
        Ok(response.text().await?)
    }

    async fn download_directory(
        &self,
        locator: &RepoLocator,
        dest: &Path,
    ) -> Result<usize, PilotError> {
        std::fs::create_dir_all(dest)?;
        let mut written = 0;
        let mut pending = vec![locator.path.clone()];

        while let Some(dir) = pending.pop() {
            for entry in self.list_path(locator, &dir).await? {
                if entry.is_dir() {
                    pending.push(entry.path.clone());
                    continue;
                }
                if !entry.is_file() {
                    continue;
                }
                let relative = entry
                    .path
                    .strip_prefix(&locator.path)
                    .unwrap_or(&entry.path)
                    .trim_start_matches('/');
                let target = dest.join(relative);
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                match self.fetch_file(&entry).await {
                    Ok(text) => {
                        std::fs::write(&target, text)?;
                        written += 1;
                    }
                    Err(e) => {
                        log::warn!("Skipping {}: {}", entry.path, e);
                    }
                }
            }
        }

        // Restore executable bits from the recorded blob modes. Failure here
        // degrades to plain files rather than failing the download.
        #[cfg(unix)]
        match self.fetch_modes(locator).await {
            Ok(modes) => {
                use std::os::unix::fs::PermissionsExt;
                for entry in modes
                    .iter()
                    .filter(|e| e.entry_type == "blob" && e.mode == "100755")
                {
                    let relative = entry
                        .path
                        .strip_prefix(&locator.path)
                        .unwrap_or(&entry.path)
                        .trim_start_matches('/');
                    let target = dest.join(relative);
                    if target.is_file() {
                        let perms = std::fs::Permissions::from_mode(0o755);
                        if let Err(e) = std::fs::set_permissions(&target, perms) {
                            log::warn!("Could not mark {} executable: {}", target.display(), e);
                        }
                    }
                }
            }
            Err(e) => log::warn!("Could not fetch blob modes: {}", e),
        }

        Ok(written)
    }
}

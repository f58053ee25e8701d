//! Core library for the tfpilot deployment service.
//!
//! tfpilot points at a directory of Terraform configuration inside a GitHub
//! repository, discovers its input variables, and drives the `terraform`
//! binary to apply them. This crate holds everything below the HTTP surface:
//!
//! - **Variable engine**: declaration-block, defaults-file and documentation
//!   extractors plus the reconciliation merge with provenance tracking
//! - **Repository access**: locator parsing, GitHub listing and download
//! - **Deploy driver**: artifact rendering, the child-process runner, and
//!   on-disk deployment history
//! - **Configuration**: YAML-loadable service settings with an explicit
//!   credential-forwarding allowlist

pub mod config;
pub mod deploy;
pub mod errors;
pub mod events;
pub mod github;
pub mod pilot;
pub mod variables;

pub use config::PilotConfig;
pub use errors::PilotError;
pub use events::DeployEvent;
pub use github::{GithubClient, RepoLocator, RepoSource};
pub use pilot::{DeploymentRequest, ParseOutcome, Pilot};
pub use variables::{VariableRecord, VariableSource};

//! Product configuration trait for CLI binaries
//!
//! This trait defines what a binary must supply to drive the template registry:
//! its identity, where its config lives, which env vars override remote endpoints,
//! and the template source used when none is configured.

use crate::templates::RepoSource;
use std::path::Path;

/// Configuration trait for CLI products built on the registry
pub trait ProductConfig: Clone + Send + Sync + 'static {
    /// Internal product name (used for the CLI command)
    fn name(&self) -> &'static str;

    /// Human-readable display name
    fn display_name(&self) -> &'static str;

    /// Directory under the home directory holding config and caches, e.g. `.cre`
    fn config_dir_name(&self) -> &'static str;

    /// Environment variable overriding the config directory
    fn config_dir_env(&self) -> &'static str;

    /// Environment variable holding a bearer token for the template host
    fn token_env(&self) -> &'static str {
        "GITHUB_TOKEN"
    }

    /// Environment variable overriding the template host API base URL
    fn api_url_env(&self) -> &'static str;

    /// Environment variable overriding the raw-content base URL
    fn raw_url_env(&self) -> &'static str;

    /// Source used when the user has configured none
    fn default_source(&self) -> RepoSource;

    /// URL for product documentation
    fn docs_url(&self) -> &'static str;

    /// Instructions shown after a project is created
    fn next_steps(&self, project_dir: &Path, workflow_name: &str) -> Vec<String>;

    /// User agent string for HTTP requests
    fn user_agent(&self) -> &'static str {
        self.name()
    }
}

//! User-scoped template source configuration and path resolution
//!
//! The source list lives at `<config>/template.yaml`; caches live under
//! `<config>/template-cache`. The config directory is resolved from an explicit
//! flag, then the product's env var, then `~/<config_dir_name>`.

use crate::error::{RegistryError, Result};
use crate::fsutil;
use crate::product::ProductConfig;
use crate::templates::{Cache, RepoSource};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Source list file name inside the config directory
pub const CONFIG_FILE_NAME: &str = "template.yaml";

/// Cache directory name inside the config directory
pub const CACHE_DIR_NAME: &str = "template-cache";

/// Resolved on-disk locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl Paths {
    /// Locations rooted at `config_dir`
    pub fn from_config_dir(config_dir: impl Into<PathBuf>) -> Self {
        let config_dir = config_dir.into();
        Self {
            cache_dir: config_dir.join(CACHE_DIR_NAME),
            config_dir,
        }
    }

    /// Resolve from an explicit directory, then the product env var, then the home directory
    pub fn resolve<C: ProductConfig>(config: &C, explicit: Option<PathBuf>) -> Result<Self> {
        Self::resolve_with(
            explicit,
            std::env::var_os(config.config_dir_env()).map(PathBuf::from),
            dirs::home_dir(),
            config.config_dir_name(),
        )
    }

    fn resolve_with(
        explicit: Option<PathBuf>,
        from_env: Option<PathBuf>,
        home: Option<PathBuf>,
        dir_name: &str,
    ) -> Result<Self> {
        if let Some(dir) = explicit {
            return Ok(Self::from_config_dir(dir));
        }
        if let Some(dir) = from_env.filter(|d| !d.as_os_str().is_empty()) {
            return Ok(Self::from_config_dir(dir));
        }
        let home = home.ok_or_else(|| RegistryError::Config {
            path: PathBuf::from("~"),
            message: "cannot determine home directory".to_string(),
        })?;
        Ok(Self::from_config_dir(home.join(dir_name)))
    }

    pub fn source_config(&self) -> SourceConfig {
        SourceConfig::new(&self.config_dir)
    }

    pub fn cache(&self) -> Cache {
        Cache::new(&self.cache_dir)
    }
}

/// On-disk shape of `template.yaml`
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourceFile {
    #[serde(default)]
    template_repositories: Vec<RepoSource>,
}

/// The persisted, ordered list of template sources
#[derive(Debug, Clone)]
pub struct SourceConfig {
    path: PathBuf,
}

impl SourceConfig {
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self {
            path: config_dir.as_ref().join(CONFIG_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Configured sources in file order. Missing or unreadable files yield an empty list.
    pub fn load(&self) -> Vec<RepoSource> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                debug!("No template config at {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        match serde_yaml::from_str::<SourceFile>(&content) {
            Ok(file) => file
                .template_repositories
                .into_iter()
                .filter(|source| match source.validate() {
                    Ok(()) => true,
                    Err(e) => {
                        debug!("Dropping template source from {}: {}", self.path.display(), e);
                        false
                    }
                })
                .collect(),
            Err(e) => {
                debug!(
                    "Ignoring malformed template config {}: {}",
                    self.path.display(),
                    e
                );
                Vec::new()
            }
        }
    }

    /// Configured sources, or just `default` when none are configured
    pub fn load_or_default(&self, default: &RepoSource) -> Vec<RepoSource> {
        let sources = self.load();
        if sources.is_empty() {
            vec![default.clone()]
        } else {
            sources
        }
    }

    /// Replace the file contents atomically
    pub fn save(&self, sources: &[RepoSource]) -> Result<()> {
        let file = SourceFile {
            template_repositories: sources.to_vec(),
        };
        let data = serde_yaml::to_string(&file).map_err(|e| RegistryError::Config {
            path: self.path.clone(),
            message: e.to_string(),
        })?;

        fsutil::write_atomic(&self.path, data.as_bytes()).map_err(|e| RegistryError::Config {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        debug!("Saved {} template sources to {}", sources.len(), self.path.display());
        Ok(())
    }

    /// Write a config holding only `default` if no config file exists yet
    pub fn ensure_default(&self, default: &RepoSource) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        debug!("Creating default template config at {}", self.path.display());
        self.save(std::slice::from_ref(default))
    }
}

/// Outcome of [`add_sources`] or [`remove_sources`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceChange {
    /// Sources actually added or removed
    pub changed: Vec<RepoSource>,
    /// Requested sources that were already present (add) or absent (remove)
    pub skipped: Vec<RepoSource>,
    /// The source list after the change
    pub current: Vec<RepoSource>,
}

/// Append sources not already configured, keyed on owner and repo
pub fn add_sources(
    store: &SourceConfig,
    cache: &Cache,
    default: &RepoSource,
    new: &[RepoSource],
) -> Result<SourceChange> {
    store.ensure_default(default)?;
    let mut current = store.load();
    let mut change = SourceChange::default();

    for source in new {
        if current.contains(source) {
            warn!("Repository {} is already configured, skipping", source.slug());
            change.skipped.push(source.clone());
            continue;
        }
        current.push(source.clone());
        change.changed.push(source.clone());
    }

    if !change.changed.is_empty() {
        store.save(&current)?;
        invalidate(cache, &change.changed);
    }
    change.current = current;
    Ok(change)
}

/// Drop configured sources matching owner and repo; the ref is ignored
pub fn remove_sources(
    store: &SourceConfig,
    cache: &Cache,
    default: &RepoSource,
    targets: &[RepoSource],
) -> Result<SourceChange> {
    store.ensure_default(default)?;
    let mut current = store.load();
    let mut change = SourceChange::default();

    for target in targets {
        match current.iter().position(|s| s == target) {
            Some(idx) => change.changed.push(current.remove(idx)),
            None => {
                warn!("Repository {} is not configured, skipping", target.slug());
                change.skipped.push(target.clone());
            }
        }
    }

    if !change.changed.is_empty() {
        store.save(&current)?;
        invalidate(cache, &change.changed);
    }
    change.current = current;
    Ok(change)
}

fn invalidate(cache: &Cache, sources: &[RepoSource]) {
    for source in sources {
        if let Err(e) = cache.invalidate_list(source) {
            warn!("Failed to invalidate cache for {}: {}", source, e);
        }
    }
}

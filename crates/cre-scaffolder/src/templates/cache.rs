//! On-disk cache for discovered template lists and downloaded tarballs
//!
//! Layout under the cache root:
//!
//! ```text
//! {owner}-{repo}-{ref}-templates.json
//! tarballs/{owner}-{repo}-{sha}.tar.gz
//! ```
//!
//! Writes go through temp file + rename, so concurrent readers never see a torn record.

use super::metadata::{RepoSource, TemplateSummary};
use crate::error::{RegistryError, Result};
use crate::fsutil;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// How long a discovered template list is considered fresh
pub const TEMPLATE_LIST_TTL: Duration = Duration::from_secs(60 * 60);

/// How long a downloaded tarball is reused
pub const TARBALL_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const TARBALL_DIR: &str = "tarballs";

/// Serialized per-source record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateListCache {
    pub templates: Vec<TemplateSummary>,
    pub tree_sha: String,
    pub last_check: DateTime<Utc>,
}

/// Result of a list lookup: whatever was cached plus whether it is still fresh
#[derive(Debug, Clone, Default)]
pub struct CachedList {
    pub templates: Vec<TemplateSummary>,
    pub fresh: bool,
}

/// Template list and tarball cache rooted at a directory
#[derive(Debug, Clone)]
pub struct Cache {
    dir: PathBuf,
}

impl Cache {
    /// Use `dir` as the cache root. Nothing is created until the first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the template list record for a source
    pub fn list_path(&self, source: &RepoSource) -> PathBuf {
        self.dir.join(format!(
            "{}-{}-{}-templates.json",
            sanitize_component(&source.owner),
            sanitize_component(&source.repo),
            sanitize_component(&source.git_ref)
        ))
    }

    /// Deterministic tarball location for a source at a tree revision
    pub fn tarball_path(&self, source: &RepoSource, sha: &str) -> PathBuf {
        self.dir.join(TARBALL_DIR).join(format!(
            "{}-{}-{}.tar.gz",
            sanitize_component(&source.owner),
            sanitize_component(&source.repo),
            sanitize_component(sha)
        ))
    }

    /// Load the cached list, reporting whether it is within [`TEMPLATE_LIST_TTL`].
    ///
    /// Missing or corrupt records come back empty and not fresh.
    pub fn load_list(&self, source: &RepoSource) -> CachedList {
        self.load_list_at(source, Utc::now())
    }

    pub(crate) fn load_list_at(&self, source: &RepoSource, now: DateTime<Utc>) -> CachedList {
        let Some(record) = self.read_record_logged(source) else {
            return CachedList::default();
        };

        let age = now.signed_duration_since(record.last_check);
        let fresh = age <= ttl_delta(TEMPLATE_LIST_TTL);
        if fresh {
            debug!(
                "Using cached template list for {} ({} templates)",
                source,
                record.templates.len()
            );
        } else {
            debug!("Template list cache expired for {}", source);
        }

        CachedList {
            templates: record.templates,
            fresh,
        }
    }

    /// Load the cached list regardless of age, for offline fallback
    pub fn load_stale(&self, source: &RepoSource) -> Vec<TemplateSummary> {
        self.read_record_logged(source)
            .map(|record| record.templates)
            .unwrap_or_default()
    }

    /// Tree revision recorded with the cached list, if any
    pub fn tree_sha(&self, source: &RepoSource) -> Option<String> {
        self.read_record_logged(source)
            .map(|record| record.tree_sha)
            .filter(|sha| !sha.is_empty())
    }

    pub fn save_list(
        &self,
        source: &RepoSource,
        templates: &[TemplateSummary],
        tree_sha: &str,
    ) -> Result<()> {
        self.save_list_at(source, templates, tree_sha, Utc::now())
    }

    pub(crate) fn save_list_at(
        &self,
        source: &RepoSource,
        templates: &[TemplateSummary],
        tree_sha: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let record = TemplateListCache {
            templates: templates.to_vec(),
            tree_sha: tree_sha.to_string(),
            last_check: now,
        };
        let data = serde_json::to_vec(&record).map_err(|e| {
            RegistryError::io("failed to serialize template list cache", e.into())
        })?;

        let path = self.list_path(source);
        fsutil::write_atomic(&path, &data).map_err(|e| {
            RegistryError::io(format!("failed to write cache {}", path.display()), e)
        })?;

        debug!("Saved template list cache for {}", source);
        Ok(())
    }

    /// True when the tarball exists and was written within [`TARBALL_TTL`]
    pub fn is_tarball_cached(&self, source: &RepoSource, sha: &str) -> bool {
        let path = self.tarball_path(source, sha);
        let Ok(modified) = std::fs::metadata(&path).and_then(|m| m.modified()) else {
            return false;
        };
        match SystemTime::now().duration_since(modified) {
            Ok(age) => age < TARBALL_TTL,
            // Modified in the future (clock skew): treat as just written
            Err(_) => true,
        }
    }

    /// Drop the template list record so the next list goes to the remote
    pub fn invalidate_list(&self, source: &RepoSource) -> Result<()> {
        let path = self.list_path(source);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!("Invalidated template list cache for {}", source);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RegistryError::io(
                format!("failed to invalidate cache {}", path.display()),
                e,
            )),
        }
    }

    /// Read and decode the record for a source. `Ok(None)` on a plain miss.
    pub fn read_record(&self, source: &RepoSource) -> Result<Option<TemplateListCache>> {
        let path = self.list_path(source);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(RegistryError::CacheCorrupt {
                    path,
                    reason: e.to_string(),
                })
            }
        };
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| RegistryError::CacheCorrupt {
                path,
                reason: e.to_string(),
            })
    }

    fn read_record_logged(&self, source: &RepoSource) -> Option<TemplateListCache> {
        match self.read_record(source) {
            Ok(Some(record)) => Some(record),
            Ok(None) => {
                debug!("No template list cache for {}", source);
                None
            }
            Err(e) => {
                debug!("Ignoring cache for {}: {}", source, e);
                None
            }
        }
    }
}

fn ttl_delta(ttl: Duration) -> TimeDelta {
    TimeDelta::from_std(ttl).unwrap_or_else(|e| {
        warn!("Cache TTL out of range: {}", e);
        TimeDelta::zero()
    })
}

/// Owners, repos and refs like `feature/x` must not introduce subdirectories into cache file names
fn sanitize_component(value: &str) -> String {
    value.replace(['/', '\\'], "_")
}

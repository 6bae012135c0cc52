//! Template discovery and download from a Git hosting API
//!
//! Discovery lists the repository tree once, picks out every `.cre/template.yaml`
//! blob, and fetches each metadata document through the raw-content host. Downloads
//! fetch the gzipped tarball of the whole repository at the configured ref.

use super::metadata::{RepoSource, TemplateMetadata, TemplateSummary};
use crate::cancel::CancellationToken;
use crate::error::{RegistryError, Result};
use crate::fsutil;
use crate::product::ProductConfig;
use futures_util::TryStreamExt;
use serde::Deserialize;
use std::future::Future;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;
use tokio_util::io::{StreamReader, SyncIoBridge};
use tracing::{debug, warn};
use url::Url;

/// Connect and request timeout for API and raw-content calls
pub const API_TIMEOUT: Duration = Duration::from_secs(6);

/// Whole-transfer timeout for tarball downloads
pub const TARBALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Conventional location of a template's metadata, relative to the template root
pub const METADATA_FILE: &str = ".cre/template.yaml";

pub const DEFAULT_API_URL: &str = "https://api.github.com/";
pub const DEFAULT_RAW_URL: &str = "https://raw.githubusercontent.com/";

/// Reader over a tarball that is not cached. Reads may block on the network.
pub type TarballReader = Box<dyn Read + Send>;

/// Git tree listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TreeResponse {
    pub sha: String,
    #[serde(default)]
    pub tree: Vec<TreeEntry>,
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

impl TreeEntry {
    pub fn blob(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Blob,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Blob,
    Tree,
    /// Submodule commits and anything newer the API may report
    #[serde(other)]
    Other,
}

/// Templates found in one source, with the tree revision they were read at
#[derive(Debug, Clone)]
pub struct Discovery {
    pub templates: Vec<TemplateSummary>,
    pub tree_sha: String,
}

/// Remote operations the registry needs from a template host
pub trait TemplateRemote: Send + Sync {
    /// Recursive tree listing of `source` at its ref
    fn tree(&self, source: &RepoSource) -> impl Future<Output = Result<TreeResponse>> + Send;

    /// Fetch and parse the metadata document at `path`
    fn metadata(
        &self,
        source: &RepoSource,
        path: &str,
    ) -> impl Future<Output = Result<TemplateMetadata>> + Send;

    /// Download the repository tarball into `dest`, replacing it atomically
    fn download_tarball(
        &self,
        source: &RepoSource,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Stream the repository tarball without touching the cache.
    ///
    /// The reader blocks while waiting for data, so consume it off the async runtime.
    fn stream_tarball(
        &self,
        source: &RepoSource,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<TarballReader>> + Send;
}

/// True for `.cre/template.yaml` at the repo root or directly under a template directory
pub fn is_metadata_path(path: &str) -> bool {
    path == METADATA_FILE
        || path
            .strip_suffix(METADATA_FILE)
            .is_some_and(|prefix| prefix.ends_with('/'))
}

/// Template root for a metadata path: its grandparent directory, empty at repo root
pub fn template_root(metadata_path: &str) -> String {
    metadata_path
        .strip_suffix(METADATA_FILE)
        .unwrap_or(metadata_path)
        .trim_end_matches('/')
        .to_string()
}

/// Discover every template in `source`.
///
/// A template whose metadata cannot be fetched or parsed is skipped with a warning;
/// only a failed tree listing fails the whole source.
pub async fn discover<R: TemplateRemote>(remote: &R, source: &RepoSource) -> Result<Discovery> {
    debug!("Discovering templates from {}", source);

    let tree = remote.tree(source).await?;
    if tree.truncated {
        warn!(
            "Tree listing for {} was truncated; some templates may be missing",
            source
        );
    }

    let metadata_paths: Vec<&str> = tree
        .tree
        .iter()
        .filter(|entry| entry.kind == EntryKind::Blob && is_metadata_path(&entry.path))
        .map(|entry| entry.path.as_str())
        .collect();

    debug!(
        "Found {} template.yaml files in {}",
        metadata_paths.len(),
        source
    );

    let mut templates = Vec::with_capacity(metadata_paths.len());
    for path in metadata_paths {
        let metadata = match remote.metadata(source, path).await {
            Ok(metadata) => metadata,
            Err(RegistryError::Cancelled) => return Err(RegistryError::Cancelled),
            Err(e) => {
                warn!("Skipping template at {}: {}", path, e);
                continue;
            }
        };

        templates.push(TemplateSummary {
            metadata,
            path: template_root(path),
            source: source.clone(),
            built_in: false,
        });
    }

    Ok(Discovery {
        templates,
        tree_sha: tree.sha,
    })
}

/// GitHub-compatible template host client
#[derive(Debug, Clone)]
pub struct GitHubFetcher {
    client: reqwest::Client,
    api_base: Url,
    raw_base: Url,
    token: Option<String>,
    cancel: CancellationToken,
    api_timeout: Duration,
    tarball_timeout: Duration,
}

impl GitHubFetcher {
    /// Create a client against the public GitHub endpoints
    pub fn new(user_agent: &str, token: Option<String>) -> Result<Self> {
        let api_base = parse_base_url(DEFAULT_API_URL, "default API URL")?;
        let raw_base = parse_base_url(DEFAULT_RAW_URL, "default raw content URL")?;
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(API_TIMEOUT)
            .build()
            .map_err(RegistryError::HttpClient)?;
        Ok(Self {
            client,
            api_base,
            raw_base,
            token: token.filter(|t| !t.is_empty()),
            cancel: CancellationToken::new(),
            api_timeout: API_TIMEOUT,
            tarball_timeout: TARBALL_TIMEOUT,
        })
    }

    /// Create a client from a product config, honoring its URL and token env overrides
    pub fn from_config<C: ProductConfig>(config: &C) -> Result<Self> {
        let token = std::env::var(config.token_env()).ok();
        let mut fetcher = Self::new(config.user_agent(), token)?;

        if let Ok(api) = std::env::var(config.api_url_env()) {
            fetcher.api_base = parse_base_url(&api, config.api_url_env())?;
        }
        if let Ok(raw) = std::env::var(config.raw_url_env()) {
            fetcher.raw_base = parse_base_url(&raw, config.raw_url_env())?;
        }
        Ok(fetcher)
    }

    /// Point the client at other API and raw-content hosts
    pub fn with_base_urls(mut self, api_base: Url, raw_base: Url) -> Self {
        self.api_base = api_base;
        self.raw_base = raw_base;
        self
    }

    /// Abort metadata fetches when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Override the per-request timeouts for API and tarball calls
    pub fn with_timeouts(mut self, api_timeout: Duration, tarball_timeout: Duration) -> Self {
        self.api_timeout = api_timeout;
        self.tarball_timeout = tarball_timeout;
        self
    }

    /// Build a URL by appending path segments, preserving query parameters
    fn build_url<'a>(base: &Url, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| RegistryError::Config {
                path: base.as_str().into(),
                message: "URL cannot have path segments".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub(crate) fn tree_url(&self, source: &RepoSource) -> Result<Url> {
        let mut url = Self::build_url(
            &self.api_base,
            ["repos", source.owner.as_str(), source.repo.as_str(), "git", "trees"]
                .into_iter()
                .chain(source.git_ref.split('/')),
        )?;
        url.query_pairs_mut().append_pair("recursive", "1");
        Ok(url)
    }

    pub(crate) fn raw_url(&self, source: &RepoSource, path: &str) -> Result<Url> {
        Self::build_url(
            &self.raw_base,
            [source.owner.as_str(), source.repo.as_str()]
                .into_iter()
                .chain(source.git_ref.split('/'))
                .chain(path.split('/')),
        )
    }

    pub(crate) fn tarball_url(&self, source: &RepoSource) -> Result<Url> {
        Self::build_url(
            &self.api_base,
            ["repos", source.owner.as_str(), source.repo.as_str(), "tarball"]
                .into_iter()
                .chain(source.git_ref.split('/')),
        )
    }

    fn api_request(&self, url: Url) -> reqwest::RequestBuilder {
        let request = self
            .client
            .get(url)
            .timeout(self.api_timeout)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a tarball request and check its status
    async fn tarball_response(
        &self,
        source: &RepoSource,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response> {
        let url = self.tarball_url(source)?;
        debug!("Downloading tarball from {}", url);

        let response = cancel
            .run(self.api_request(url).timeout(self.tarball_timeout).send())
            .await?
            .map_err(|e| RegistryError::remote(source, format!("failed to download tarball: {e}")))?;

        if !response.status().is_success() {
            return Err(RegistryError::remote(
                source,
                format!("tarball download failed with status {}", response.status()),
            ));
        }
        Ok(response)
    }
}

impl TemplateRemote for GitHubFetcher {
    async fn tree(&self, source: &RepoSource) -> Result<TreeResponse> {
        let url = self.tree_url(source)?;
        let response = self
            .cancel
            .run(self.api_request(url).send())
            .await?
            .map_err(|e| RegistryError::remote(source, format!("failed to fetch repo tree: {e}")))?;

        if !response.status().is_success() {
            return Err(RegistryError::remote(
                source,
                format!("GitHub API returned status {}", response.status()),
            ));
        }

        self.cancel
            .run(response.json::<TreeResponse>())
            .await?
            .map_err(|e| RegistryError::remote(source, format!("failed to decode tree response: {e}")))
    }

    async fn metadata(&self, source: &RepoSource, path: &str) -> Result<TemplateMetadata> {
        let url = self.raw_url(source, path)?;
        let response = self
            .cancel
            .run(self.client.get(url).timeout(self.api_timeout).send())
            .await?
            .map_err(|e| RegistryError::remote(source, format!("failed to fetch {path}: {e}")))?;

        if !response.status().is_success() {
            return Err(RegistryError::remote(
                source,
                format!(
                    "raw content fetch returned status {} for {}",
                    response.status(),
                    path
                ),
            ));
        }

        let body = self
            .cancel
            .run(response.text())
            .await?
            .map_err(|e| RegistryError::remote(source, format!("failed to read {path}: {e}")))?;

        TemplateMetadata::from_yaml(&body, path)
    }

    async fn download_tarball(
        &self,
        source: &RepoSource,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut response = self.tarball_response(source, cancel).await?;

        // Dropping the temp file on any early return deletes the partial download
        let mut tmp = fsutil::temp_file_beside(dest).map_err(|e| {
            RegistryError::io(format!("failed to create tarball file for {}", dest.display()), e)
        })?;

        while let Some(chunk) = cancel
            .run(response.chunk())
            .await?
            .map_err(|e| RegistryError::remote(source, format!("failed to read tarball: {e}")))?
        {
            tmp.write_all(&chunk)
                .map_err(|e| RegistryError::io("failed to write tarball", e))?;
        }

        tmp.as_file()
            .sync_all()
            .map_err(|e| RegistryError::io("failed to sync tarball", e))?;
        tmp.persist(dest).map_err(|e| {
            RegistryError::io(format!("failed to store tarball {}", dest.display()), e.error)
        })?;

        debug!("Cached tarball for {} at {}", source, dest.display());
        Ok(())
    }

    async fn stream_tarball(
        &self,
        source: &RepoSource,
        cancel: &CancellationToken,
    ) -> Result<TarballReader> {
        let response = self.tarball_response(source, cancel).await?;
        let body = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::new(SyncIoBridge::new(StreamReader::new(Box::pin(body)))))
    }
}

fn parse_base_url(value: &str, env_name: &str) -> Result<Url> {
    let with_slash = if value.ends_with('/') {
        value.to_string()
    } else {
        format!("{value}/")
    };
    Url::parse(&with_slash).map_err(|e| RegistryError::Config {
        path: env_name.into(),
        message: format!("invalid URL {value:?}: {e}"),
    })
}

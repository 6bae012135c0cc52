//! Template catalog across built-ins and remote sources, and end-to-end scaffolding

use super::builtin::{builtin_templates, scaffold_builtin};
use super::cache::Cache;
use super::extractor;
use super::fetcher::{discover, GitHubFetcher, TarballReader, TemplateRemote};
use super::metadata::{RepoSource, TemplateSummary};
use super::workflow_dir::{place_workflow_dir, validate_workflow_name};
use crate::cancel::CancellationToken;
use crate::config::Paths;
use crate::error::{RegistryError, Result};
use crate::fsutil;
use crate::product::ProductConfig;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Cache key used for a tarball when no tree revision is known
pub const LATEST_SHA: &str = "latest";

/// Name prefix of the scratch directory a template is materialized into
const STAGING_PREFIX: &str = ".cre-staging-";

/// Lists, looks up and materializes templates.
///
/// Operations are meant to be called one after another; nothing here runs in parallel.
pub struct Registry<R: TemplateRemote = GitHubFetcher> {
    remote: R,
    cache: Cache,
    sources: Vec<RepoSource>,
    cancel: CancellationToken,
}

impl Registry<GitHubFetcher> {
    /// Registry backed by the GitHub client, with the cache under `paths`
    pub fn from_config<C: ProductConfig>(
        config: &C,
        paths: &Paths,
        sources: Vec<RepoSource>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let remote = GitHubFetcher::from_config(config)?.with_cancellation(cancel.clone());
        Ok(Self::new(remote, Cache::new(&paths.cache_dir), sources).with_cancellation(cancel))
    }
}

impl<R: TemplateRemote> Registry<R> {
    pub fn new(remote: R, cache: Cache, sources: Vec<RepoSource>) -> Self {
        Self {
            remote,
            cache,
            sources,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn sources(&self) -> &[RepoSource] {
        &self.sources
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Built-ins first, then each source's templates in configured order.
    ///
    /// A failing source is logged and skipped. With `refresh` the list cache is bypassed.
    pub async fn list(&self, refresh: bool) -> Result<Vec<TemplateSummary>> {
        let mut all = builtin_templates();

        for source in &self.sources {
            match self.list_from_source(source, refresh).await {
                Ok(templates) => all.extend(templates),
                Err(RegistryError::Cancelled) => return Err(RegistryError::Cancelled),
                Err(e) => warn!("Failed to list templates from {}: {}", source, e),
            }
        }

        if all.is_empty() {
            return Err(RegistryError::NoTemplatesAvailable);
        }
        Ok(all)
    }

    /// Templates from one source: fresh cache, then the remote, then stale cache
    pub async fn list_from_source(
        &self,
        source: &RepoSource,
        refresh: bool,
    ) -> Result<Vec<TemplateSummary>> {
        if !refresh {
            let cached = self.cache.load_list(source);
            if cached.fresh {
                return Ok(cached.templates);
            }
        }

        let discovered = self
            .cancel
            .run(discover(&self.remote, source))
            .await
            .and_then(|result| result);

        match discovered {
            Ok(discovery) => {
                if let Err(e) =
                    self.cache
                        .save_list(source, &discovery.templates, &discovery.tree_sha)
                {
                    warn!("Failed to save template list cache for {}: {}", source, e);
                }
                Ok(discovery.templates)
            }
            Err(RegistryError::Cancelled) => Err(RegistryError::Cancelled),
            Err(e) => {
                let stale = self.cache.load_stale(source);
                if stale.is_empty() {
                    return Err(e);
                }
                warn!(
                    "Using stale cached template list for {} (network unavailable): {}",
                    source, e
                );
                Ok(stale)
            }
        }
    }

    /// First template in [`Registry::list`] order named `name`
    pub async fn get(&self, name: &str, refresh: bool) -> Result<TemplateSummary> {
        self.list(refresh)
            .await?
            .into_iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| RegistryError::TemplateNotFound {
                name: name.to_string(),
            })
    }

    /// Materialize `template` into `dest_dir` and name its workflow directory `workflow_name`.
    ///
    /// The template is laid out in a staging directory first and then merged into
    /// `dest_dir`, so entries already there are never renamed or moved. Template
    /// files replace existing files with the same path.
    ///
    /// `progress` is called once per visible phase with a short status message.
    pub async fn scaffold(
        &self,
        template: &TemplateSummary,
        dest_dir: &Path,
        workflow_name: &str,
        progress: &dyn Fn(&str),
    ) -> Result<()> {
        validate_workflow_name(workflow_name)?;
        self.cancel.check()?;

        fsutil::create_dir_all_0755(dest_dir).map_err(|e| {
            RegistryError::io(format!("failed to create {}", dest_dir.display()), e)
        })?;
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(dest_dir)
            .map_err(|e| {
                RegistryError::io(
                    format!("failed to create staging directory in {}", dest_dir.display()),
                    e,
                )
            })?;

        self.materialize(template, staging.path(), workflow_name, progress)
            .await?;
        place_workflow_dir(staging.path(), workflow_name)?;

        fsutil::merge_dir(staging.path(), dest_dir).map_err(|e| {
            RegistryError::io(
                format!("failed to move template files into {}", dest_dir.display()),
                e,
            )
        })?;
        debug!("Scaffolded {} into {}", template.name(), dest_dir.display());
        Ok(())
    }

    /// Write the template's files into the empty directory `dest_dir`
    async fn materialize(
        &self,
        template: &TemplateSummary,
        dest_dir: &Path,
        workflow_name: &str,
        progress: &dyn Fn(&str),
    ) -> Result<()> {
        if template.built_in {
            progress("Copying template files...");
            let written = scaffold_builtin(template.name(), dest_dir, workflow_name)?;
            debug!("Wrote {} built-in files", written);
            return Ok(());
        }

        let source = &template.source;
        progress("Downloading template...");

        let tree_sha = self.cache.tree_sha(source);
        if let Some(sha) = tree_sha.as_deref() {
            if self.cache.is_tarball_cached(source, sha) {
                debug!("Using cached tarball for {} at {}", source, sha);
                match self
                    .extract_cached(self.cache.tarball_path(source, sha), template, dest_dir)
                    .await
                {
                    Ok(written) => {
                        debug!("Extracted {} files from cached tarball", written);
                        return Ok(());
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => warn!(
                        "Failed to extract from cached tarball, re-downloading: {}",
                        e
                    ),
                }
            }
        }

        let sha = tree_sha.as_deref().unwrap_or(LATEST_SHA);
        let tarball = self.cache.tarball_path(source, sha);

        let written = match self
            .remote
            .download_tarball(source, &tarball, &self.cancel)
            .await
        {
            Ok(()) => {
                progress("Extracting template files...");
                self.extract_cached(tarball, template, dest_dir).await?
            }
            Err(RegistryError::Cancelled) => return Err(RegistryError::Cancelled),
            Err(e) => {
                debug!("Falling back to streaming download: {}", e);
                let reader = self.remote.stream_tarball(source, &self.cancel).await?;
                progress("Extracting template files...");
                self.extract_stream(reader, template, dest_dir).await?
            }
        };
        debug!("Extracted {} files for {}", written, template.name());
        Ok(())
    }

    async fn extract_cached(
        &self,
        tarball: PathBuf,
        template: &TemplateSummary,
        dest_dir: &Path,
    ) -> Result<usize> {
        let job = ExtractJob::new(template, dest_dir, &self.cancel);
        run_blocking(move || job.run_file(&tarball)).await
    }

    async fn extract_stream(
        &self,
        reader: TarballReader,
        template: &TemplateSummary,
        dest_dir: &Path,
    ) -> Result<usize> {
        let job = ExtractJob::new(template, dest_dir, &self.cancel);
        run_blocking(move || job.run_reader(reader)).await
    }
}

/// Owned extraction arguments, so the work can move to a blocking thread
struct ExtractJob {
    template_path: String,
    exclude: Vec<String>,
    dest_dir: PathBuf,
    cancel: CancellationToken,
}

impl ExtractJob {
    fn new(template: &TemplateSummary, dest_dir: &Path, cancel: &CancellationToken) -> Self {
        Self {
            template_path: template.path.clone(),
            exclude: template.metadata.exclude.clone(),
            dest_dir: dest_dir.to_path_buf(),
            cancel: cancel.clone(),
        }
    }

    fn run_file(&self, tarball: &Path) -> Result<usize> {
        extractor::extract_file(
            tarball,
            &self.template_path,
            &self.dest_dir,
            &self.exclude,
            &self.cancel,
        )
    }

    fn run_reader(&self, reader: TarballReader) -> Result<usize> {
        extractor::extract(
            reader,
            &self.template_path,
            &self.dest_dir,
            &self.exclude,
            &self.cancel,
        )
    }
}

async fn run_blocking<F>(f: F) -> Result<usize>
where
    F: FnOnce() -> Result<usize> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        RegistryError::extraction("extraction task failed", std::io::Error::other(e))
    })?
}

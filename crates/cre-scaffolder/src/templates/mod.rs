//! Template discovery, caching and materialization
//!
//! This module provides:
//! - Template metadata and source types (RepoSource, TemplateSummary)
//! - The GitHub remote client and the `TemplateRemote` seam used by tests
//! - The on-disk list and tarball cache
//! - Tarball extraction with exclusion filtering and path-traversal checks
//! - Templates embedded in the binary
//! - The `Registry` that ties these together

pub mod builtin;
pub mod cache;
pub mod extractor;
pub mod fetcher;
pub mod metadata;
pub mod registry;
pub mod workflow_dir;

pub use builtin::builtin_templates;
pub use cache::{Cache, CachedList, TemplateListCache};
pub use fetcher::{discover, Discovery, GitHubFetcher, TarballReader, TemplateRemote, TreeResponse};
pub use metadata::{Language, RepoSource, TemplateMetadata, TemplateSummary};
pub use registry::Registry;

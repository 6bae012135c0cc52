//! CRE Scaffolder - Template registry for CRE workflow project CLIs
//!
//! This library resolves where templates come from, discovers and caches them,
//! and materializes a chosen template into a new project directory. Binaries
//! supply their identity through [`ProductConfig`] and share everything else.
//!
//! # Architecture
//!
//! - **Sources** (`config`) - The user's ordered list of template repositories
//! - **Catalog** (`templates`) - Built-in templates plus remote discovery with an on-disk cache
//! - **Materialization** (`templates::extractor`, `templates::workflow_dir`) - Safe tarball
//!   extraction and workflow directory naming
//! - **CLI/TUI Interface** (`tui`) - Optional cliclack-based `init` wizard (feature-gated)
//!
//! # Feature Flags
//!
//! - `tui` (default): Enables the cliclack-based `init` wizard
//!
//! # Example Usage (without TUI)
//!
//! ```ignore
//! use cre_scaffolder::{config::Paths, CancellationToken, ProductConfig, Registry};
//!
//! let paths = Paths::resolve(&config, None)?;
//! let sources = paths.source_config().load_or_default(&config.default_source());
//! let registry = Registry::from_config(&config, &paths, sources, CancellationToken::new())?;
//!
//! let template = registry.get("hello-world-go", false).await?;
//! registry.scaffold(&template, &dest, "my-workflow", &|msg| println!("{msg}")).await?;
//! ```

pub mod cancel;
pub mod config;
pub mod error;
mod fsutil;
pub mod product;
pub mod templates;

#[cfg(feature = "tui")]
pub mod tui;

// Re-export main types for convenience
pub use cancel::CancellationToken;
pub use error::{RegistryError, Result};
pub use product::ProductConfig;
pub use templates::{
    Cache, GitHubFetcher, Language, Registry, RepoSource, TemplateMetadata, TemplateRemote,
    TemplateSummary,
};

#[cfg(feature = "tui")]
pub use tui::run_init;

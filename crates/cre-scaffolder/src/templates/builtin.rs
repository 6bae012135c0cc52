//! Templates embedded in the binary, available without network access

use super::extractor::{should_ignore, STANDARD_IGNORES};
use super::metadata::{RepoSource, TemplateMetadata, TemplateSummary, DEFAULT_REF};
use super::workflow_dir::{validate_workflow_name, WORKFLOW_DIR};
use crate::error::{RegistryError, Result};
use crate::fsutil;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Owner recorded on built-in summaries; never contacted
pub const BUILTIN_OWNER: &str = "builtin";

struct EmbeddedFile {
    /// Path relative to the template root, '/'-separated
    path: &'static str,
    contents: &'static [u8],
}

struct BuiltinTemplate {
    name: &'static str,
    title: &'static str,
    language: &'static str,
    files: &'static [EmbeddedFile],
}

macro_rules! embed {
    ($template:literal, $path:literal) => {
        EmbeddedFile {
            path: $path,
            contents: include_bytes!(concat!(
                env!("CARGO_MANIFEST_DIR"),
                "/builtin/",
                $template,
                "/",
                $path
            )),
        }
    };
}

const BUILTINS: &[BuiltinTemplate] = &[
    BuiltinTemplate {
        name: "hello-world-go",
        title: "Hello World (Go)",
        language: "go",
        files: &[
            embed!("hello-world-go", "secrets.yaml"),
            embed!("hello-world-go", "workflow/main.go"),
            embed!("hello-world-go", "workflow/README.md"),
            embed!("hello-world-go", "workflow/config.staging.json"),
            embed!("hello-world-go", "workflow/config.production.json"),
        ],
    },
    BuiltinTemplate {
        name: "hello-world-ts",
        title: "Hello World (TypeScript)",
        language: "typescript",
        files: &[
            embed!("hello-world-ts", "secrets.yaml"),
            embed!("hello-world-ts", "workflow/main.ts"),
            embed!("hello-world-ts", "workflow/README.md"),
            embed!("hello-world-ts", "workflow/config.staging.json"),
            embed!("hello-world-ts", "workflow/config.production.json"),
            embed!("hello-world-ts", "workflow/package.json"),
            embed!("hello-world-ts", "workflow/tsconfig.json"),
        ],
    },
];

impl BuiltinTemplate {
    fn summary(&self) -> TemplateSummary {
        TemplateSummary {
            metadata: TemplateMetadata {
                kind: "building-block".to_string(),
                name: self.name.to_string(),
                title: self.title.to_string(),
                description: "A minimal cron-triggered workflow to get started from scratch"
                    .to_string(),
                language: self.language.to_string(),
                category: "getting-started".to_string(),
                author: "Chainlink".to_string(),
                license: "MIT".to_string(),
                tags: vec!["cron".into(), "starter".into(), "minimal".into()],
                ..Default::default()
            },
            path: format!("builtin/{}", self.name),
            source: RepoSource::new(BUILTIN_OWNER, self.name, DEFAULT_REF),
            built_in: true,
        }
    }
}

/// Built-in templates, always in the same order
pub fn builtin_templates() -> Vec<TemplateSummary> {
    BUILTINS.iter().map(BuiltinTemplate::summary).collect()
}

/// Write the embedded template `name` into `dest_dir`, with its `workflow/`
/// directory renamed to `workflow_name`. Returns the number of files written.
pub fn scaffold_builtin(name: &str, dest_dir: &Path, workflow_name: &str) -> Result<usize> {
    validate_workflow_name(workflow_name)?;

    let template = BUILTINS
        .iter()
        .find(|t| t.name == name)
        .ok_or_else(|| RegistryError::TemplateNotFound {
            name: name.to_string(),
        })?;

    let mut written = 0;
    for file in template.files {
        if should_ignore(file.path, STANDARD_IGNORES) {
            continue;
        }

        let target = dest_dir.join(target_path(file.path, workflow_name));
        if let Some(parent) = target.parent() {
            fsutil::create_dir_all_0755(parent).map_err(|e| {
                RegistryError::extraction(
                    format!("failed to create directory {}", parent.display()),
                    e,
                )
            })?;
        }

        debug!("Extracting file: {} -> {}", file.path, target.display());
        let mut contents = file.contents;
        fsutil::write_file_with_mode(&target, 0o600, &mut contents).map_err(|e| {
            RegistryError::extraction(format!("failed to write file {}", target.display()), e)
        })?;
        written += 1;
    }

    Ok(written)
}

/// Map an embedded path onto the destination, swapping the leading `workflow` component
fn target_path(embedded: &str, workflow_name: &str) -> PathBuf {
    let mut parts = embedded.split('/');
    let mut path = PathBuf::new();
    match parts.next() {
        Some(WORKFLOW_DIR) => path.push(workflow_name),
        Some(first) => path.push(first),
        None => {}
    }
    path.extend(parts);
    path
}

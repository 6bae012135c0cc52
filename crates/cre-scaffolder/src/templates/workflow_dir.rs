//! Post-extraction pass that gives the workflow directory the user's chosen name

use crate::error::{RegistryError, Result};
use crate::fsutil;
use std::path::{Component, Path};
use tracing::debug;

/// Conventional name of the workflow subdirectory inside a template
pub const WORKFLOW_DIR: &str = "workflow";

/// A directory holding any of these is a workflow directory
pub const WORKFLOW_MARKERS: &[&str] = &["main.go", "main.ts", "workflow.yaml"];

/// Entries that stay at the project root when a flat template is wrapped
pub const PROJECT_LEVEL_FILES: &[&str] = &[
    "project.yaml",
    "secrets.yaml",
    "go.mod",
    "go.sum",
    ".env",
    ".gitignore",
    "contracts",
];

/// Reject names that are not a single plain directory name
pub fn validate_workflow_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == name => Ok(()),
        _ => Err(RegistryError::InvalidWorkflowName {
            name: name.to_string(),
        }),
    }
}

fn has_workflow_markers(dir: &Path) -> bool {
    WORKFLOW_MARKERS
        .iter()
        .any(|marker| dir.join(marker).is_file())
}

/// Make `dest_dir/<workflow_name>` the one directory holding workflow sources.
///
/// Nothing changes when `workflow_name` already holds a workflow marker. Otherwise
/// the first top-level directory (by name) with a workflow marker is renamed.
/// When there is none, every top-level entry except project-level files is
/// moved into a new `workflow_name` directory.
pub fn place_workflow_dir(dest_dir: &Path, workflow_name: &str) -> Result<()> {
    validate_workflow_name(workflow_name)?;

    let named = dest_dir.join(workflow_name);
    if named.is_dir() && has_workflow_markers(&named) {
        debug!("Workflow directory already named {}", workflow_name);
        return Ok(());
    }

    let read_err = |e: std::io::Error| {
        RegistryError::io(
            format!("failed to read destination {}", dest_dir.display()),
            e,
        )
    };
    let mut entries = std::fs::read_dir(dest_dir)
        .map_err(read_err)?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(read_err)?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in &entries {
        let path = entry.path();
        if !path.is_dir() || !has_workflow_markers(&path) {
            continue;
        }

        let target = &named;
        debug!(
            "Renaming workflow dir {} -> {}",
            entry.file_name().to_string_lossy(),
            workflow_name
        );
        return std::fs::rename(&path, &target).map_err(|e| {
            RegistryError::io(
                format!(
                    "failed to rename {} to {}",
                    path.display(),
                    target.display()
                ),
                e,
            )
        });
    }

    // Flat layout: the template root is the workflow
    let workflow_dir = named;
    fsutil::create_dir_all_0755(&workflow_dir).map_err(|e| {
        RegistryError::io(
            format!(
                "failed to create workflow directory {}",
                workflow_dir.display()
            ),
            e,
        )
    })?;

    for entry in &entries {
        let name = entry.file_name();
        if name == workflow_name {
            continue;
        }
        if name
            .to_str()
            .is_some_and(|n| PROJECT_LEVEL_FILES.contains(&n))
        {
            continue;
        }

        let target = workflow_dir.join(&name);
        debug!(
            "Moving {} into {}",
            name.to_string_lossy(),
            workflow_dir.display()
        );
        std::fs::rename(entry.path(), &target).map_err(|e| {
            RegistryError::io(
                format!(
                    "failed to move {} to workflow dir",
                    name.to_string_lossy()
                ),
                e,
            )
        })?;
    }

    Ok(())
}

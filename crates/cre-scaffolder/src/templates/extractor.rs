//! Tarball extraction with template scoping, exclusion filtering and path-traversal checks

use crate::cancel::CancellationToken;
use crate::error::{RegistryError, Result};
use crate::fsutil;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};
use tracing::debug;

/// Files and directories never copied out of a template
pub const STANDARD_IGNORES: &[&str] = &[
    ".git",
    ".cre",
    "node_modules",
    "bun.lock",
    "tmp",
    ".DS_Store",
];

/// Check if a template-relative path matches any ignore pattern.
///
/// - `*suffix` matches paths ending with `suffix`
/// - `dir/` matches `dir` itself and everything below it
/// - anything else matches the first path component exactly
pub fn should_ignore<S: AsRef<str>>(rel_path: &str, patterns: &[S]) -> bool {
    let first_component = rel_path.split('/').next().unwrap_or(rel_path);

    patterns.iter().map(AsRef::as_ref).any(|pattern| {
        if pattern.is_empty() {
            false
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            rel_path.ends_with(suffix)
        } else if let Some(dir) = pattern.strip_suffix('/') {
            rel_path == dir || rel_path.starts_with(pattern)
        } else {
            first_component == pattern
        }
    })
}

/// Extract a cached tarball file. See [`extract`].
pub fn extract_file(
    tarball: &Path,
    template_path: &str,
    dest_dir: &Path,
    exclude: &[String],
    cancel: &CancellationToken,
) -> Result<usize> {
    let file = File::open(tarball).map_err(|e| {
        RegistryError::extraction(
            format!("failed to open cached tarball {}", tarball.display()),
            e,
        )
    })?;
    extract(file, template_path, dest_dir, exclude, cancel)
}

/// Extract the files under `template_path` from a gzipped tarball into `dest_dir`.
///
/// The archive's single top-level directory (`owner-repo-sha/`) is stripped first.
/// Returns the number of regular files written.
pub fn extract<R: Read>(
    reader: R,
    template_path: &str,
    dest_dir: &Path,
    exclude: &[String],
    cancel: &CancellationToken,
) -> Result<usize> {
    fsutil::create_dir_all_0755(dest_dir).map_err(|e| {
        RegistryError::extraction(
            format!("failed to create destination {}", dest_dir.display()),
            e,
        )
    })?;
    let dest_root = dest_dir.canonicalize().map_err(|e| {
        RegistryError::extraction(
            format!("failed to resolve destination {}", dest_dir.display()),
            e,
        )
    })?;

    let template_path = template_path.trim_matches('/');
    let scope_prefix = format!("{template_path}/");

    let mut archive = Archive::new(GzDecoder::new(reader));
    let entries = archive
        .entries()
        .map_err(|e| RegistryError::extraction("failed to read archive", e))?;

    let mut top_level_prefix: Option<String> = None;
    let mut written = 0;

    for entry in entries {
        cancel.check()?;

        let mut entry = entry.map_err(|e| RegistryError::extraction("tar read error", e))?;
        let entry_type = entry.header().entry_type();

        // PAX records are metadata, not files
        if matches!(entry_type, EntryType::XGlobalHeader | EntryType::XHeader) {
            continue;
        }

        let raw_name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();

        if top_level_prefix.is_none() {
            top_level_prefix = Some(detect_prefix(&raw_name)?);
        }
        let prefix = top_level_prefix.as_deref().unwrap_or_default();
        let name = raw_name.strip_prefix(prefix).unwrap_or(&raw_name);
        if name.is_empty() || name == prefix.trim_end_matches('/') {
            continue;
        }

        let rel_path = if template_path.is_empty() {
            name
        } else if name == template_path {
            continue;
        } else if let Some(rest) = name.strip_prefix(&scope_prefix) {
            rest
        } else {
            continue;
        };
        let rel_path = rel_path.trim_end_matches('/');
        if rel_path.is_empty() {
            continue;
        }

        if should_ignore(rel_path, STANDARD_IGNORES) || should_ignore(rel_path, exclude) {
            continue;
        }

        let target = resolve_inside(&dest_root, rel_path).ok_or_else(|| {
            RegistryError::UnsafeArchivePath {
                entry: raw_name.clone(),
            }
        })?;

        match entry_type {
            EntryType::Directory => {
                debug!("Extracting dir: {} -> {}", name, target.display());
                create_dir_checked(&dest_root, &target, &raw_name)?;
            }
            EntryType::Regular | EntryType::Continuous => {
                debug!("Extracting file: {} -> {}", name, target.display());
                if let Some(parent) = target.parent() {
                    create_dir_checked(&dest_root, parent, &raw_name)?;
                }
                let mode = entry.header().mode().unwrap_or(0o644);
                let mode = (mode & 0o755) | 0o600;
                fsutil::write_file_with_mode(&target, mode, &mut entry).map_err(|e| {
                    RegistryError::extraction(
                        format!("failed to write file {}", target.display()),
                        e,
                    )
                })?;
                written += 1;
            }
            _ => debug!("Skipping {} entry {}", entry_type.as_byte() as char, name),
        }
    }

    Ok(written)
}

/// Top-level directory of the archive, taken from its first real entry
fn detect_prefix(first_name: &str) -> Result<String> {
    let first = first_name.split('/').next().unwrap_or_default();
    let mut components = Path::new(first).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(format!("{first}/")),
        _ => Err(RegistryError::UnsafeArchivePath {
            entry: first_name.to_string(),
        }),
    }
}

/// Join `rel_path` onto `root` lexically, refusing anything that climbs out of it
fn resolve_inside(root: &Path, rel_path: &str) -> Option<PathBuf> {
    let mut resolved = root.to_path_buf();
    let mut depth = 0usize;
    for component in Path::new(rel_path).components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                resolved.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(resolved)
}

/// Create `dir` (0755) and confirm that, after resolving symlinks, it is still under `root`
fn create_dir_checked(root: &Path, dir: &Path, entry: &str) -> Result<()> {
    fsutil::create_dir_all_0755(dir).map_err(|e| {
        RegistryError::extraction(format!("failed to create directory {}", dir.display()), e)
    })?;
    let canonical = dir.canonicalize().map_err(|e| {
        RegistryError::extraction(format!("failed to resolve directory {}", dir.display()), e)
    })?;
    if canonical == root || canonical.starts_with(root) {
        Ok(())
    } else {
        Err(RegistryError::UnsafeArchivePath {
            entry: entry.to_string(),
        })
    }
}

//! Filesystem helpers: atomic replace and permission-aware directory creation

use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Write `contents` to `path` so readers see either the old file or the complete new one.
///
/// The data goes to a temp file in the same directory, is fsynced, then renamed over the target.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let parent = parent_dir(path)?;
    std::fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Create a temp file next to `path`, for callers that stream into it before persisting
pub(crate) fn temp_file_beside(path: &Path) -> io::Result<NamedTempFile> {
    let parent = parent_dir(path)?;
    std::fs::create_dir_all(parent)?;
    NamedTempFile::new_in(parent)
}

/// Recursively create a directory with mode 0755 on unix
pub(crate) fn create_dir_all_0755(path: &Path) -> io::Result<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder.create(path)
}

/// Create (or truncate) a file with the given unix mode and write `reader` into it
pub(crate) fn write_file_with_mode(
    path: &Path,
    mode: u32,
    reader: &mut dyn io::Read,
) -> io::Result<u64> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options.open(path)?;
    io::copy(reader, &mut file)
}

/// Move every entry of `src` into `dst`, descending into directories that exist in both.
///
/// Files already in `dst` under the same name are replaced; anything else in `dst` is untouched.
pub(crate) fn merge_dir(src: &Path, dst: &Path) -> io::Result<()> {
    create_dir_all_0755(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());

        let both_dirs = entry.file_type()?.is_dir()
            && std::fs::symlink_metadata(&to).is_ok_and(|meta| meta.is_dir());
        if both_dirs {
            merge_dir(&from, &to)?;
        } else {
            std::fs::rename(&from, &to)?;
        }
    }
    Ok(())
}

fn parent_dir(path: &Path) -> io::Result<&Path> {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no parent directory", path.display()),
            )
        })
}

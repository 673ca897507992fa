use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("blob path is empty")]
    Empty,
    #[error("blob path contains unsupported component")]
    UnsupportedComponent,
    #[error("owner key cannot be used as a directory name: {0}")]
    InvalidOwnerKey(String),
}

/// Maps a blob handle ("NU-1/photo.jpg") under the blob root.
pub fn blob_path_for(blob_root: &Path, handle: &str) -> Result<PathBuf, PathError> {
    if handle.is_empty() {
        return Err(PathError::Empty);
    }

    let mut out = blob_root.to_path_buf();
    for component in Path::new(handle).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::RootDir | Component::CurDir => continue,
            Component::ParentDir | Component::Prefix(_) => {
                return Err(PathError::UnsupportedComponent);
            }
        }
    }
    if out == blob_root {
        return Err(PathError::Empty);
    }
    Ok(out)
}

/// Owner keys become one directory level, so separators and dot names are refused.
pub fn owner_dir_name(owner_key: &str) -> Result<&str, PathError> {
    let trimmed = owner_key.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(['/', '\\', '\0'])
    {
        return Err(PathError::InvalidOwnerKey(owner_key.to_string()));
    }
    Ok(trimmed)
}

pub fn partial_path(target: &Path) -> PathBuf {
    target.with_extension(format!(
        "{}partial",
        target
            .extension()
            .map(|ext| format!("{}.", ext.to_string_lossy()))
            .unwrap_or_default()
    ))
}

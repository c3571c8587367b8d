//! Mapping between site paths and files of a mirror generation

use crate::url::{is_directory_style, INDEX_DOCUMENT};
use std::io;
use std::path::{Component, Path, PathBuf};

/// Extension of the sidecar holding the fetch timestamp
pub const FETCHED_SIDECAR: &str = "fetched";

/// Extension of the sidecar holding the last-seen query string
pub const QUERY_SIDECAR: &str = "query";

/// Returns the file a site path is stored at under `root`
///
/// Directory-style paths get the index document appended; the root maps to
/// `root/index.html`.
pub fn file_path_for(root: &Path, path: &str) -> PathBuf {
    let mut file = root.to_path_buf();
    for segment in path.split('/').filter(|s| !s.is_empty() && *s != "..") {
        file.push(segment);
    }
    if is_directory_style(path) {
        file.push(INDEX_DOCUMENT);
    }
    file
}

/// Returns the sidecar file next to a stored resource
pub fn sidecar_path(file: &Path, sidecar: &str) -> PathBuf {
    let mut name = file.as_os_str().to_os_string();
    name.push(".");
    name.push(sidecar);
    PathBuf::from(name)
}

/// Returns true if the file is a sidecar rather than a stored resource
pub fn is_sidecar(file: &Path) -> bool {
    matches!(
        file.extension().and_then(|e| e.to_str()),
        Some(FETCHED_SIDECAR) | Some(QUERY_SIDECAR)
    )
}

/// Maps a stored file back to the site path it was written for
///
/// Rebuilds the segment list after dropping the area root instead of
/// stripping one component at a time.
pub fn site_path_for(root: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(root).ok()?;
    let mut segments: Vec<&str> = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => segments.push(segment.to_str()?),
            _ => return None,
        }
    }

    if segments.last() == Some(&INDEX_DOCUMENT) {
        segments.pop();
    }

    Some(format!("/{}", segments.join("/")))
}

/// Returns the `file://` URL of a directory, made absolute against the
/// working directory
///
/// `.` components are dropped so the URL is stable across invocations.
pub fn file_url(root: &Path) -> io::Result<String> {
    let absolute = if root.is_absolute() {
        root.to_path_buf()
    } else {
        std::env::current_dir()?.join(root)
    };
    let cleaned: PathBuf = absolute
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    Ok(format!(
        "file://{}",
        cleaned.to_string_lossy().trim_end_matches('/')
    ))
}

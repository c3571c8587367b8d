//! Filesystem mirror storage
//!
//! The live generation lives at the configured root. The staged generation is
//! built in the sibling `<root>.staging`, and publishing parks the live tree
//! at `<root>.previous` for the instant between the two renames.

use crate::storage::layout::{
    file_path_for, is_sidecar, sidecar_path, site_path_for, FETCHED_SIDECAR, QUERY_SIDECAR,
};
use crate::storage::{CacheRecord, StorageError, StorageResult, Store};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Mirror storage on the local filesystem
#[derive(Debug, Clone)]
pub struct FsStore {
    live: PathBuf,
    staging: PathBuf,
    previous: PathBuf,
}

impl FsStore {
    /// Opens the store rooted at `root` and prepares an empty staging area
    ///
    /// A live tree missing next to a parked previous generation means the last
    /// run died between the two publish renames; the previous generation is
    /// restored first. Leftovers of an interrupted staging area are discarded.
    pub fn open(root: &Path) -> StorageResult<Self> {
        let name = root
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StorageError::InvalidRoot(root.display().to_string()))?;

        let store = Self {
            live: root.to_path_buf(),
            staging: root.with_file_name(format!("{}.staging", name)),
            previous: root.with_file_name(format!("{}.previous", name)),
        };

        if !store.live.exists() && store.previous.exists() {
            tracing::warn!(
                "Restoring previous generation from {} after an interrupted publish",
                store.previous.display()
            );
            fs::rename(&store.previous, &store.live)
                .map_err(|e| StorageError::io(&store.previous, e))?;
        }

        if store.staging.exists() {
            tracing::info!(
                "Discarding staging area of an interrupted run: {}",
                store.staging.display()
            );
            fs::remove_dir_all(&store.staging).map_err(|e| StorageError::io(&store.staging, e))?;
        }
        fs::create_dir_all(&store.staging).map_err(|e| StorageError::io(&store.staging, e))?;

        Ok(store)
    }

    /// Directory of the live generation
    pub fn live_root(&self) -> &Path {
        &self.live
    }

    /// Directory of the staged generation
    pub fn staging_root(&self) -> &Path {
        &self.staging
    }
}

impl Store for FsStore {
    fn live_record(&self, path: &str) -> StorageResult<Option<CacheRecord>> {
        let file = file_path_for(&self.live, path);

        let Some(stamp) = read_optional(&sidecar_path(&file, FETCHED_SIDECAR))? else {
            return Ok(None);
        };
        let Some(bytes) = read_optional(&file)? else {
            return Ok(None);
        };

        let stamp = String::from_utf8_lossy(&stamp);
        let fetched_at = match DateTime::parse_from_rfc3339(stamp.trim()) {
            Ok(t) => t.with_timezone(&Utc),
            Err(e) => {
                tracing::warn!(
                    "Ignoring cached {} with unreadable timestamp '{}': {}",
                    path,
                    stamp.trim(),
                    e
                );
                return Ok(None);
            }
        };

        let query = read_optional(&sidecar_path(&file, QUERY_SIDECAR))?
            .map(|q| String::from_utf8_lossy(&q).into_owned());

        Ok(Some(CacheRecord {
            bytes,
            fetched_at,
            query,
        }))
    }

    fn live_paths(&self) -> StorageResult<Vec<String>> {
        let mut paths = Vec::new();
        if !self.live.exists() {
            return Ok(paths);
        }

        let mut pending = vec![self.live.clone()];
        while let Some(dir) = pending.pop() {
            let entries = fs::read_dir(&dir).map_err(|e| StorageError::io(&dir, e))?;
            for entry in entries {
                let entry = entry.map_err(|e| StorageError::io(&dir, e))?;
                let file = entry.path();
                if file.is_dir() {
                    pending.push(file);
                } else if !is_sidecar(&file) {
                    if let Some(path) = site_path_for(&self.live, &file) {
                        paths.push(path);
                    }
                }
            }
        }

        paths.sort();
        Ok(paths)
    }

    fn carry_forward(&self, path: &str) -> StorageResult<()> {
        let live = file_path_for(&self.live, path);
        let staged = file_path_for(&self.staging, path);

        if !live.exists() {
            return Err(StorageError::MissingRecord(path.to_string()));
        }
        create_parent(&staged)?;

        link_or_copy(&live, &staged)?;
        for sidecar in [FETCHED_SIDECAR, QUERY_SIDECAR] {
            let from = sidecar_path(&live, sidecar);
            if from.exists() {
                link_or_copy(&from, &sidecar_path(&staged, sidecar))?;
            }
        }

        Ok(())
    }

    fn write_staged(
        &self,
        path: &str,
        bytes: &[u8],
        fetched_at: DateTime<Utc>,
        query: Option<&str>,
    ) -> StorageResult<()> {
        let staged = file_path_for(&self.staging, path);
        create_parent(&staged)?;

        // Never write through a link shared with the live generation
        for file in [
            staged.clone(),
            sidecar_path(&staged, FETCHED_SIDECAR),
            sidecar_path(&staged, QUERY_SIDECAR),
        ] {
            if file.exists() {
                fs::remove_file(&file).map_err(|e| StorageError::io(&file, e))?;
            }
        }
        fs::write(&staged, bytes).map_err(|e| StorageError::io(&staged, e))?;

        let stamp_file = sidecar_path(&staged, FETCHED_SIDECAR);
        let stamp = fetched_at.to_rfc3339_opts(SecondsFormat::Secs, true);
        fs::write(&stamp_file, stamp).map_err(|e| StorageError::io(&stamp_file, e))?;

        if let Some(query) = query {
            let query_file = sidecar_path(&staged, QUERY_SIDECAR);
            fs::write(&query_file, query).map_err(|e| StorageError::io(&query_file, e))?;
        }

        Ok(())
    }

    fn publish(&self) -> StorageResult<()> {
        if !self.staging.exists() {
            return Err(StorageError::Publish(format!(
                "staging area {} does not exist",
                self.staging.display()
            )));
        }

        if self.previous.exists() {
            fs::remove_dir_all(&self.previous).map_err(|e| StorageError::io(&self.previous, e))?;
        }

        if self.live.exists() {
            fs::rename(&self.live, &self.previous)
                .map_err(|e| StorageError::Publish(format!("parking live tree: {}", e)))?;
        }

        fs::rename(&self.staging, &self.live)
            .map_err(|e| StorageError::Publish(format!("promoting staging area: {}", e)))?;

        if self.previous.exists() {
            if let Err(e) = fs::remove_dir_all(&self.previous) {
                tracing::warn!(
                    "Could not remove previous generation {}: {}",
                    self.previous.display(),
                    e
                );
            }
        }

        Ok(())
    }
}

/// Reads a file, mapping "not found" to `None`
fn read_optional(file: &Path) -> StorageResult<Option<Vec<u8>>> {
    match fs::read(file) {
        Ok(bytes) => Ok(Some(bytes)),
        // Also covers a file sitting where a directory is expected
        Err(e) if e.kind() == ErrorKind::NotFound || !file.is_file() => Ok(None),
        Err(e) => Err(StorageError::io(file, e)),
    }
}

fn create_parent(file: &Path) -> StorageResult<()> {
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
    }
    Ok(())
}

/// Hard-links `from` to `to`, copying when the filesystem refuses the link
fn link_or_copy(from: &Path, to: &Path) -> StorageResult<()> {
    if to.exists() {
        fs::remove_file(to).map_err(|e| StorageError::io(to, e))?;
    }
    if fs::hard_link(from, to).is_err() {
        fs::copy(from, to).map_err(|e| StorageError::io(from, e))?;
    }
    Ok(())
}

//! Destination materializer: recursive copy of a finished output tree into
//! the user-chosen destination store.

use crate::cancel::CancelToken;
use crate::error::MaterializeError;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

/// Stream copy buffer, matching the per-chunk transfer size used elsewhere
/// in the pipeline.
const COPY_BUF_SIZE: usize = 64 * 1024;

/// Opaque reference to a directory entry inside a destination store.
///
/// Not a filesystem path: the store decides what the identifier means
/// (a relative path for [`LocalDirStore`], a document id for a
/// permission-scoped platform store).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirHandle(String);

impl DirHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Capability-based destination tree.
///
/// The core never touches the destination as a raw filesystem; it only
/// creates entries and streams bytes. Any rejected operation (permission
/// revoked, quota, device gone) surfaces as a [`MaterializeError`] and aborts
/// the remaining copy. Partial destination content is left in place; there is
/// no transactional rollback.
pub trait DestinationStore: Send {
    /// Handle of the destination tree root.
    fn root(&self) -> DirHandle;

    /// Create (or reuse) a child directory entry under `parent`.
    fn create_dir(&mut self, parent: &DirHandle, name: &str) -> Result<DirHandle, MaterializeError>;

    /// Create a child file entry under `parent` and open it for writing.
    /// `mime` is a best-effort content type hint; stores may ignore it.
    fn create_file(
        &mut self,
        parent: &DirHandle,
        name: &str,
        mime: &str,
    ) -> Result<Box<dyn Write + Send>, MaterializeError>;
}

/// Destination store over a plain local directory.
///
/// Handles are paths relative to the root, so the store stays inside the
/// tree it was opened on.
pub struct LocalDirStore {
    root: std::path::PathBuf,
}

impl LocalDirStore {
    /// Open `root` as a destination tree, creating it if missing.
    pub fn open(root: impl Into<std::path::PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn resolve(&self, handle: &DirHandle) -> std::path::PathBuf {
        if handle.id().is_empty() {
            self.root.clone()
        } else {
            self.root.join(handle.id())
        }
    }
}

impl DestinationStore for LocalDirStore {
    fn root(&self) -> DirHandle {
        DirHandle::new("")
    }

    fn create_dir(&mut self, parent: &DirHandle, name: &str) -> Result<DirHandle, MaterializeError> {
        let dir = self.resolve(parent).join(name);
        fs::create_dir_all(&dir).map_err(|e| MaterializeError::CreateDir {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        let id = if parent.id().is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", parent.id(), name)
        };
        Ok(DirHandle::new(id))
    }

    fn create_file(
        &mut self,
        parent: &DirHandle,
        name: &str,
        _mime: &str,
    ) -> Result<Box<dyn Write + Send>, MaterializeError> {
        let path = self.resolve(parent).join(name);
        let file = File::create(&path).map_err(|e| MaterializeError::CreateFile {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Box::new(file))
    }
}

/// Counters for a finished copy.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializeStats {
    pub files_copied: u64,
    pub dirs_created: u64,
    pub bytes_written: u64,
}

/// Per-file copy progress: `(entry name, files copied so far, bytes written so far)`.
pub type CopyProgress<'a> = dyn Fn(&str, u64, u64) + Send + Sync + 'a;

/// Copy `source` into the destination store, preserving structure.
///
/// One top-level directory entry named after `source`'s base name is created
/// under the store root; children are copied depth-first, files streamed
/// through a bounded buffer and flushed before close. The cancel token is
/// polled between entries; cancellation aborts the copy with
/// [`MaterializeError::Cancelled`], leaving already-copied entries in place.
pub fn materialize_tree(
    source: &Path,
    store: &mut dyn DestinationStore,
    progress: &CopyProgress<'_>,
    cancel: &CancelToken,
) -> Result<MaterializeStats, MaterializeError> {
    if !source.is_dir() {
        return Err(MaterializeError::NotADirectory(source.to_path_buf()));
    }

    let base_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| MaterializeError::NotADirectory(source.to_path_buf()))?;

    let mut stats = MaterializeStats::default();
    let root = store.root();
    let top = store.create_dir(&root, &base_name)?;
    stats.dirs_created += 1;

    tracing::debug!(source = %source.display(), dest = %base_name, "materializing output tree");
    copy_children(source, &top, store, progress, cancel, &mut stats)?;
    Ok(stats)
}

fn copy_children(
    dir: &Path,
    dest: &DirHandle,
    store: &mut dyn DestinationStore,
    progress: &CopyProgress<'_>,
    cancel: &CancelToken,
    stats: &mut MaterializeStats,
) -> Result<(), MaterializeError> {
    for entry in fs::read_dir(dir)? {
        if cancel.is_requested() {
            return Err(MaterializeError::Cancelled);
        }

        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();

        if entry.file_type()?.is_dir() {
            let child_dest = store.create_dir(dest, &name)?;
            stats.dirs_created += 1;
            copy_children(&path, &child_dest, store, progress, cancel, stats)?;
        } else {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            let mut out = store.create_file(dest, &name, mime.essence_str())?;
            stream_file(&path, out.as_mut(), stats)?;
            stats.files_copied += 1;
            progress(&name, stats.files_copied, stats.bytes_written);
        }
    }
    Ok(())
}

fn stream_file(
    path: &Path,
    out: &mut dyn Write,
    stats: &mut MaterializeStats,
) -> Result<(), MaterializeError> {
    let mut input = File::open(path)?;
    let mut buf = [0u8; COPY_BUF_SIZE];
    loop {
        let read = input.read(&mut buf)?;
        if read == 0 {
            break;
        }
        out.write_all(&buf[..read])?;
        stats.bytes_written += read as u64;
    }
    out.flush()?;
    Ok(())
}

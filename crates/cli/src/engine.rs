//! Deterministic content engine backed by a local title library.
//!
//! Stands in for the real engine so the job pipeline runs end to end without
//! network access: "downloading" a title copies it out of a library directory
//! (one folder per title id) into the work directory, reporting per-file
//! progress. Library content is already plaintext, so the decrypt and
//! extract flags are ignored.

use downloader::{CancelToken, ContentEngine, EngineError, EngineObserver, EngineRequest, Phase};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const CHUNK_SIZE: usize = 64 * 1024;
const MB: f32 = 1024.0 * 1024.0;

pub struct LocalFileEngine {
    library: PathBuf,
}

impl LocalFileEngine {
    pub fn new(library: impl Into<PathBuf>) -> Self {
        Self {
            library: library.into(),
        }
    }
}

impl ContentEngine for LocalFileEngine {
    fn run(
        &self,
        request: &EngineRequest,
        observer: &dyn EngineObserver,
        cancel: &CancelToken,
    ) -> Result<String, EngineError> {
        observer.on_phase_change(Phase::DownloadingMetadata);

        let source = self.library.join(&request.title_id);
        if !source.is_dir() {
            return Err(EngineError::Failed(format!(
                "title {} not found in library {}",
                request.title_id,
                self.library.display()
            )));
        }

        // Sorted walk keeps the file order, and so the event stream,
        // deterministic for a given library.
        let files: Vec<PathBuf> = WalkDir::new(&source)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();
        let total_bytes: u64 = files
            .iter()
            .filter_map(|p| fs::metadata(p).ok())
            .map(|m| m.len())
            .sum();
        let total_files = files.len() as u32;

        observer.on_phase_change(Phase::DownloadingContent);

        let out_root = request.work_dir.join(&request.title_id);
        fs::create_dir_all(&out_root).map_err(|e| EngineError::Failed(e.to_string()))?;

        let mut copied_bytes: u64 = 0;
        for (index, file) in files.iter().enumerate() {
            if cancel.is_requested() {
                return Err(EngineError::Cancelled);
            }

            let rel = file
                .strip_prefix(&source)
                .map_err(|e| EngineError::Failed(e.to_string()))?;
            let dest = out_root.join(rel);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| EngineError::Failed(e.to_string()))?;
            }
            copied_bytes +=
                copy_file(file, &dest).map_err(|e| EngineError::Failed(e.to_string()))?;

            let current = (index + 1) as u32;
            let percent = (copied_bytes * 100 / total_bytes.max(1)) as u8;
            observer.on_update(
                percent,
                &format!("File {current}/{total_files}"),
                current,
                total_files,
                copied_bytes as f32 / MB,
                total_bytes as f32 / MB,
            );
        }

        Ok(request.title_id.clone())
    }
}

fn copy_file(from: &Path, to: &Path) -> std::io::Result<u64> {
    let mut input = fs::File::open(from)?;
    let mut out = fs::File::create(to)?;
    let mut buf = [0u8; CHUNK_SIZE];
    let mut written = 0u64;
    loop {
        let read = input.read(&mut buf)?;
        if read == 0 {
            break;
        }
        out.write_all(&buf[..read])?;
        written += read as u64;
    }
    out.flush()?;
    Ok(written)
}

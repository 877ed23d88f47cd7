//! Content engine contract.
//!
//! The engine is an external collaborator: it fetches title metadata,
//! downloads encrypted content, and optionally decrypts and extracts it
//! inside the job's work directory. This crate only defines the call
//! boundary; the controller invokes the engine once per job on a blocking
//! worker and relays its callbacks onto the progress bridge.

use crate::cancel::CancelToken;
use crate::error::EngineError;
use crate::types::Phase;
use std::path::PathBuf;

/// Parameters for one engine invocation.
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub title_id: String,
    /// Scratch directory the engine writes into; already created.
    pub work_dir: PathBuf,
    pub auto_decrypt: bool,
    /// Remove encrypted source files once decryption succeeds.
    pub delete_encrypted: bool,
    pub auto_extract: bool,
}

/// Progress callbacks invoked by the engine.
///
/// Every method may be called from any thread the engine spawns internally;
/// implementations must be `Sync` and must not block for unbounded time.
pub trait EngineObserver: Send + Sync {
    /// Content transfer progress. `downloaded_mb`/`total_mb` are cumulative
    /// for the whole title.
    fn on_update(
        &self,
        percent: u8,
        message: &str,
        current_file: u32,
        total_files: u32,
        downloaded_mb: f32,
        total_mb: f32,
    );

    /// The engine moved to a new pipeline phase.
    fn on_phase_change(&self, phase: Phase);

    /// Decryption progress, `percent` in `0..=100`.
    fn on_decryption_progress(&self, percent: f32, message: &str);

    /// Extraction progress, `percent` in `0..=100`.
    fn on_extraction_progress(&self, percent: f32, message: &str);
}

/// A content engine implementation.
///
/// The call is blocking from the worker's perspective; the engine performs
/// its own internal concurrency. It must poll `cancel` at natural
/// checkpoints (between files, between phases) and return
/// [`EngineError::Cancelled`] promptly once the flag is set.
///
/// On success the engine returns the output folder: either an absolute path,
/// a name relative to the work directory, or empty (in which case the
/// controller falls back to `work_dir/title_id`).
pub trait ContentEngine: Send + Sync {
    fn run(
        &self,
        request: &EngineRequest,
        observer: &dyn EngineObserver,
        cancel: &CancelToken,
    ) -> Result<String, EngineError>;
}

//! Job controller: owns the single active download job and sequences its
//! pipeline from engine invocation through destination copy.

use crate::bridge::ProgressBridge;
use crate::cancel::CancelToken;
use crate::engine::{ContentEngine, EngineObserver, EngineRequest};
use crate::error::{EngineError, JobError, MaterializeError};
use crate::materialize::materialize_tree;
use crate::types::{clip_message, JobRequest, JobSummary, Phase, ProgressEvent};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, Notify};
use walkdir::WalkDir;

/// Display limit for decrypt/extract status lines.
const STATUS_CLIP: usize = 40;

/// Top-level state machine owning one download job at a time.
///
/// `start` and `cancel` are safe to call from any thread inside a tokio
/// runtime and never block: the pipeline runs on a spawned worker task, with
/// the blocking engine call and the destination copy pushed onto the blocking
/// pool. All job state is mutated only by the worker; observers get
/// immutable [`ProgressEvent`] snapshots through the bridge, never a live
/// reference.
#[derive(Clone)]
pub struct JobController {
    engine: Arc<dyn ContentEngine>,
    bridge: ProgressBridge,
    cancel: Arc<CancelToken>,
    active: Arc<Mutex<Option<String>>>,
    idle: Arc<Notify>,
}

impl JobController {
    pub fn new(engine: Arc<dyn ContentEngine>) -> Self {
        Self {
            engine,
            bridge: ProgressBridge::new(),
            cancel: Arc::new(CancelToken::new()),
            active: Arc::new(Mutex::new(None)),
            idle: Arc::new(Notify::new()),
        }
    }

    /// Attach an observer sink.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.bridge.subscribe()
    }

    /// The controller's cancellation token. Shared with the engine for the
    /// lifetime of the controller; reset at each `start`.
    pub fn cancel_token(&self) -> Arc<CancelToken> {
        self.cancel.clone()
    }

    /// Title id of the active job, if any.
    pub fn active_job(&self) -> Option<String> {
        self.active.lock().clone()
    }

    /// Begin a download job.
    ///
    /// Rejected synchronously with [`JobError::AlreadyRunning`] while another
    /// job is active; a rejected start never alters the active job's state.
    pub fn start(&self, request: JobRequest) -> Result<(), JobError> {
        {
            let mut active = self.active.lock();
            if active.is_some() {
                return Err(JobError::AlreadyRunning);
            }
            self.cancel.reset()?;
            self.cancel.set_active(true);
            *active = Some(request.title_id.clone());
        }

        tracing::debug!(title_id = %request.title_id, "starting download job");

        let relay = Arc::new(ProgressRelay::new(
            self.bridge.clone(),
            request.title_id.clone(),
        ));
        relay.emit_initializing();

        let engine = self.engine.clone();
        let cancel = self.cancel.clone();
        let active = self.active.clone();
        let idle = self.idle.clone();
        let worker_relay = relay.clone();

        tokio::spawn(async move {
            let outcome = run_job(engine, worker_relay.clone(), cancel.clone(), request).await;
            worker_relay.emit_terminal(&outcome);

            // Deactivate the token and free the slot under one lock; a
            // racing `start` must never see the slot free while the token
            // still counts as active.
            {
                let mut active = active.lock();
                cancel.set_active(false);
                *active = None;
            }
            idle.notify_waiters();
        });

        Ok(())
    }

    /// Request cancellation of the active job. No-op if `title_id` is not
    /// the active job. The in-flight engine call is not force-terminated; it
    /// observes the token at its next checkpoint.
    pub fn cancel(&self, title_id: &str) {
        let active = self.active.lock();
        if active.as_deref() == Some(title_id) {
            tracing::debug!(title_id, "cancellation requested");
            self.cancel.request();
        }
    }

    /// Wait until no job is active. Returns immediately when idle.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.active.lock().is_none() {
                return;
            }
            notified.await;
        }
    }
}

/// Runs the pipeline for one job; the caller emits the terminal event.
async fn run_job(
    engine: Arc<dyn ContentEngine>,
    relay: Arc<ProgressRelay>,
    cancel: Arc<CancelToken>,
    request: JobRequest,
) -> Result<JobSummary, JobError> {
    let JobRequest {
        title_id,
        work_dir,
        mut destination,
        delete_after_copy,
        auto_decrypt,
        auto_extract,
    } = request;

    tokio::fs::create_dir_all(&work_dir).await?;

    let engine_request = EngineRequest {
        title_id: title_id.clone(),
        work_dir: work_dir.clone(),
        auto_decrypt,
        delete_encrypted: delete_after_copy,
        auto_extract,
    };

    let engine_relay = relay.clone();
    let engine_cancel = cancel.clone();
    let engine_result = tokio::task::spawn_blocking(move || {
        engine.run(&engine_request, engine_relay.as_ref(), &engine_cancel)
    })
    .await
    .map_err(|e| {
        JobError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("engine task failed: {e}"),
        ))
    })?;

    let returned = match engine_result {
        Ok(name) => name,
        Err(EngineError::Cancelled) => {
            cleanup_partial(&work_dir, &title_id).await;
            return Err(JobError::Cancelled);
        }
        Err(EngineError::Failed(message)) => return Err(JobError::Engine(message)),
    };

    // Checkpoint between engine completion and finalize.
    if cancel.is_requested() {
        cleanup_partial(&work_dir, &title_id).await;
        return Err(JobError::Cancelled);
    }

    relay.emit_phase(Phase::Finalizing, "Copying files to destination...");

    let finalize_work_dir = work_dir.clone();
    let finalize_title = title_id.clone();
    let finalize_cancel = cancel.clone();
    let finalize_result = tokio::task::spawn_blocking(move || {
        finalize(
            &finalize_work_dir,
            &finalize_title,
            &returned,
            destination.as_mut(),
            delete_after_copy,
            &finalize_cancel,
        )
    })
    .await
    .map_err(|e| {
        JobError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("finalize task failed: {e}"),
        ))
    })?;

    let (folder, file_count) = match finalize_result {
        Ok(v) => v,
        Err(JobError::Cancelled) => {
            cleanup_partial(&work_dir, &title_id).await;
            return Err(JobError::Cancelled);
        }
        Err(e) => return Err(e),
    };

    Ok(JobSummary {
        folder,
        total_mb: relay.total_mb(),
        file_count,
    })
}

/// Resolve the engine output, copy it into the destination store, and
/// optionally drop the working copy. Blocking; runs on the blocking pool.
fn finalize(
    work_dir: &Path,
    title_id: &str,
    returned: &str,
    destination: &mut dyn crate::materialize::DestinationStore,
    delete_after_copy: bool,
    cancel: &CancelToken,
) -> Result<(String, u64), JobError> {
    let local_dir = resolve_output_dir(work_dir, title_id, returned)?;
    let folder = local_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| title_id.to_string());
    let file_count = count_files(&local_dir);

    let progress = |name: &str, files: u64, bytes: u64| {
        tracing::trace!(file = name, files, bytes, "copied destination file");
    };
    match materialize_tree(&local_dir, destination, &progress, cancel) {
        Ok(stats) => {
            tracing::debug!(
                files = stats.files_copied,
                bytes = stats.bytes_written,
                "destination copy complete"
            );
        }
        Err(MaterializeError::Cancelled) => return Err(JobError::Cancelled),
        Err(e) => return Err(e.into()),
    }

    if delete_after_copy {
        remove_working_copy(work_dir, &local_dir);
    }

    Ok((folder, file_count))
}

/// Pick the finished output directory: the engine's returned path when it
/// exists and is named after the title, otherwise `work_dir/title_id`.
fn resolve_output_dir(work_dir: &Path, title_id: &str, returned: &str) -> Result<PathBuf, JobError> {
    let preferred = work_dir.join(title_id);

    let returned_dir = if returned.trim().is_empty() {
        preferred.clone()
    } else {
        let path = PathBuf::from(returned);
        if path.is_absolute() {
            path
        } else {
            work_dir.join(returned)
        }
    };

    let returned_matches_title = returned_dir
        .file_name()
        .map(|n| n.to_string_lossy().eq_ignore_ascii_case(title_id))
        .unwrap_or(false);

    if returned_dir.is_dir() && returned_matches_title {
        Ok(returned_dir)
    } else if preferred.is_dir() {
        Ok(preferred)
    } else {
        Err(JobError::OutputMissing(preferred))
    }
}

fn count_files(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .count() as u64
}

/// Drop the working copy after a successful destination copy, and the work
/// directory itself once empty. Failures are logged, never escalated.
fn remove_working_copy(work_dir: &Path, local_dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(local_dir) {
        tracing::warn!(
            path = %local_dir.display(),
            error = %e,
            "failed to remove working copy"
        );
        return;
    }
    if let Ok(mut entries) = std::fs::read_dir(work_dir) {
        if entries.next().is_none() {
            let _ = std::fs::remove_dir(work_dir);
        }
    }
}

/// Remove partial output left by a cancelled job. Best-effort.
async fn cleanup_partial(work_dir: &Path, title_id: &str) {
    let partial = work_dir.join(title_id);
    if let Err(e) = tokio::fs::remove_dir_all(&partial).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(
                path = %partial.display(),
                error = %e,
                "failed to remove partial output"
            );
        }
    }
}

/// Cached progress counters carried across events within one job.
#[derive(Debug, Default)]
struct RelayState {
    downloaded_mb: f32,
    total_mb: f32,
    decryption_progress: f32,
    extraction_progress: f32,
    is_decrypting: bool,
    is_extracting: bool,
}

/// Relays engine callbacks and controller transitions onto the bridge.
///
/// Engine callbacks may arrive from any thread; the counter cache is behind
/// a mutex held only long enough to take a snapshot.
struct ProgressRelay {
    bridge: ProgressBridge,
    title_id: String,
    state: Mutex<RelayState>,
}

impl ProgressRelay {
    fn new(bridge: ProgressBridge, title_id: String) -> Self {
        Self {
            bridge,
            title_id,
            state: Mutex::new(RelayState::default()),
        }
    }

    fn total_mb(&self) -> f32 {
        self.state.lock().total_mb
    }

    #[allow(clippy::too_many_arguments)]
    fn send(
        &self,
        phase: Phase,
        running: bool,
        status: &str,
        message: &str,
        current_file: u32,
        total_files: u32,
        result: Option<String>,
        is_error: bool,
    ) {
        let snapshot = {
            let state = self.state.lock();
            (
                state.downloaded_mb,
                state.total_mb,
                state.decryption_progress,
                state.extraction_progress,
                state.is_decrypting,
                state.is_extracting,
            )
        };
        self.bridge.emit(ProgressEvent {
            title_id: self.title_id.clone(),
            phase,
            running,
            status: status.to_string(),
            message: message.to_string(),
            current_file,
            total_files,
            downloaded_mb: snapshot.0,
            total_mb: snapshot.1,
            decryption_progress: snapshot.2,
            extraction_progress: snapshot.3,
            is_decrypting: snapshot.4,
            is_extracting: snapshot.5,
            result,
            is_error,
        });
    }

    fn emit_initializing(&self) {
        self.send(
            Phase::Initializing,
            true,
            "Starting…",
            "Initializing download...",
            0,
            0,
            None,
            false,
        );
    }

    fn emit_phase(&self, phase: Phase, message: &str) {
        self.send(phase, true, phase.label(), message, 0, 0, None, false);
    }

    fn emit_terminal(&self, outcome: &Result<JobSummary, JobError>) {
        match outcome {
            Ok(summary) => self.send(
                Phase::Complete,
                false,
                "Done",
                "Download completed successfully",
                1,
                1,
                Some(summary.result_text()),
                false,
            ),
            Err(JobError::Cancelled) => self.send(
                Phase::Error,
                false,
                "Cancelled",
                "Download cancelled by user",
                0,
                0,
                Some(JobError::Cancelled.to_string()),
                true,
            ),
            Err(e) => self.send(
                Phase::Error,
                false,
                "Error",
                &e.to_string(),
                0,
                0,
                Some(e.to_string()),
                true,
            ),
        }
    }
}

impl EngineObserver for ProgressRelay {
    fn on_update(
        &self,
        _percent: u8,
        message: &str,
        current_file: u32,
        total_files: u32,
        downloaded_mb: f32,
        total_mb: f32,
    ) {
        {
            let mut state = self.state.lock();
            state.downloaded_mb = downloaded_mb;
            state.total_mb = total_mb;
        }
        self.send(
            Phase::DownloadingContent,
            true,
            "Downloading...",
            message,
            current_file,
            total_files,
            None,
            false,
        );
    }

    fn on_phase_change(&self, phase: Phase) {
        self.emit_phase(phase, phase.transition_message());
    }

    fn on_decryption_progress(&self, percent: f32, message: &str) {
        {
            let mut state = self.state.lock();
            state.is_decrypting = true;
            state.decryption_progress = (percent / 100.0).clamp(0.0, 1.0);
        }
        self.send(
            Phase::Decrypting,
            true,
            "Decrypting...",
            &clip_message(message, STATUS_CLIP),
            0,
            0,
            None,
            false,
        );
    }

    fn on_extraction_progress(&self, percent: f32, message: &str) {
        {
            let mut state = self.state.lock();
            state.is_decrypting = false;
            state.is_extracting = true;
            state.extraction_progress = (percent / 100.0).clamp(0.0, 1.0);
        }
        self.send(
            Phase::Extracting,
            true,
            "Extracting...",
            &clip_message(message, STATUS_CLIP),
            0,
            0,
            None,
            false,
        );
    }
}

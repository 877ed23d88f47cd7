//! Type definitions for download jobs and progress events.

use crate::materialize::DestinationStore;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Pipeline stage of a download job.
///
/// The pipeline order is `Initializing` through `Finalizing`; `Complete` and
/// `Error` are terminal. Decrypt and extract are skipped when the job is
/// configured without them. The derived ordering matches pipeline order, so
/// observed phases within one job are non-decreasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Idle,
    Initializing,
    DownloadingMetadata,
    DownloadingContent,
    Decrypting,
    Extracting,
    Finalizing,
    Complete,
    Error,
}

impl Phase {
    /// Whether this phase ends the job.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Complete | Phase::Error)
    }

    /// Human-readable label, e.g. `"DOWNLOADING CONTENT"`.
    pub fn label(self) -> &'static str {
        match self {
            Phase::Idle => "IDLE",
            Phase::Initializing => "INITIALIZING",
            Phase::DownloadingMetadata => "DOWNLOADING METADATA",
            Phase::DownloadingContent => "DOWNLOADING CONTENT",
            Phase::Decrypting => "DECRYPTING",
            Phase::Extracting => "EXTRACTING",
            Phase::Finalizing => "FINALIZING",
            Phase::Complete => "COMPLETE",
            Phase::Error => "ERROR",
        }
    }

    /// Status text shown to sinks when this phase is entered.
    pub fn transition_message(self) -> &'static str {
        match self {
            Phase::DownloadingMetadata => "Downloading metadata...",
            Phase::Decrypting => "Decrypting files...",
            Phase::Extracting => "Extracting files...",
            Phase::Finalizing => "Finalizing...",
            _ => "Processing...",
        }
    }
}

/// One download attempt, handed to [`crate::JobController::start`].
///
/// The destination store is an opaque, capability-scoped tree; the controller
/// only ever creates entries and streams bytes through it.
pub struct JobRequest {
    /// Title identifier; doubles as the job/event correlation key.
    pub title_id: String,

    /// Local scratch directory, exclusively owned by this job while active.
    pub work_dir: PathBuf,

    /// Destination tree the finished output is copied into.
    pub destination: Box<dyn DestinationStore>,

    /// Remove the working copy after a successful destination copy.
    pub delete_after_copy: bool,

    /// Ask the engine to decrypt downloaded content in place.
    pub auto_decrypt: bool,

    /// Ask the engine to extract decrypted content.
    pub auto_extract: bool,
}

impl JobRequest {
    pub fn new(
        title_id: impl Into<String>,
        work_dir: impl Into<PathBuf>,
        destination: Box<dyn DestinationStore>,
    ) -> Self {
        Self {
            title_id: title_id.into(),
            work_dir: work_dir.into(),
            destination,
            delete_after_copy: true,
            auto_decrypt: true,
            auto_extract: true,
        }
    }
}

/// Immutable progress snapshot delivered to observer sinks.
///
/// Events for one `title_id` are observed in emission order; the terminal
/// event (`phase` of `Complete` or `Error`, `running == false`) is always
/// last. Sinks must tolerate a repeated terminal event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub title_id: String,
    pub phase: Phase,
    pub running: bool,
    pub status: String,
    pub message: String,
    pub current_file: u32,
    pub total_files: u32,
    pub downloaded_mb: f32,
    pub total_mb: f32,
    /// Decryption progress in `0..=1`.
    pub decryption_progress: f32,
    /// Extraction progress in `0..=1`.
    pub extraction_progress: f32,
    pub is_decrypting: bool,
    pub is_extracting: bool,
    /// Final outcome text; only present on terminal events.
    pub result: Option<String>,
    pub is_error: bool,
}

impl ProgressEvent {
    /// Whether this event ends the job.
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}

/// Summary of a completed job, rendered into the terminal event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    /// Name of the output folder placed in the destination.
    pub folder: String,
    pub total_mb: f32,
    pub file_count: u64,
}

impl JobSummary {
    pub fn result_text(&self) -> String {
        format!(
            "Download complete!\nFolder: {}\nSize: {} MB\nFiles: {}",
            self.folder,
            self.total_mb.round() as i64,
            self.file_count
        )
    }
}

/// Clip a status message for display sinks, appending `...` when truncated.
pub(crate) fn clip_message(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    let kept: String = message.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_order_matches_pipeline() {
        assert!(Phase::Initializing < Phase::DownloadingMetadata);
        assert!(Phase::DownloadingMetadata < Phase::DownloadingContent);
        assert!(Phase::DownloadingContent < Phase::Decrypting);
        assert!(Phase::Decrypting < Phase::Extracting);
        assert!(Phase::Extracting < Phase::Finalizing);
        assert!(Phase::Finalizing < Phase::Complete);
        assert!(Phase::Complete < Phase::Error);
    }

    #[test]
    fn terminal_phases() {
        assert!(Phase::Complete.is_terminal());
        assert!(Phase::Error.is_terminal());
        assert!(!Phase::Finalizing.is_terminal());
    }

    #[test]
    fn clip_keeps_short_messages() {
        assert_eq!(clip_message("short", 40), "short");
    }

    #[test]
    fn clip_truncates_long_messages() {
        let long = "x".repeat(60);
        let clipped = clip_message(&long, 40);
        assert_eq!(clipped.chars().count(), 40);
        assert!(clipped.ends_with("..."));
    }

    #[test]
    fn summary_result_text() {
        let summary = JobSummary {
            folder: "0005000E1234".to_string(),
            total_mb: 512.4,
            file_count: 37,
        };
        let text = summary.result_text();
        assert!(text.contains("Folder: 0005000E1234"));
        assert!(text.contains("Size: 512 MB"));
        assert!(text.contains("Files: 37"));
    }

    #[test]
    fn event_serializes_camel_case() {
        let event = ProgressEvent {
            title_id: "t".to_string(),
            phase: Phase::DownloadingContent,
            running: true,
            status: "Downloading...".to_string(),
            message: "File 1/3".to_string(),
            current_file: 1,
            total_files: 3,
            downloaded_mb: 1.0,
            total_mb: 3.0,
            decryption_progress: 0.0,
            extraction_progress: 0.0,
            is_decrypting: false,
            is_extracting: false,
            result: None,
            is_error: false,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"titleId\""));
        assert!(json.contains("\"DOWNLOADING_CONTENT\""));
        assert!(json.contains("\"downloadedMb\""));
    }
}

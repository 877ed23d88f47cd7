//! # Downloader
//!
//! Concurrent download job kernel: one background job at a time moves
//! through a multi-phase pipeline (initialize, fetch metadata, fetch
//! content, decrypt, extract, finalize), reports fine-grained progress to
//! any number of observer sinks, supports cooperative cancellation, and on
//! success copies the finished output tree into a user-chosen destination
//! store.
//!
//! The actual content transfer, decryption and extraction live behind the
//! [`ContentEngine`] trait; this crate owns the orchestration around it.
//!
//! ## Example
//!
//! ```rust,no_run
//! use downloader::{JobController, JobRequest, LocalDirStore};
//! use std::sync::Arc;
//!
//! # fn engine() -> Arc<dyn downloader::ContentEngine> { unimplemented!() }
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let controller = JobController::new(engine());
//! let mut events = controller.subscribe();
//!
//! let destination = Box::new(LocalDirStore::open("/storage/titles")?);
//! controller.start(JobRequest::new("0005000E1234", "/work", destination))?;
//!
//! while let Ok(event) = events.recv().await {
//!     println!("{}: {}", event.status, event.message);
//!     if event.is_terminal() {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod cancel;
pub mod controller;
pub mod engine;
pub mod error;
pub mod materialize;
pub mod types;

// Re-export main types
pub use bridge::ProgressBridge;
pub use cancel::CancelToken;
pub use controller::JobController;
pub use engine::{ContentEngine, EngineObserver, EngineRequest};
pub use error::{EngineError, JobError, MaterializeError};
pub use materialize::{
    materialize_tree, CopyProgress, DestinationStore, DirHandle, LocalDirStore, MaterializeStats,
};
pub use types::{JobRequest, JobSummary, Phase, ProgressEvent};

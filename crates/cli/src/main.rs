//! Command-line interface for the download job core.
//!
//! `download` runs the full job pipeline against a deterministic local-file
//! engine; `copy` drives the destination materializer on its own. Both wire
//! Ctrl-C to cooperative cancellation.

mod engine;

use clap::{Parser, Subcommand};
use downloader::{
    materialize_tree, CancelToken, JobController, JobRequest, LocalDirStore, MaterializeError,
};
use engine::LocalFileEngine;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Parser)]
#[command(name = "titledl")]
#[command(version, about = "Download titles from a local library into a destination tree", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a download job from a local title library
    Download {
        /// Title id to download
        title_id: String,

        /// Library directory holding one folder per title id
        #[arg(short, long)]
        library: PathBuf,

        /// Scratch directory for the in-flight download
        #[arg(short, long, default_value = "work")]
        work_dir: PathBuf,

        /// Destination root directory
        #[arg(short, long)]
        dest: PathBuf,

        /// Keep the working copy after a successful copy
        #[arg(long)]
        keep: bool,
    },

    /// Copy a finished output directory into a destination root
    Copy {
        /// Source directory (a finished download)
        source: PathBuf,

        /// Destination root directory
        #[arg(short, long)]
        dest: PathBuf,

        /// Print copy statistics as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Download {
            title_id,
            library,
            work_dir,
            dest,
            keep,
        } => handle_download(title_id, library, work_dir, dest, keep).await,
        Commands::Copy { source, dest, json } => handle_copy(source, dest, json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn handle_download(
    title_id: String,
    library: PathBuf,
    work_dir: PathBuf,
    dest: PathBuf,
    keep: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let controller = JobController::new(Arc::new(LocalFileEngine::new(library)));
    let mut events = controller.subscribe();

    let handler_controller = controller.clone();
    let handler_title = title_id.clone();
    ctrlc::set_handler(move || handler_controller.cancel(&handler_title))?;

    let destination = Box::new(LocalDirStore::open(&dest)?);
    let mut request = JobRequest::new(&title_id, &work_dir, destination);
    request.delete_after_copy = !keep;
    controller.start(request)?;

    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner} {msg}")?);

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        };

        bar.set_message(format!("{} {}", event.status, event.message));
        bar.tick();

        if event.is_terminal() {
            bar.finish_and_clear();
            let text = event.result.unwrap_or(event.message);
            if event.is_error {
                eprintln!("{text}");
                process::exit(if event.status == "Cancelled" { 130 } else { 1 });
            }
            println!("{text}");
            break;
        }
    }

    Ok(())
}

fn handle_copy(
    source: PathBuf,
    dest: PathBuf,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let cancel = Arc::new(CancelToken::new());
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.request())?;

    let mut store = LocalDirStore::open(&dest)?;

    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    let progress_bar = bar.clone();

    let result = materialize_tree(
        &source,
        &mut store,
        &move |name, files, bytes| {
            progress_bar.set_message(format!("{files} files, {} | {name}", HumanBytes(bytes)));
            progress_bar.tick();
        },
        &cancel,
    );
    bar.finish_and_clear();

    match result {
        Ok(stats) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!(
                    "Copied {} files ({}) into {}",
                    stats.files_copied,
                    HumanBytes(stats.bytes_written),
                    dest.display()
                );
            }
            Ok(())
        }
        Err(MaterializeError::Cancelled) => {
            eprintln!("Copy cancelled; partial destination content left in place");
            process::exit(130);
        }
        Err(e) => Err(e.into()),
    }
}

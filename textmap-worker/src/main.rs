//! textmap-worker binary
//!
//! One worker process: initializes the shared database, wires the queue,
//! object store, and task registry, and runs the pull loop until killed.
//! Scale out by starting more processes against the same data folder.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use textmap_common::config::{database_path, resolve_data_folder, WorkerConfig};
use textmap_common::db::init_database;
use textmap_worker::embeddings::LoggingEmbeddingSink;
use textmap_worker::queue::SqliteQueue;
use textmap_worker::store::FsObjectStore;
use textmap_worker::tasks::default_registry;
use textmap_worker::worker::Worker;
use textmap_worker::WorkerContext;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "textmap-worker", about = "Text map clustering worker")]
struct Args {
    /// Data folder (defaults to TEXTMAP_DATA, then the OS data dir)
    #[arg(long)]
    data: Option<String>,

    /// Configuration file (defaults to the standard locations)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = WorkerConfig::load(args.config.as_deref())?;
    let data_folder = resolve_data_folder(args.data.as_deref());
    info!(data_folder = %data_folder.display(), "starting textmap worker");

    let pool = init_database(&database_path(&data_folder)).await?;
    let ctx = WorkerContext::new(
        pool.clone(),
        config,
        Arc::new(SqliteQueue::new(pool)),
        Arc::new(FsObjectStore::new(data_folder.join("objects"))),
        Arc::new(LoggingEmbeddingSink),
        Arc::new(default_registry()),
    );

    Worker::new(ctx).run().await?;
    Ok(())
}

//! tusk server: resumable uploads over HTTP/1.1

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, Command};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tusk_core::StoreComposer;
use tusk_engine::{Config, Handler, HookEvent, HookReceivers};
use tusk_store::{FileLocker, FjallStore, MemoryLocker, MemoryStore};

mod handlers;
mod server;

use server::TuskServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let matches = Command::new("tusk-server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Resumable upload server")
        .arg(
            Arg::new("bind")
                .long("bind")
                .value_name("ADDR")
                .help("Bind address")
                .default_value("127.0.0.1:1080")
                .value_parser(value_parser!(SocketAddr)),
        )
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .value_name("PATH")
                .help("Data directory for the fjall store and lock files")
                .default_value("./data")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("store")
                .long("store")
                .help("Storage backend")
                .default_value("fjall")
                .value_parser(["fjall", "memory"]),
        )
        .arg(
            Arg::new("base-path")
                .long("base-path")
                .value_name("PATH")
                .help("Path or absolute URL uploads are addressed under")
                .default_value("/files/"),
        )
        .arg(
            Arg::new("max-size")
                .long("max-size")
                .value_name("BYTES")
                .help("Largest accepted upload")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("behind-proxy")
                .long("behind-proxy")
                .help("Trust X-Forwarded-* and Forwarded headers")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("hook-capacity")
                .long("hook-capacity")
                .value_name("N")
                .help("Capacity of each hook channel")
                .default_value("64")
                .value_parser(value_parser!(usize)),
        )
        .get_matches();

    let bind_addr = *matches
        .get_one::<SocketAddr>("bind")
        .context("missing bind address")?;
    let data_dir = matches
        .get_one::<PathBuf>("data-dir")
        .context("missing data directory")?
        .clone();
    let store_kind = matches
        .get_one::<String>("store")
        .context("missing store")?
        .clone();

    info!("Starting tusk server");
    info!("Bind address: {}", bind_addr);

    let composer = match store_kind.as_str() {
        "memory" => {
            info!("Using in-memory store");
            memory_composer()
        }
        _ => {
            info!("Data directory: {}", data_dir.display());
            fjall_composer(&data_dir)?
        }
    };

    let mut config = Config::new(composer);
    if let Some(base_path) = matches.get_one::<String>("base-path") {
        config.base_path = base_path.clone();
    }
    config.max_size = matches.get_one::<u64>("max-size").copied();
    config.respect_forwarded_headers = matches.get_flag("behind-proxy");
    if let Some(capacity) = matches.get_one::<usize>("hook-capacity") {
        config.hook_channel_capacity = *capacity;
    }
    config.notify_created_uploads = true;
    config.notify_complete_uploads = true;
    config.notify_terminated_uploads = true;

    let (handler, hooks) = Handler::new(config).context("invalid configuration")?;
    spawn_hook_loggers(hooks);

    let server = TuskServer::new(handler);
    match server.serve(bind_addr).await {
        Ok(()) => info!("Server shutdown gracefully"),
        Err(e) => {
            warn!("Server error: {}", e);
            return Err(e);
        }
    }

    Ok(())
}

fn memory_composer() -> StoreComposer {
    let store = Arc::new(MemoryStore::new());
    StoreComposer::new(store.clone())
        .with_terminater(store.clone())
        .with_concater(store.clone())
        .with_length_deferrer(store)
        .with_locker(Arc::new(MemoryLocker::new()))
}

fn fjall_composer(data_dir: &Path) -> anyhow::Result<StoreComposer> {
    let lock_dir = data_dir.join("locks");
    std::fs::create_dir_all(&lock_dir)
        .with_context(|| format!("failed to create {}", lock_dir.display()))?;

    let store = Arc::new(
        FjallStore::new(data_dir.join("uploads")).context("failed to open fjall store")?,
    );
    info!("Storage engine initialized");

    Ok(StoreComposer::new(store.clone())
        .with_terminater(store.clone())
        .with_concater(store.clone())
        .with_length_deferrer(store)
        .with_locker(Arc::new(FileLocker::new(lock_dir))))
}

/// Drain every enabled hook channel into the log
fn spawn_hook_loggers(hooks: HookReceivers) {
    let HookReceivers {
        created,
        progress,
        complete,
        terminated,
    } = hooks;

    for (name, receiver) in [
        ("created", created),
        ("progress", progress),
        ("complete", complete),
        ("terminated", terminated),
    ] {
        if let Some(receiver) = receiver {
            tokio::spawn(log_hooks(name, receiver));
        }
    }
}

async fn log_hooks(name: &'static str, mut receiver: Receiver<HookEvent>) {
    while let Some(event) = receiver.recv().await {
        info!(
            hook = name,
            id = %event.upload.id,
            offset = event.upload.offset,
            size = event.upload.size,
            remote = ?event.request.remote_addr,
            "upload event"
        );
    }
}

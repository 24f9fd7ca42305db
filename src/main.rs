//! PhotoBackup server binary.
//!
//! Receives authenticated photo uploads from the PhotoBackup mobile apps and
//! stores them under the media root of one named configuration. `init`
//! writes configurations, `run` serves one of them, `list` shows them.

mod app;
mod auth;
mod config;
mod error;
mod form;
mod http;
mod init;
mod locking;
mod logging;
mod probe;
mod storage;
mod tenant;
mod upload;

use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

use crate::config::{Cli, Command, RunArgs};
use crate::tenant::{ConfigError, ConfigStore};
use crate::upload::UploadConfig;

shadow!(build);

#[tokio::main]
async fn main() -> ExitCode {
    logging::init_logging();

    let cli = Cli::parse();
    let store = match ConfigStore::locate(cli.config) {
        Ok(store) => store,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Init(args) => init::run_init(&store, args)
            .await
            .map(|_| ())
            .map_err(|err| err.to_string()),
        Command::Run(args) => run_server(&store, args).await,
        Command::List => list_tenants(&store).map_err(|err| err.to_string()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn list_tenants(store: &ConfigStore) -> Result<(), ConfigError> {
    let names = store.list_tenant_names()?;
    println!("Runnable PhotoBackup configurations are:");
    for name in names {
        println!("{name}");
    }
    Ok(())
}

/// Loads one configuration and serves it until a termination signal.
async fn run_server(store: &ConfigStore, args: RunArgs) -> Result<(), String> {
    let tenant = store.load(args.name.as_deref()).map_err(|err| match err {
        ConfigError::Missing(_)
        | ConfigError::SectionMissing(_)
        | ConfigError::SectionIncomplete { .. } => {
            format!("{err}; run 'photobackup init' to create it")
        }
        other => other.to_string(),
    })?;
    let tenant = Arc::new(tenant);
    let upload_config = Arc::new(UploadConfig {
        max_body_bytes: args.max_upload_size,
        serialize_uploads: args.serialize_uploads,
    });

    let host = tenant
        .bind_address
        .parse::<IpAddr>()
        .map_err(|err| format!("invalid BindAddress {}: {err}", tenant.bind_address))?;
    let addr = SocketAddr::new(host, tenant.port);
    let app = app::build_router(tenant.clone(), upload_config);
    let handle = Handle::new();

    info!(
        section = tenant.section_name(),
        media_root = ?tenant.media_root,
        prefix = tenant.path_prefix.as_deref().unwrap_or(""),
        "Starting PhotoBackup server at {}",
        addr
    );

    tokio::spawn(shutdown_signal(handle.clone()));
    axum_server::bind(addr)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .map_err(|err| format!("server on {addr} failed: {err}"))
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}

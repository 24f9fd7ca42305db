//! `init` 子命令：交互式创建或更新一个配置分节。

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

use crate::auth::derive_credentials;
use crate::config::InitArgs;
use crate::http::normalize_prefix;
use crate::probe::probe;
use crate::storage::MediaRoot;
use crate::tenant::{ConfigError, ConfigStore, TenantConfig};

#[derive(Debug, Error)]
pub enum InitError {
    #[error("the media root is required")]
    MissingMediaRoot,
    #[error("the password must not be empty")]
    EmptyPassword,
    #[error("failed to create {}: {source}", path.display())]
    CreateMediaRoot { path: PathBuf, source: io::Error },
    #[error("failed to read input: {0}")]
    Prompt(#[from] io::Error),
    #[error("failed to hash the password: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Asks for whatever `args` leaves out, then merges the section into the
/// store. Returns the saved configuration.
pub async fn run_init(store: &ConfigStore, args: InitArgs) -> Result<TenantConfig, InitError> {
    println!("===============================");
    println!("PhotoBackup init process");
    println!("===============================");

    let media_root = match args.media_root {
        Some(path) => path,
        None => PathBuf::from(prompt(
            "The directory where to put the pictures (should be writable by the server you use): ",
        )?),
    };
    if media_root.as_os_str().is_empty() {
        return Err(InitError::MissingMediaRoot);
    }
    let password = match args.password {
        Some(password) => password,
        None => prompt("The server password: ")?,
    };

    let tenant = prepare_tenant(
        args.name,
        media_root,
        &password,
        args.bind_address,
        args.port,
        args.http_prefix,
        bcrypt::DEFAULT_COST,
    )
    .await?;
    store.save(&tenant)?;

    info!(
        section = tenant.section_name(),
        config = ?store.path(),
        "configuration saved"
    );
    if let Some(digest) = &tenant.password_digest {
        println!("Password to enter in the PhotoBackup client app: {digest}");
    }
    match &tenant.name {
        Some(name) => println!("Created, now launch the server with 'photobackup run {name}'"),
        None => println!("Created, now launch the server with 'photobackup run'"),
    }
    Ok(tenant)
}

/// 创建媒体目录、做写权限自检（仅告警）并生成凭据。
async fn prepare_tenant(
    name: Option<String>,
    media_root: PathBuf,
    password: &str,
    bind_address: String,
    port: u16,
    http_prefix: Option<String>,
    cost: u32,
) -> Result<TenantConfig, InitError> {
    if password.is_empty() {
        return Err(InitError::EmptyPassword);
    }

    if !media_root.is_dir() {
        tokio::fs::create_dir_all(&media_root)
            .await
            .map_err(|source| InitError::CreateMediaRoot {
                path: media_root.clone(),
                source,
            })?;
        info!(path = ?media_root, "created media root");
    }
    if let Err(err) = probe(&MediaRoot::new(media_root.clone())).await {
        warn!(path = ?media_root, error = %err, "media root is not writable by this user, check it!");
    }

    let credentials = derive_credentials(password, cost)?;
    Ok(TenantConfig {
        name: name.filter(|name| !name.trim().is_empty()),
        media_root,
        password_hash: credentials.hash,
        password_digest: Some(credentials.digest),
        bind_address,
        port,
        path_prefix: normalize_prefix(http_prefix.as_deref()),
    })
}

fn prompt(label: &str) -> io::Result<String> {
    let mut stdout = io::stdout();
    stdout.write_all(label.as_bytes())?;
    stdout.flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

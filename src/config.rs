//! CLI arguments and server configuration defaults.

use clap::{Args, Parser, Subcommand};
use shadow_rs::formatcp;
use std::path::PathBuf;

use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const CONFIG_FILE_NAME: &str = ".photobackup";
pub const SECTION_PREFIX: &str = "photobackup";
pub const UNNAMED_TENANT_LABEL: &str = "<unnamed one>";
pub const PROBE_FILE_NAME: &str = ".test_file_to_write";
pub const PROJECT_URL: &str = "https://photobackup.github.io/";
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8420;
pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 512 * 1024 * 1024;

/// 顶层命令行参数。
#[derive(Parser, Debug)]
#[command(name = "photobackup", version = VERSION_INFO, about = "PhotoBackup server")]
pub struct Cli {
    #[arg(
        short = 'c',
        long,
        global = true,
        env = "PHOTOBACKUP_CONFIG",
        help = "Config file path (defaults to ~/.photobackup)"
    )]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create or update a configuration section.
    Init(InitArgs),
    /// Serve one configuration section.
    Run(RunArgs),
    /// List the configurations stored in the config file.
    List,
}

/// `init` 子命令参数；缺省的值会交互式询问。
#[derive(Args, Debug)]
pub struct InitArgs {
    #[arg(help = "Configuration name (omit for the unnamed one)")]
    pub name: Option<String>,
    #[arg(short = 'm', long, help = "Directory where uploads are stored")]
    pub media_root: Option<PathBuf>,
    #[arg(long, env = "PHOTOBACKUP_PASSWORD", hide_env_values = true, help = "Server password")]
    pub password: Option<String>,
    #[arg(
        short = 'b',
        long,
        default_value = DEFAULT_BIND_ADDRESS,
        help = "Bind address written to the config"
    )]
    pub bind_address: String,
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT, help = "Port written to the config")]
    pub port: u16,
    #[arg(long, help = "Optional URL prefix the server is mounted under")]
    pub http_prefix: Option<String>,
}

/// `run` 子命令参数。
#[derive(Args, Debug)]
pub struct RunArgs {
    #[arg(help = "Configuration name (omit for the unnamed one)")]
    pub name: Option<String>,
    #[arg(
        long,
        env = "PHOTOBACKUP_MAX_UPLOAD_SIZE",
        default_value_t = DEFAULT_MAX_UPLOAD_SIZE,
        help = "Max request body size in bytes"
    )]
    pub max_upload_size: usize,
    #[arg(
        long,
        env = "PHOTOBACKUP_SERIALIZE_UPLOADS",
        help = "Serialize concurrent uploads of the same file name"
    )]
    pub serialize_uploads: bool,
}

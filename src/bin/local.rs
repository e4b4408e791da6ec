//! veilsocks local agent
//!
//! SOCKS5 front-end that:
//! - Accepts unauthenticated SOCKS5 CONNECT and UDP ASSOCIATE requests
//! - Encrypts each client stream towards the server agent
//! - Drops requests for blocked destinations without a reply

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;
use veilsocks::config::{generate_example_config, Config, LoggingConfig};
use veilsocks::LocalAgent;

/// veilsocks local agent - SOCKS5 front-end for an encrypted relay
#[derive(Parser, Debug)]
#[command(name = "veilsocks-local")]
#[command(about = "SOCKS5 front-end forwarding to a veilsocks server agent")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Write an example configuration to the config path and exit
    #[arg(long)]
    generate_config: bool,

    /// Server agent address
    #[arg(short = 's', long)]
    server_addr: Option<String>,

    /// Server agent port
    #[arg(short = 'p', long)]
    server_port: Option<u16>,

    /// SOCKS5 listen address
    #[arg(short = 'l', long)]
    local_addr: Option<String>,

    /// SOCKS5 listen port
    #[arg(short = 'b', long)]
    local_port: Option<u16>,

    /// Shared password
    #[arg(short = 'k', long)]
    password: Option<String>,

    /// Cipher method (e.g. aes-256-cfb)
    #[arg(short = 'm', long)]
    method: Option<String>,

    /// Server connect timeout in seconds
    #[arg(short = 't', long)]
    timeout: Option<u64>,

    /// Log level (error, warn, verbose, debug)
    #[arg(long)]
    level: Option<String>,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_path: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.generate_config {
        if Path::new(&args.config).exists() {
            bail!("{} already exists", args.config);
        }
        generate_example_config()
            .save(&args.config)
            .context("Failed to write example configuration")?;
        println!("Wrote example configuration to {}", args.config);
        return Ok(());
    }

    let config = Config::load_or_default(&args.config).context("Failed to load configuration")?;

    let mut logging = config.logging;
    if let Some(level) = args.level {
        logging.level = level;
    }
    if let Some(path) = args.log_path {
        logging.file = Some(path);
    }
    init_logging(&logging)?;

    let mut local = config.local.unwrap_or_default();
    if let Some(addr) = args.server_addr {
        local.server_addr = addr;
    }
    if let Some(port) = args.server_port {
        local.server_port = port;
    }
    if let Some(addr) = args.local_addr {
        local.local_addr = addr;
    }
    if let Some(port) = args.local_port {
        local.local_port = port;
    }
    if let Some(password) = args.password {
        local.password = password;
    }
    if let Some(method) = args.method {
        local.method = method;
    }
    if let Some(timeout) = args.timeout {
        local.timeout = timeout;
    }

    if local.password.is_empty() {
        bail!("No password configured (set password in [local] or pass -k)");
    }

    info!("veilsocks local agent v{}", veilsocks::VERSION);
    if !local.blocked_hosts.is_empty() {
        info!("Blocking {} host(s)", local.blocked_hosts.len());
    }

    let agent = LocalAgent::bind(&local)
        .await
        .context("Failed to start local agent")?;

    tokio::select! {
        result = agent.run() => result.context("Local agent stopped")?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    Ok(())
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(logging.filter_directive()).context("Invalid log level")?;

    match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    Ok(())
}

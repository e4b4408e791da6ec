//! veilsocks server agent
//!
//! Relay server that:
//! - Decrypts relay frames from local agents
//! - Connects to the destination named in each frame
//! - Closes every connection after the configured timeout

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;
use veilsocks::config::{generate_example_config, Config, LoggingConfig};
use veilsocks::ServerAgent;

/// veilsocks server agent - decrypting relay for local agents
#[derive(Parser, Debug)]
#[command(name = "veilsocks-server")]
#[command(about = "Relay server for veilsocks local agents")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Write an example configuration to the config path and exit
    #[arg(long)]
    generate_config: bool,

    /// Listen address
    #[arg(short = 's', long)]
    server_addr: Option<String>,

    /// Listen port
    #[arg(short = 'p', long)]
    server_port: Option<u16>,

    /// Shared password
    #[arg(short = 'k', long)]
    password: Option<String>,

    /// Cipher method (e.g. aes-256-cfb)
    #[arg(short = 'm', long)]
    method: Option<String>,

    /// Per-connection timeout in seconds (0 disables)
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

    let mut server = config.server.unwrap_or_default();
    if let Some(addr) = args.server_addr {
        server.server_addr = addr;
    }
    if let Some(port) = args.server_port {
        server.server_port = port;
    }
    if let Some(password) = args.password {
        server.password = password;
    }
    if let Some(method) = args.method {
        server.method = method;
    }
    if let Some(timeout) = args.timeout {
        server.timeout = timeout;
    }

    if server.password.is_empty() {
        bail!("No password configured (set password in [server] or pass -k)");
    }

    info!("veilsocks server agent v{}", veilsocks::VERSION);

    let agent = ServerAgent::bind(&server)
        .await
        .context("Failed to start server agent")?;

    tokio::select! {
        result = agent.run() => result.context("Server agent stopped")?,
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

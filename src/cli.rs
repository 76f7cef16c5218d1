//! Command line interface
//!
//! Flags override the matching configuration file values.

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpStream;

use crate::backend::{GdbAdapter, SessionIdentity};
use crate::common::config::Config;
use crate::common::{logging, Error, Result};
use crate::dbgp::Connection;

#[derive(Parser, Debug)]
#[command(name = "dbgp-gateway", about = "Debug native programs from a DBGP IDE through gdb")]
#[command(version, long_about = None)]
pub struct Cli {
    /// Program to debug
    pub target: PathBuf,

    /// IDE or DBGP proxy address to dial (host:port)
    #[arg(long, env = "DBGP_DIAL")]
    pub dial: Option<String>,

    /// gdb executable (name in PATH or path)
    #[arg(long)]
    pub gdb: Option<PathBuf>,

    /// Milliseconds of console silence that end a reply
    #[arg(long = "idle-ms")]
    pub idle_ms: Option<u64>,

    /// IDE key echoed in the init handshake
    #[arg(long, env = "DBGP_IDEKEY", default_value = "")]
    pub ide_key: String,

    /// Session cookie echoed in the init handshake
    #[arg(long, env = "DBGP_COOKIE", default_value = "")]
    pub session: String,

    /// Configuration file (default: platform config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Also write logs to a file; without a value the default log location is used
    #[arg(long, num_args = 0..=1)]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Log file requested on the command line
    pub fn log_file(&self) -> Option<PathBuf> {
        match &self.log_file {
            Some(Some(path)) => Some(path.clone()),
            Some(None) => logging::default_log_path(),
            None => None,
        }
    }

    /// Apply command line overrides on top of `config`
    pub fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(dial) = &self.dial {
            config.gateway.dial = dial.clone();
        }
        if let Some(gdb) = &self.gdb {
            config.gdb.path = gdb.clone();
        }
        if let Some(idle_ms) = self.idle_ms {
            config.gdb.idle_window_ms = idle_ms;
        }
        if config.gdb.idle_window_ms == 0 {
            return Err(Error::Config("idle window must be at least 1 ms".to_string()));
        }
        Ok(())
    }
}

/// Run one debugging session
pub async fn run(cli: Cli, mut config: Config) -> Result<()> {
    cli.apply(&mut config)?;

    let target = cli.target.canonicalize().unwrap_or(cli.target);
    let identity = SessionIdentity {
        app_id: config.gateway.app_id.clone(),
        ide_key: cli.ide_key,
        session: cli.session,
    };

    let backend = GdbAdapter::spawn(&config.gdb, &target, identity)?;
    tracing::info!(debuggee = %target.display(), "Debugger started");

    let addr = config.gateway.dial.clone();
    let stream = TcpStream::connect(&addr)
        .await
        .map_err(|e| Error::ConnectFailed {
            addr: addr.clone(),
            error: e.to_string(),
        })?;
    tracing::info!(%addr, "Connected to IDE");

    Connection::new(stream, Box::new(backend))
        .with_max_message_bytes(config.gateway.max_message_bytes)
        .run()
        .await
}

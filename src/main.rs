//! DBGP gateway - debug native programs from any DBGP IDE
//!
//! Dials the IDE (or a DBGP proxy), starts gdb on the target and serves the
//! session until the IDE hangs up.

use clap::Parser;
use dbgp::cli::{self, Cli};
use dbgp::common::{config::Config, logging};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let log_file = cli.log_file().or_else(|| config.logging.file.clone());
    let guard = logging::init(cli.verbose, log_file.as_deref());

    if let Err(e) = cli::run(cli, config).await {
        tracing::error!("Session failed: {}", e);
        eprintln!("Error: {e}");
        drop(guard);
        std::process::exit(1);
    }
}

//! DMR IPSC link node: connects to, or accepts registrations from,
//! Motorola-dialect IPSC peers and dispatches authenticated traffic to
//! the host application.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ipsclink::{LinkNode, LoggingHandler};

#[derive(Parser, Debug)]
#[command(name = "ipsclink", version, about = "DMR IPSC link node")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short = 'c', long = "config")]
    config: String,

    /// Default tracing directive, overridden by RUST_LOG if set.
    #[arg(long = "log_level", default_value = "info")]
    log_level: String,

    /// Log sink: stderr, file, syslog, or stream. Only stderr is
    /// actually backed by a writer in this build; the others degrade
    /// to stderr with a warning.
    #[arg(long = "log_handle", default_value = "stderr")]
    log_handle: String,
}

fn init_logging(default_directive: &str, handle: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if handle != "stderr" {
        tracing::warn!(
            requested = handle,
            "log handle not backed by a dedicated writer in this build, using stderr"
        );
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(&args.log_level, &args.log_handle);

    let config = match ipsclink::config::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "fatal: could not load configuration");
            std::process::exit(1);
        }
    };

    let handler = Arc::new(LoggingHandler);
    let node = match LinkNode::start(config.systems, handler).await {
        Ok(n) => n,
        Err(e) => {
            tracing::error!(error = %e, "fatal: could not start link node");
            std::process::exit(1);
        }
    };

    tracing::info!("ipsclink running, press Ctrl+C to exit");
    tokio::signal::ctrl_c().await.ok();

    tracing::info!("shutting down");
    node.shutdown().await;
}

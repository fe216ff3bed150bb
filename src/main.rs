use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use huddle_server::ServerConfig;
use huddle_telemetry::TelemetryConfig;
use tracing::Level;

#[derive(Parser)]
#[command(name = "huddle")]
#[command(about = "Facilitated pair-session server")]
struct Args {
    /// JSON config file. Keys not present keep their defaults.
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config and HUDDLE_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Listen port, 0 for ephemeral (overrides config and HUDDLE_PORT)
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Enter review automatically when the session deadline passes
    #[arg(long)]
    auto_review: bool,

    /// Default log level (RUST_LOG takes precedence)
    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Per-module level override, e.g. `huddle_server=debug` (repeatable)
    #[arg(long = "log-module", value_name = "MODULE=LEVEL", value_parser = huddle_telemetry::parse_module_level)]
    log_modules: Vec<(String, Level)>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

impl Args {
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.auto_review {
            config.auto_review_on_deadline = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    huddle_telemetry::init_telemetry(&TelemetryConfig {
        log_level: args.log_level,
        module_levels: args.log_modules.clone(),
        json: args.json_logs,
    })
    .context("failed to initialize logging")?;

    let mut config = ServerConfig::load(args.config.as_deref()).context("failed to load config")?;
    args.apply(&mut config);
    config.validate();

    let metrics = match huddle_server::metrics::install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "metrics disabled");
            None
        }
    };

    let handle = huddle_server::start(config, metrics)
        .await
        .context("failed to start server")?;
    tracing::info!(port = handle.port, "huddle server ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}

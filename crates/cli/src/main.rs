//! `scriptmux` -- run packaged automation scripts.
//!
//! Discovers scripts under the scripts directory, exposes each as a
//! subcommand and runs the selected one, optionally reporting to a
//! monitoring server.
//!
//! # Environment variables
//!
//! | Variable                                 | Required | Default                  | Description                               |
//! |------------------------------------------|----------|--------------------------|-------------------------------------------|
//! | `SCRIPTMUX_ROOT_DIR`                     | no       | current directory        | Application root                          |
//! | `SCRIPTMUX_SCRIPTS_PATH`                 | no       | `<root>/scripts`         | One subdirectory per script               |
//! | `SCRIPTMUX_MODULES_PATH`                 | no       | `<root>/modules`         | Shared modules path passed to scripts     |
//! | `SCRIPTMUX_CONFIG_PATH`                  | no       | `<root>/config`          | Configuration directory                   |
//! | `SCRIPTMUX_APPLICATION_CONFIG_PATH`      | no       | `<config>/application`   | Application configuration directory       |
//! | `SCRIPTMUX_LOG_DIR`                      | no       | `<root>/logs`            | Log directory passed to scripts           |
//! | `SCRIPTMUX_MONITORING_URL`               | no       | --                       | Global monitoring `statusUrl`             |
//! | `SCRIPTMUX_MONITORING_TIMEOUT_MS`        | no       | `5000`                   | Handshake timeout                         |
//! | `SCRIPTMUX_MONITORING_STATS_INTERVAL_MS` | no       | `500`                    | Stats heartbeat period                    |
//! | `SCRIPTMUX_MONITORING_IGNORE_WARNINGS`   | no       | `false`                  | Do not relay warnings                     |
//! | `STAGE`                                  | no       | `dev`                    | Stage when no stage flag is given         |
//! | `NODE_ENV`                               | no       | --                       | Stage when `STAGE` is unset               |
//! | `RUST_LOG`                               | no       | from `-v` / `-q` / `-d`  | Overrides the log filter                  |

use scriptmux_cli::dispatch::{Dispatcher, Plan};
use scriptmux_cli::error::CliError;
use scriptmux_cli::registry::CommandRegistry;
use scriptmux_cli::BIN_NAME;
use scriptmux_core::context::AppContext;
use scriptmux_core::engine::SubprocessEngine;
use scriptmux_core::manifest::load_manifests;
use scriptmux_core::runtime::LogLevel;

use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

type FilterHandle = reload::Handle<EnvFilter, Registry>;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenvy::dotenv().ok();

    let (filter, filter_handle) = reload::Layer::new(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| level_filter(LogLevel::Info)),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let code = match run(&filter_handle).await {
        Ok(code) => code,
        Err(CliError::Usage { error, help }) => {
            eprintln!("{error}\n");
            eprintln!("{help}");
            1
        }
        Err(e) => {
            tracing::error!(error = %e, "Cannot start");
            1
        }
    };

    std::process::exit(code);
}

async fn run(filter_handle: &FilterHandle) -> Result<i32, CliError> {
    let ctx = AppContext::from_env()?;
    let manifests = load_manifests(&ctx.paths.scripts_path).await?;
    tracing::debug!(count = manifests.len(), path = %ctx.paths.scripts_path.display(), "Loaded scripts");

    let registry = CommandRegistry::new(BIN_NAME, manifests)?;
    let dispatcher = Dispatcher::new(ctx, registry, SubprocessEngine::new());

    match dispatcher.plan(std::env::args_os())? {
        Plan::Help(text) => {
            println!("{text}");
            Ok(0)
        }
        Plan::Run(plan) => {
            if std::env::var_os("RUST_LOG").is_none() {
                if let Err(e) = filter_handle.reload(level_filter(plan.log_level)) {
                    tracing::warn!(error = %e, "Could not apply log level");
                }
            }
            Ok(dispatcher.execute(*plan).await)
        }
    }
}

fn level_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::new(format!(
        "scriptmux={level},scriptmux_cli={level},scriptmux_core={level},scriptmux_monitor={level}"
    ))
}

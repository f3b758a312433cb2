use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use vigil::cli::output::{self, OutputMode};
use vigil::cli::simulate::{self, SimulationOptions};
use vigil::cli::{Cli, Commands};
use vigil::config::{AppConfig, LoggingConfig};
use vigil::error::VigilError;
use vigil::services::HealthService;
use vigil::supervisor::Infrastructure;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mode = OutputMode::from_json_flag(cli.json);

    match &cli.command {
        Commands::Simulate {
            agents,
            ticks,
            seed,
            degrade,
        } => {
            let config = load_config(&cli.config_dir)?;
            let _guard = init_logging(&config.logging);

            let service = HealthService::from_config(&config, Infrastructure::simulated());
            let watchdog = service.watchdog(&config);
            let options = SimulationOptions {
                agents: *agents,
                ticks: *ticks,
                seed: *seed,
                degrade: (*degrade).min(*agents),
            };

            let report = simulate::run_simulation(&service, &watchdog, &options).await;
            info!(
                "Simulation finished with {} recovery executions",
                report.executions.len()
            );
            simulate::print_report(&report, mode)?;
        }
        Commands::Config { dir } => {
            let dir = dir.as_deref().unwrap_or(&cli.config_dir);
            match load_config(dir) {
                Ok(config) => {
                    output::print_success(&format!("Configuration in {} is valid", dir));
                    match mode {
                        OutputMode::Table => println!("{}", toml::to_string_pretty(&config)?),
                        OutputMode::Json => output::print_item(&config, mode)?,
                    }
                }
                Err(e) => {
                    output::print_error(&e.to_string());
                    return Err(e.into());
                }
            }
        }
    }

    Ok(())
}

fn load_config(dir: &str) -> Result<AppConfig, VigilError> {
    let config = AppConfig::load_from(dir)?;
    config.validate().map_err(VigilError::InvalidConfig)?;
    Ok(config)
}

/// Console logging to stderr plus an optional daily rolling file.
///
/// The returned guard must outlive the program's logging.
fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},vigil=debug", logging.level))
    });

    // `rolling::daily` panics if it cannot create the file, so check writability first
    let (file_layer, guard) = match logging.dir.as_deref() {
        Some(dir) => match preflight_log_dir(dir) {
            Ok(()) => {
                let appender = tracing_appender::rolling::daily(dir, "vigil.log");
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true);
                (Some(layer), Some(guard))
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    dir, e
                );
                (None, None)
            }
        },
        None => (None, None),
    };

    let (plain, json) = if logging.json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr);
        (None, Some(layer))
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr);
        (Some(layer), None)
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .with(file_layer)
        .try_init();

    guard
}

fn preflight_log_dir(dir: &str) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let probe = std::path::Path::new(dir).join(".vigil_write_test");
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&probe)?;
    let _ = std::fs::remove_file(&probe);
    Ok(())
}

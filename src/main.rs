mod acquisition;
mod config;
mod devices;
mod logging;
mod output;
mod run;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

use acquisition::AcquisitionController;
use config::{ConfigError, Settings};
use devices::{DeviceClient, WavePlusGateway};
use run::RunSummary;

/// Poll Airthings Wave Plus monitors and save each reading as JSON
#[derive(Parser, Debug)]
#[command(name = "waveplus-poller")]
#[command(version)]
struct Cli {
    /// The path to the configuration file
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    #[arg(default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// The serial number for the device. Can be a comma separated list
    #[arg(short = 'd', long = "device-serial", value_name = "SERIALS")]
    device_serial: Option<String>,

    /// Gateway host, overrides the config file
    #[arg(long = "gateway-host", value_name = "HOST")]
    gateway_host: Option<String>,

    /// Gateway port, overrides the config file
    #[arg(long = "gateway-port", value_name = "PORT")]
    gateway_port: Option<u16>,
}

#[derive(Error, Debug)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to set up logging: {0}")]
    Logging(std::io::Error),

    #[error("Failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Polling thread failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Normal completion and user interruption.
const EXIT_SUCCESS: u8 = 0;
/// A fatal error escaped the run.
const EXIT_FAILURE: u8 = 1;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let settings = match load_settings(Cli::parse()) {
        Ok(settings) => settings,
        Err(e) => return ExitCode::from(exit_status(&logging::console(), Err(e))),
    };

    let (dispatch, file_guard) = match logging::init(&settings.logging) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            return ExitCode::from(exit_status(&logging::console(), Err(AppError::Logging(e))));
        }
    };
    let _default = tracing::dispatcher::set_default(&dispatch);
    info!("Script Initialized");

    let worker = tokio::task::spawn_blocking({
        let dispatch = dispatch.clone();
        move || tracing::dispatcher::with_default(&dispatch, || poll_devices(&settings))
    });

    let result = tokio::select! {
        joined = worker => joined.map_err(AppError::from).and_then(|polled| polled),
        Ok(()) = tokio::signal::ctrl_c() => {
            info!("Script interrupted by user");
            drop(file_guard);
            // The worker may be parked in a retry pause; do not wait for it.
            std::process::exit(i32::from(EXIT_SUCCESS));
        }
    };

    let status = exit_status(&dispatch, result);
    drop(file_guard);
    ExitCode::from(status)
}

/// Resolve the run's settings and apply command-line gateway overrides.
fn load_settings(cli: Cli) -> Result<Settings, AppError> {
    let mut settings = config::resolve(&cli.config, cli.device_serial.as_deref())?;
    if let Some(host) = cli.gateway_host {
        settings.gateway.host = host;
    }
    if let Some(port) = cli.gateway_port {
        settings.gateway.port = port;
    }
    Ok(settings)
}

fn poll_devices(settings: &Settings) -> Result<(), AppError> {
    let gateway = WavePlusGateway::new(
        &settings.gateway.host,
        settings.gateway.port,
        settings.gateway.timeout(),
    );
    let mut controller = AcquisitionController::new(gateway, settings.acquisition.policy());
    poll_with(settings, &mut controller).map(|_| ())
}

/// Create the output directory and poll every configured device once.
fn poll_with<C, S>(
    settings: &Settings,
    controller: &mut AcquisitionController<C, S>,
) -> Result<RunSummary, AppError>
where
    C: DeviceClient,
    S: FnMut(Duration),
{
    let output_dir = &settings.output.path;
    std::fs::create_dir_all(output_dir).map_err(|source| AppError::OutputDir {
        path: output_dir.clone(),
        source,
    })?;
    info!("Output path: {}", output_dir.display());
    info!(
        "Polling {} device(s), up to {} attempts each",
        settings.devices.len(),
        controller.policy().max_attempts
    );

    let summary = run::run(controller, &settings.devices, output_dir);
    info!(
        "Run complete: {} saved, {} skipped",
        summary.saved.len(),
        summary.skipped.len()
    );
    Ok(summary)
}

/// Process exit status for a finished run. A fatal error is logged once.
fn exit_status(dispatch: &tracing::Dispatch, result: Result<(), AppError>) -> u8 {
    match result {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            tracing::dispatcher::with_default(dispatch, || error!("Script failed with error: {}", e));
            EXIT_FAILURE
        }
    }
}

//! PlutoAcq command-line tool
//!
//! Lists supported front ends and streams IQ samples for a fixed duration,
//! logging health and throughput once per second.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use plutoacq_rs::{
    backend::{self, IioTransport, SimFrontEnd, SimTransport},
    config::{AppConfig, ConfigRepository, JsonConfigStore, MemoryConfigStore, StaticEndpoint},
    PipelineController,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Description of the simulated front end
const SIM_DESCRIPTION: &str = "PlutoSDR (ad9361), serial=SIM0001";

#[derive(Parser, Debug)]
#[command(name = "plutoacq")]
#[command(about = "IQ acquisition from AD9361-class SDR front ends")]
struct Cli {
    /// Use the in-memory simulator instead of real hardware
    #[arg(long, global = true)]
    simulate: bool,

    /// Configuration file (defaults to the app data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Extra endpoint listed after every scan, e.g. `ip:192.168.2.1`
    #[arg(long, global = true)]
    endpoint: Vec<String>,

    /// Also write logs to daily files in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List supported devices
    List,
    /// Stream samples and report health
    Stream {
        /// Device description (defaults to the last selected device)
        #[arg(short, long)]
        device: Option<String>,

        /// Center frequency in Hz
        #[arg(short, long)]
        freq: Option<f64>,

        /// Sample rate in Hz
        #[arg(short = 'r', long)]
        sample_rate: Option<u32>,

        /// How long to stream, in seconds
        #[arg(short, long, default_value = "10")]
        seconds: u64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.log_dir.as_ref());

    let config_path = cli.config.clone().or_else(AppConfig::default_path);
    let mut config = config_path
        .as_ref()
        .map(AppConfig::load_or_default)
        .unwrap_or_default();
    for uri in &cli.endpoint {
        config.discovery.static_endpoints.push(StaticEndpoint {
            description: format!("Default ({})", uri.trim_start_matches("ip:")),
            uri: uri.clone(),
        });
    }

    let (transport, store) = build_backend(cli.simulate)?;
    let (mut controller, blocks) = PipelineController::new(transport, store, config);

    match cli.command {
        Command::List => {
            controller.refresh_devices();
            if controller.devices().is_empty() {
                println!("No supported devices found");
            }
            for device in controller.devices() {
                println!(
                    "{}\n    uri: {}  backend: {}  model: {}  serial: {}",
                    device.display_name, device.uri, device.backend, device.model, device.serial
                );
            }
        }
        Command::Stream {
            device,
            freq,
            sample_rate,
            seconds,
        } => {
            controller.refresh_devices();
            let rate = match device {
                Some(description) => controller.select_device(&description),
                None => controller.select_last_device(),
            }
            .context("No device to stream from")?;
            tracing::info!("Selected sample rate {}", rate);

            if let Some(rate) = sample_rate {
                controller.set_sample_rate(rate)?;
            }
            if let Some(freq) = freq {
                controller.tune(freq)?;
            }

            controller.start().context("Failed to start acquisition")?;

            let deadline = Instant::now() + Duration::from_secs(seconds);
            let mut next_report = Instant::now() + Duration::from_secs(1);
            let mut peak = 0.0f32;
            while Instant::now() < deadline {
                if let Some(block) = blocks.recv_timeout(Duration::from_millis(100)) {
                    peak = block.data.iter().fold(peak, |acc, v| acc.max(v.abs()));
                    blocks.recycle(block);
                }
                if Instant::now() >= next_report {
                    let report = controller.render();
                    tracing::info!("{} | peak {:.3}", report, peak);
                    peak = 0.0;
                    next_report += Duration::from_secs(1);
                    if !controller.is_streaming() {
                        break;
                    }
                }
            }

            controller.stop();
            let report = controller.render();
            if let Some(error) = report.last_error {
                bail!("Acquisition ended with an error: {}", error);
            }
            tracing::info!(
                "Done: {} blocks, {} samples",
                report.stats.blocks_published,
                report.stats.samples_published
            );
        }
    }

    Ok(())
}

fn init_logging(log_dir: Option<&PathBuf>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,plutoacq_rs=debug"));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "plutoacq.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
            None
        }
    }
}

fn build_backend(
    simulate: bool,
) -> anyhow::Result<(Arc<dyn IioTransport>, Arc<dyn ConfigRepository>)> {
    if simulate {
        tracing::info!("Using simulated front end");
        let front_end = SimFrontEnd::new().with_refill_delay(Duration::from_millis(50));
        let transport = SimTransport::new().with_device(SIM_DESCRIPTION, "usb:0.0.1", front_end);
        return Ok((Arc::new(transport), Arc::new(MemoryConfigStore::new())));
    }

    let Some(transport) = backend::hardware_transport() else {
        bail!("Built without libiio support; rebuild with --features libiio or use --simulate");
    };
    let store = JsonConfigStore::open_default().context("Failed to open device settings")?;
    tracing::info!("Device settings at {:?}", store.path());
    Ok((transport, Arc::new(store)))
}

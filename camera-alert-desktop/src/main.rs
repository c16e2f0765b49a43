use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use camera_alert_core::{HttpTransport, MonitorController, MonitorOptions};
use camera_alert_desktop::console::{self, Command, Outcome};
use camera_alert_desktop::settings_store::{default_settings_path, load_settings, save_settings};
use camera_alert_desktop::{LogDelegate, RodioOutput, V4lCameraPlatform};

/// Watch a camera, classify sleep state remotely and play alert sounds.
#[derive(Parser, Debug)]
#[command(name = "camera-alert", version)]
struct Args {
    /// Settings file (default: user config directory)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Analysis API base URL, overriding the settings file
    #[arg(long)]
    base_url: Option<String>,

    /// Continuous analysis interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Start continuous analysis immediately
    #[arg(long)]
    continuous: bool,

    /// Directory that relative alert track paths resolve against
    #[arg(long, default_value = ".")]
    sounds_dir: PathBuf,
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let settings_path = args.settings.unwrap_or_else(default_settings_path);
    let mut settings = load_settings(&settings_path)?;
    if let Some(base_url) = args.base_url {
        settings.api_base_url = base_url;
    }
    if let Some(ms) = args.interval_ms {
        settings.analysis_interval_ms = ms;
    }

    let monitor = MonitorController::new(
        Arc::new(V4lCameraPlatform::new()),
        Arc::new(HttpTransport::from_settings(&settings)?),
        Box::new(RodioOutput::new(&args.sounds_dir)?),
        MonitorOptions::default(),
    )?;
    monitor.set_delegate(LogDelegate::new());

    // A failed start is not fatal; the user can pick another camera.
    match monitor.initialize(&settings) {
        Ok(info) => println!("camera {} live at {}", info.device_id, info.resolution()),
        Err(e) => eprintln!("camera unavailable: {e}"),
    }

    let interval = settings.continuous_config().period;
    if args.continuous {
        if let Err(e) = console::execute(&monitor, Command::Auto(None), interval) {
            eprintln!("{e}");
        }
    }

    println!("{}", console::HELP);
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let command = match Command::parse(&line?) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(msg) => {
                eprintln!("{msg}");
                continue;
            }
        };
        match console::execute(&monitor, command, interval) {
            Ok(Outcome::Continue(text)) => println!("{text}"),
            Ok(Outcome::CameraChanged(id)) => {
                println!("camera {id}");
                settings.camera_id = Some(id);
                if let Err(e) = save_settings(&settings, &settings_path) {
                    log::warn!("{e}");
                }
            }
            Ok(Outcome::Quit) => break,
            Err(e) => eprintln!("{e}"),
        }
        io::stdout().flush()?;
    }

    monitor.shutdown();
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            eprintln!("camera-alert: {e}");
            ExitCode::FAILURE
        }
    }
}

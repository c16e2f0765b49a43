//! Line commands for the interactive monitor.

use std::time::Duration;

use camera_alert_core::{
    ContinuousConfig, MonitorController, MonitorError, MonitorSnapshot, Resolution, SleepState,
};

pub const HELP: &str = "\
commands:
  analyze              analyze the current frame once
  auto [ms]            analyze continuously (default: settings interval)
  stop-auto            stop continuous analysis
  force <state>        force the alert for SLEEPING/STRUGGLING/AWAKE (again to toggle off)
  clear-force          return the alert to the latest analysis
  stop-alarm           fade the alert out
  camera <id>          switch to a camera
  toggle               switch to the next camera
  resolution <WxH>     change the requested resolution
  devices              list cameras
  status               print the monitor state
  quit                 shut down";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Analyze,
    Auto(Option<Duration>),
    StopAuto,
    Force(SleepState),
    ClearForce,
    StopAlarm,
    Camera(String),
    Toggle,
    Resolution(Resolution),
    Devices,
    Status,
    Help,
    Quit,
}

fn parse_resolution(text: &str) -> Option<Resolution> {
    let (w, h) = text.split_once(['x', 'X'])?;
    Some(Resolution::new(w.trim().parse().ok()?, h.trim().parse().ok()?))
}

impl Command {
    /// Parse one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Command>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let arg = words.next();
        let command = match (verb.to_ascii_lowercase().as_str(), arg) {
            ("analyze", _) => Command::Analyze,
            ("auto", None) => Command::Auto(None),
            ("auto", Some(ms)) => {
                let ms: u64 = ms.parse().map_err(|_| format!("invalid interval: {ms}"))?;
                Command::Auto(Some(Duration::from_millis(ms)))
            }
            ("stop-auto", _) => Command::StopAuto,
            ("force", Some(state)) => match SleepState::parse(state) {
                SleepState::Unknown => return Err(format!("unknown state: {state}")),
                state => Command::Force(state),
            },
            ("clear-force", _) => Command::ClearForce,
            ("stop-alarm", _) => Command::StopAlarm,
            ("camera", Some(id)) => Command::Camera(id.to_string()),
            ("toggle", _) => Command::Toggle,
            ("resolution", Some(text)) => Command::Resolution(
                parse_resolution(text).ok_or_else(|| format!("invalid resolution: {text}"))?,
            ),
            ("devices", _) => Command::Devices,
            ("status", _) => Command::Status,
            ("help", _) | ("?", _) => Command::Help,
            ("quit", _) | ("exit", _) => Command::Quit,
            (verb, None) if matches!(verb, "force" | "camera" | "resolution") => {
                return Err(format!("{verb} needs an argument"))
            }
            (verb, _) => return Err(format!("unknown command: {verb} (try help)")),
        };
        Ok(Some(command))
    }
}

/// What the caller should do after a command ran.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Continue(String),
    /// The active camera changed; persist it.
    CameraChanged(String),
    Quit,
}

pub fn describe(snapshot: &MonitorSnapshot) -> String {
    let mut lines = vec![format!("capture: {}", snapshot.capture_state.name())];
    if let Some(info) = snapshot.capture_state.stream_info() {
        lines.push(format!(
            "stream: {} {} @ {:.1} fps (ready: {})",
            info.device_id,
            info.resolution(),
            info.frame_rate,
            snapshot.ready
        ));
    }
    if let Some(err) = snapshot.capture_state.error() {
        lines.push(format!("capture error: {err}"));
    }
    if let Some(reason) = &snapshot.permission_reason {
        lines.push(format!("permission: {reason}"));
    }
    match &snapshot.latest_result {
        Some(result) => lines.push(format!(
            "analysis: {} ({:.1}%) #{}",
            result.state,
            result.confidence * 100.0,
            result.sequence
        )),
        None => lines.push("analysis: none".to_string()),
    }
    lines.push(format!(
        "continuous: {} (dropped ticks: {})",
        snapshot.continuous, snapshot.dropped_ticks
    ));
    let alert = &snapshot.alert;
    lines.push(format!(
        "alert: {} {} volume {:.2}{}",
        alert.phase.name(),
        alert.active_state.map_or("-".to_string(), |s| s.to_string()),
        alert.current_volume,
        alert.forced.map_or(String::new(), |s| format!(" (forced {s})")),
    ));
    lines.join("\n")
}

fn list_devices(snapshot: &MonitorSnapshot) -> String {
    if snapshot.devices.is_empty() {
        return "no cameras".to_string();
    }
    snapshot
        .devices
        .iter()
        .map(|d| {
            let marker = if snapshot.selected_device.as_deref() == Some(d.id.as_str()) {
                '*'
            } else {
                ' '
            };
            format!(
                "{marker} {} {} [{}]",
                d.id,
                d.display_name,
                d.facing.facing_mode().unwrap_or("unknown")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Run one command against the monitor.
pub fn execute(
    monitor: &MonitorController,
    command: Command,
    default_interval: Duration,
) -> Result<Outcome, MonitorError> {
    let outcome = match command {
        Command::Analyze => {
            let result = monitor.analyze_now()?;
            Outcome::Continue(format!(
                "{} ({:.1}%)",
                result.state,
                result.confidence * 100.0
            ))
        }
        Command::Auto(period) => {
            let period = period.unwrap_or(default_interval);
            monitor.start_continuous(ContinuousConfig {
                period,
                run_for: None,
            })?;
            Outcome::Continue(format!("analyzing every {} ms", period.as_millis()))
        }
        Command::StopAuto => {
            monitor.stop_continuous();
            Outcome::Continue("continuous analysis stopped".to_string())
        }
        Command::Force(state) => {
            monitor.force_alert(state)?;
            Outcome::Continue(describe_alert(monitor))
        }
        Command::ClearForce => {
            monitor.clear_force()?;
            Outcome::Continue(describe_alert(monitor))
        }
        Command::StopAlarm => {
            monitor.stop_alert()?;
            Outcome::Continue("alert stopping".to_string())
        }
        Command::Camera(id) => {
            let info = monitor.select_device(&id)?;
            Outcome::CameraChanged(info.device_id)
        }
        Command::Toggle => match monitor.toggle_camera()? {
            Some(info) => Outcome::CameraChanged(info.device_id),
            None => Outcome::Continue("only one camera".to_string()),
        },
        Command::Resolution(resolution) => {
            let info = monitor.set_resolution(resolution)?;
            Outcome::Continue(format!("granted {}x{}", info.width, info.height))
        }
        Command::Devices => {
            monitor.refresh_devices()?;
            Outcome::Continue(list_devices(&monitor.snapshot()))
        }
        Command::Status => Outcome::Continue(describe(&monitor.snapshot())),
        Command::Help => Outcome::Continue(HELP.to_string()),
        Command::Quit => Outcome::Quit,
    };
    Ok(outcome)
}

fn describe_alert(monitor: &MonitorController) -> String {
    let alert = monitor.snapshot().alert;
    format!(
        "alert: {}{}",
        alert.phase.name(),
        alert.forced.map_or(String::new(), |s| format!(" (forced {s})"))
    )
}

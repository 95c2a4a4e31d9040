//! `autofocus`: command-line access to a PureFocus850 controller.
//!
//! ```text
//! autofocus --port /dev/ttyUSB0 info
//! autofocus --config focus.toml get piezo-range
//! autofocus --port COM8 set objective 3
//! autofocus --port COM8 --events set config piezo,line
//! ```
//!
//! Results are printed to stdout as JSON, logs go to stderr.

#![allow(missing_docs)]

mod logging;

use anyhow::{bail, Context, Result};
use autofocus_driver_prior::{
    ControlMode, DigipotMode, FocusConfig, MotionOutcome, PureFocus850, PureFocusConfig,
    SensorMode,
};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "autofocus")]
#[command(about = "PureFocus850 laser autofocus controller", long_about = None)]
#[command(version)]
struct Cli {
    /// Serial port (e.g., /dev/ttyUSB0, COM8)
    #[arg(short, long, global = true, conflicts_with = "config")]
    port: Option<String>,

    /// TOML session configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the per-line read timeout
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Print session events as JSON lines while the command runs
    #[arg(long, global = true)]
    events: bool,

    #[arg(long, global = true, value_enum, default_value = "compact")]
    log_format: logging::OutputFormat,

    #[arg(long, global = true, default_value = "warn", value_parser = logging::parse_log_level)]
    log_level: tracing::Level,

    /// Log span open/close events
    #[arg(long, global = true)]
    log_spans: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print device identity and the session state after start-up
    Info,
    /// Query one parameter
    Get {
        #[arg(value_enum)]
        parameter: Parameter,
    },
    /// Write one parameter and confirm it by readback
    Set {
        #[arg(value_enum)]
        parameter: Parameter,
        value: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Parameter {
    /// Control and sensor mode, e.g. `piezo,line`
    Config,
    ControlMode,
    SensorMode,
    LensPosition,
    LensMoving,
    PiezoRange,
    PiezoDac,
    PiezoVoltage,
    Objective,
    Servo,
    Digipot,
    Focus,
}

impl Parameter {
    fn name(self) -> &'static str {
        match self {
            Parameter::Config => "config",
            Parameter::ControlMode => "control_mode",
            Parameter::SensorMode => "sensor_mode",
            Parameter::LensPosition => "lens_position",
            Parameter::LensMoving => "lens_moving",
            Parameter::PiezoRange => "piezo_range_um",
            Parameter::PiezoDac => "piezo_dac",
            Parameter::PiezoVoltage => "piezo_voltage",
            Parameter::Objective => "objective",
            Parameter::Servo => "servo_enabled",
            Parameter::Digipot => "digipot_mode",
            Parameter::Focus => "focus_found",
        }
    }
}

/// What to do once the session is open.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Action {
    Info,
    Get(Parameter),
    Set(Parameter, Setting),
}

impl Action {
    /// Validate the command line before touching the port.
    fn from_command(command: &Commands) -> Result<Self> {
        Ok(match command {
            Commands::Info => Action::Info,
            Commands::Get { parameter } => Action::Get(*parameter),
            Commands::Set { parameter, value } => {
                Action::Set(*parameter, parse_setting(*parameter, value)?)
            }
        })
    }
}

/// A parsed `set` request.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Setting {
    Config(FocusConfig),
    ControlMode(ControlMode),
    SensorMode(SensorMode),
    PiezoRange(u32),
    PiezoVoltage(f64),
    Objective(u8),
    Servo(bool),
    Digipot(DigipotMode),
}

fn parse_setting(parameter: Parameter, value: &str) -> Result<Setting> {
    let value = value.trim();
    let setting = match parameter {
        Parameter::Config => {
            let (control, sensor) = value
                .split_once(',')
                .context("config takes CONTROL,SENSOR (e.g. piezo,line)")?;
            Setting::Config(FocusConfig::new(
                control.parse().map_err(anyhow::Error::msg)?,
                sensor.parse().map_err(anyhow::Error::msg)?,
            ))
        }
        Parameter::ControlMode => Setting::ControlMode(value.parse().map_err(anyhow::Error::msg)?),
        Parameter::SensorMode => Setting::SensorMode(value.parse().map_err(anyhow::Error::msg)?),
        Parameter::PiezoRange => Setting::PiezoRange(
            value
                .parse()
                .with_context(|| format!("invalid piezo range '{}'", value))?,
        ),
        Parameter::PiezoVoltage => Setting::PiezoVoltage(
            value
                .parse()
                .with_context(|| format!("invalid voltage '{}'", value))?,
        ),
        Parameter::Objective => Setting::Objective(
            value
                .parse()
                .with_context(|| format!("invalid objective '{}'", value))?,
        ),
        Parameter::Servo => Setting::Servo(parse_switch(value)?),
        Parameter::Digipot => Setting::Digipot(value.parse().map_err(anyhow::Error::msg)?),
        Parameter::LensPosition
        | Parameter::LensMoving
        | Parameter::PiezoDac
        | Parameter::Focus => bail!("{} is read-only", parameter.name()),
    };
    Ok(setting)
}

fn parse_switch(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "on" | "true" | "enable" => Ok(true),
        "0" | "off" | "false" | "disable" => Ok(false),
        _ => bail!("expected on/off, got '{}'", value),
    }
}

/// Build the session configuration from `--config` or `--port`.
fn resolve_config(cli: &Cli) -> Result<PureFocusConfig> {
    let mut config = match (&cli.config, &cli.port) {
        (Some(path), _) => PureFocusConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        (None, Some(port)) => PureFocusConfig::new(port.clone()),
        (None, None) => bail!("either --port or --config is required"),
    };
    if let Some(timeout_ms) = cli.timeout_ms {
        config = config.with_timeout(Duration::from_millis(timeout_ms));
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn get(focus: &mut PureFocus850, parameter: Parameter) -> Result<Value> {
    let value = match parameter {
        Parameter::Config => json!(focus.get_config().await?),
        Parameter::ControlMode => json!(focus.get_config().await?.control_mode),
        Parameter::SensorMode => json!(focus.get_config().await?.sensor_mode),
        Parameter::LensPosition => json!(focus.get_lens_position().await?),
        Parameter::LensMoving => json!(focus.get_lens_moving().await?),
        Parameter::PiezoRange => json!(focus.get_piezo_range_um().await?),
        Parameter::PiezoDac => json!(focus.get_piezo_dac().await?),
        Parameter::PiezoVoltage => json!(focus.get_piezo_voltage().await?),
        Parameter::Objective => json!(focus.get_objective().await?),
        Parameter::Servo => json!(focus.get_servo_enable().await?),
        Parameter::Digipot => json!(focus.get_digipot_mode().await?),
        Parameter::Focus => json!(focus.get_focus_flag().await?),
    };
    Ok(value)
}

async fn set(focus: &mut PureFocus850, setting: Setting) -> Result<Value> {
    let value = match setting {
        Setting::Config(config) => json!(focus.set_config(config).await?),
        Setting::ControlMode(mode) => json!(focus.set_control_mode(mode).await?),
        Setting::SensorMode(sensor) => {
            let control = match focus.state().config {
                Some(config) => config.control_mode,
                None => focus.get_config().await?.control_mode,
            };
            json!(focus.set_config(FocusConfig::new(control, sensor)).await?)
        }
        Setting::PiezoRange(um) => json!(focus.set_piezo_range_um(um).await?),
        Setting::PiezoVoltage(volts) => json!(focus.set_piezo_voltage(volts).await?),
        Setting::Objective(objective) => {
            let interrupted = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Cannot listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            };
            let change = focus.set_objective_or_cancel(objective, interrupted).await?;
            match change.motion {
                MotionOutcome::Settled(settled) => json!({
                    "objective": change.objective,
                    "settled": true,
                    "polls": settled.polls,
                    "elapsed_ms": settled.elapsed.as_millis() as u64,
                }),
                MotionOutcome::Cancelled { polls } => json!({
                    "objective": change.objective,
                    "settled": false,
                    "polls": polls,
                }),
            }
        }
        Setting::Servo(enabled) => json!(focus.set_servo_enable(enabled).await?),
        Setting::Digipot(mode) => json!(focus.set_digipot_mode(mode).await?),
    };
    Ok(value)
}

async fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;
    let action = Action::from_command(&cli.command)?;

    let mut focus = PureFocus850::open(&config)
        .await
        .with_context(|| format!("opening PureFocus850 on {}", config.port))?;

    let printer = cli.events.then(|| {
        let mut events = focus.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(line) => println!("{}", line),
                        Err(e) => warn!(error = %e, "Cannot serialize event"),
                    },
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event printer lagged"),
                    Err(RecvError::Closed) => break,
                }
            }
        })
    });

    let outcome = match action {
        Action::Info => Ok(json!({
            "info": focus.info(),
            "state": focus.state(),
        })),
        Action::Get(parameter) => get(&mut focus, parameter)
            .await
            .map(|value| json!({ "parameter": parameter.name(), "value": value })),
        Action::Set(parameter, setting) => set(&mut focus, setting)
            .await
            .map(|value| json!({ "parameter": parameter.name(), "value": value })),
    };

    // Release the port even when the command failed
    if let Err(e) = focus.close().await {
        warn!(error = %e, "Error while closing session");
    }
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    let value = outcome?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = logging::LoggingConfig::new(cli.log_level)
        .with_format(cli.log_format)
        .with_span_events(cli.log_spans);
    logging::init(&log_config).map_err(anyhow::Error::msg)?;
    info!(command = ?cli.command, "autofocus starting");

    run(cli).await
}

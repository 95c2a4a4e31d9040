//! Simulated PureFocus850 for integration tests.
//!
//! [`SimulatedPureFocus`] answers the modelled command subset over a mock
//! serial port the way the controller does: values on reads, an
//! acknowledgement line on writes, `E,<code>` on rejected commands.
//! Individual responses can be overridden to script misbehaving devices.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use autofocus_core::mock_serial::{self, MockDeviceHarness};
use autofocus_core::LineTransport;
use autofocus_driver_prior::{PureFocus850, PureFocusConfig};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const PRODUCT: &str = "Prior Scientific Instruments OptiScan LF";

/// Commands received by a simulated device, in order.
#[derive(Debug, Clone, Default)]
pub struct CommandLog(Arc<Mutex<Vec<String>>>);

impl CommandLog {
    fn push(&self, command: String) {
        self.0.lock().unwrap().push(command);
    }

    pub fn commands(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    pub fn count(&self, command: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|c| *c == command).count()
    }
}

/// Device state plus scripted deviations.
#[derive(Debug, Clone)]
pub struct SimulatedPureFocus {
    pub product: String,
    pub version: String,
    pub control_mode: u8,
    pub sensor_mode: u8,
    pub lens_position: i32,
    pub piezo_range_um: u32,
    pub piezo_dac: u16,
    pub objective: u8,
    pub servo: bool,
    pub digipot: u8,
    pub focus: bool,
    /// `LENS$` answers `1` this many times after each objective change
    pub lens_busy_polls: u32,
    /// Maps a requested piezo range to the one the device settles on
    pub range_rounding: fn(u32) -> u32,
    /// Writes to the digipot mode are acknowledged but ignored
    pub digipot_stuck: bool,
    /// Raw responses (without terminator) returned instead of the normal answer
    pub(crate) overrides: HashMap<String, VecDeque<String>>,
    pub(crate) lens_moving_remaining: u32,
    pub(crate) log: CommandLog,
}

impl Default for SimulatedPureFocus {
    fn default() -> Self {
        Self {
            product: PRODUCT.to_string(),
            version: "PF850 v1.12".to_string(),
            control_mode: 1,
            sensor_mode: 1,
            lens_position: 12000,
            piezo_range_um: 100,
            piezo_dac: 0,
            objective: 1,
            servo: false,
            digipot: 0,
            focus: false,
            lens_busy_polls: 2,
            range_rounding: |um| um,
            digipot_stuck: false,
            overrides: HashMap::new(),
            lens_moving_remaining: 0,
            log: CommandLog::default(),
        }
    }
}

impl SimulatedPureFocus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next `command` with `response` instead of the real value.
    ///
    /// `response` may contain `\r` to produce several lines; a single
    /// terminator is appended.
    pub fn respond_once(mut self, command: &str, response: &str) -> Self {
        self.overrides
            .entry(command.to_string())
            .or_default()
            .push_back(response.to_string());
        self
    }

    pub fn log(&self) -> CommandLog {
        self.log.clone()
    }

    /// Run on `harness` until the client side is dropped.
    pub fn spawn(mut self, mut harness: MockDeviceHarness) -> JoinHandle<Self> {
        tokio::spawn(async move {
            while let Some(raw) = harness.next_command(b'\r').await {
                let command = String::from_utf8_lossy(&raw).trim_end_matches('\r').to_string();
                self.log.push(command.clone());
                let mut response = self.respond(&command).into_bytes();
                response.push(b'\r');
                if harness.send_response(&response).is_err() {
                    break;
                }
            }
            self
        })
    }

    fn respond(&mut self, command: &str) -> String {
        if let Some(response) = self
            .overrides
            .get_mut(command)
            .and_then(|queue| queue.pop_front())
        {
            return response;
        }

        let mut parts = command.split(',');
        let name = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();
        let arg = |i: usize| args.get(i).and_then(|a| a.parse::<i64>().ok());

        match (name, args.len()) {
            ("DATE", 0) => format!("{}\r{}", self.product, self.version),
            ("CONFIG", 0) => format!("{},{}", self.control_mode, self.sensor_mode),
            ("CONFIG", 2) => match (arg(0), arg(1)) {
                (Some(m @ 0..=2), Some(s @ 0..=1)) => {
                    self.control_mode = m as u8;
                    self.sensor_mode = s as u8;
                    ack()
                }
                (Some(0..=2), _) => "E,11".into(),
                _ => "E,10".into(),
            },
            ("LENSP", 0) => self.lens_position.to_string(),
            ("LENS$", 0) => {
                if self.lens_moving_remaining > 0 {
                    self.lens_moving_remaining -= 1;
                    "1".into()
                } else {
                    "0".into()
                }
            }
            ("UPR", 0) => self.piezo_range_um.to_string(),
            ("UPR", 1) => match arg(0) {
                Some(um @ 1..=1000) => {
                    self.piezo_range_um = (self.range_rounding)(um as u32);
                    ack()
                }
                _ => "E,10".into(),
            },
            ("PIEZO", 0) => self.piezo_dac.to_string(),
            ("PIEZO", 1) if self.servo => "E,2".into(),
            ("PIEZO", 1) => match arg(0) {
                Some(code @ 0..=4095) => {
                    self.piezo_dac = code as u16;
                    ack()
                }
                _ => "E,10".into(),
            },
            ("OBJ", 0) => self.objective.to_string(),
            ("OBJ", 1) => match arg(0) {
                Some(obj @ 1..=6) => {
                    self.objective = obj as u8;
                    self.lens_moving_remaining = self.lens_busy_polls;
                    ack()
                }
                _ => "E,10".into(),
            },
            ("SERVO", 0) => flag(self.servo),
            ("SERVO", 1) => match arg(0) {
                Some(v @ 0..=1) => {
                    self.servo = v == 1;
                    ack()
                }
                _ => "E,10".into(),
            },
            ("LENS", 0) => self.digipot.to_string(),
            ("LENS", 1) => match arg(0) {
                Some(v @ 0..=1) => {
                    if !self.digipot_stuck {
                        self.digipot = v as u8;
                    }
                    ack()
                }
                _ => "E,10".into(),
            },
            ("FOCUS", 0) => flag(self.focus),
            (_, _) => "E,5".into(),
        }
    }
}

fn ack() -> String {
    "0".into()
}

fn flag(value: bool) -> String {
    (if value { "1" } else { "0" }).into()
}

/// Settings that keep tests fast: short reads and a quick lens poll.
pub fn test_config() -> PureFocusConfig {
    PureFocusConfig::new("sim")
        .with_timeout(Duration::from_millis(200))
        .with_poll_interval(Duration::from_millis(5))
}

/// Attach `sim` to a fresh transport.
pub fn connect(
    sim: SimulatedPureFocus,
    config: &PureFocusConfig,
) -> (LineTransport, JoinHandle<SimulatedPureFocus>) {
    let (port, harness) = mock_serial::new();
    let transport = LineTransport::new(
        Box::new(port),
        config.port.clone(),
        Duration::from_millis(config.timeout_ms),
    );
    (transport, sim.spawn(harness))
}

/// Open a session against `sim`, panicking if initialization fails.
pub async fn open(
    sim: SimulatedPureFocus,
) -> (PureFocus850, CommandLog, JoinHandle<SimulatedPureFocus>) {
    let log = sim.log();
    let config = test_config();
    let (transport, device) = connect(sim, &config);
    let session = PureFocus850::with_transport(transport, &config)
        .await
        .expect("session should open against the simulated device");
    log.clear();
    (session, log, device)
}

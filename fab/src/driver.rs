//! Printer driver abstraction and two in-memory protocol simulators.
//!
//! The wire protocols (Moonraker HTTP, Bambu MQTT) are out of scope per the
//! spec — these simulators model their constructor shape and turn-taking
//! behavior (connect, upload, start, poll, control) without doing any real
//! network I/O, mirroring the teacher's pattern of one trait, several
//! concrete backends.

use crate::error::DriverError;
use crate::job::{PrinterCapability, PrinterState, PrinterStatus};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

/// Uniform control surface over a single physical (or simulated) printer.
///
/// All methods return a success boolean or a [`DriverError`]; per the spec,
/// drivers must internally serialize concurrent calls (the executor and the
/// scheduler's status polls may both touch the same driver instance).
#[async_trait]
pub trait PrinterDriver: Send + Sync {
    /// Establish (or re-establish) the connection.
    async fn connect(&self) -> Result<(), DriverError>;

    /// Tear down the connection. Best-effort; never fails.
    async fn disconnect(&self);

    /// Whether the driver currently believes it has a live connection.
    async fn is_connected(&self) -> bool;

    /// Static capability envelope for this printer.
    fn capabilities(&self) -> PrinterCapability;

    /// Current operating state.
    async fn get_status(&self) -> Result<PrinterStatus, DriverError>;

    /// Upload a local G-code file under `remote_name`, returning the name
    /// the printer will serve it under.
    async fn upload_gcode(&self, path: &Path, remote_name: &str) -> Result<String, DriverError>;

    /// Start printing a previously uploaded file.
    async fn start_print(&self, remote_name: &str) -> Result<bool, DriverError>;

    /// Pause the active print.
    async fn pause_print(&self) -> Result<bool, DriverError>;

    /// Resume a paused print.
    async fn resume_print(&self) -> Result<bool, DriverError>;

    /// Cancel the active print.
    async fn cancel_print(&self) -> Result<bool, DriverError>;

    /// Set the bed target temperature, Celsius.
    async fn set_bed_temperature(&self, celsius: f64) -> Result<bool, DriverError>;

    /// Set the nozzle target temperature, Celsius.
    async fn set_nozzle_temperature(&self, celsius: f64) -> Result<bool, DriverError>;

    /// Home the given axes.
    async fn home_axes(&self, x: bool, y: bool, z: bool) -> Result<bool, DriverError>;

    /// Capture a snapshot from the printer's camera, if present. Returns an
    /// opaque identifier (e.g. a path or blob key) for the captured image.
    async fn capture_snapshot(&self) -> Result<Option<String>, DriverError>;
}

/// What the simulated print head is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SimPhase {
    Idle,
    Printing,
    Paused,
    Complete,
    Error,
}

struct SimState {
    connected: bool,
    phase: SimPhase,
    current_file: Option<String>,
    progress: f64,
    total_layers: u32,
    current_layer: u32,
    error_message: Option<String>,
    /// Forces the next `get_status` poll to report an error, simulating a
    /// failure injected by a test or an operator.
    inject_error: bool,
}

impl SimState {
    fn new() -> Self {
        Self {
            connected: false,
            phase: SimPhase::Idle,
            current_file: None,
            progress: 0.0,
            total_layers: 100,
            current_layer: 0,
            error_message: None,
            inject_error: false,
        }
    }
}

/// Shared simulator body used by both protocol-flavored drivers below: the
/// spec's drivers differ only in their *configuration* shape (base URL vs.
/// host/access-code/serial), not in the state machine they expose.
struct Simulator {
    capability: PrinterCapability,
    state: Mutex<SimState>,
    /// Layers advanced per `get_status` poll, simulating print progress.
    layers_per_poll: u32,
}

impl Simulator {
    fn new(capability: PrinterCapability) -> Self {
        Self {
            capability,
            state: Mutex::new(SimState::new()),
            layers_per_poll: 10,
        }
    }

    /// Test/ops hook: force the next status poll to surface `ERROR`.
    fn inject_error(&self, message: &str) {
        let mut state = self.state.lock().unwrap();
        state.inject_error = true;
        state.error_message = Some(message.to_string());
    }

    async fn connect(&self) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.connected = true;
        Ok(())
    }

    async fn disconnect(&self) {
        let mut state = self.state.lock().unwrap();
        state.connected = false;
    }

    async fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    fn capabilities(&self) -> PrinterCapability {
        self.capability.clone()
    }

    async fn get_status(&self) -> Result<PrinterStatus, DriverError> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Ok(PrinterStatus {
                printer_id: self.capability.id.clone(),
                state: PrinterState::Offline,
                online: false,
                nozzle_temp: None,
                nozzle_target: None,
                bed_temp: None,
                bed_target: None,
                current_file: None,
                progress_percent: None,
                elapsed_secs: None,
                remaining_secs: None,
                current_layer: None,
                total_layers: None,
                error_message: None,
            });
        }

        if state.inject_error {
            state.phase = SimPhase::Error;
        } else if state.phase == SimPhase::Printing {
            state.current_layer = (state.current_layer + self.layers_per_poll).min(state.total_layers);
            state.progress = 100.0 * state.current_layer as f64 / state.total_layers as f64;
            if state.current_layer >= state.total_layers {
                state.phase = SimPhase::Complete;
            }
        }

        let printer_state = match state.phase {
            SimPhase::Idle => PrinterState::Idle,
            SimPhase::Printing => PrinterState::Printing,
            SimPhase::Paused => PrinterState::Paused,
            SimPhase::Complete => PrinterState::Complete,
            SimPhase::Error => PrinterState::Error,
        };

        Ok(PrinterStatus {
            printer_id: self.capability.id.clone(),
            state: printer_state,
            online: true,
            nozzle_temp: Some(210.0),
            nozzle_target: Some(210.0),
            bed_temp: Some(60.0),
            bed_target: Some(60.0),
            current_file: state.current_file.clone(),
            progress_percent: Some(state.progress),
            elapsed_secs: Some((state.current_layer as u64) * 6),
            remaining_secs: Some(((state.total_layers - state.current_layer) as u64) * 6),
            current_layer: Some(state.current_layer),
            total_layers: Some(state.total_layers),
            error_message: state.error_message.clone(),
        })
    }

    async fn upload_gcode(&self, path: &Path, remote_name: &str) -> Result<String, DriverError> {
        if !path.exists() {
            return Err(DriverError::FileNotFound(path.display().to_string()));
        }
        let state = self.state.lock().unwrap();
        if !state.connected {
            return Err(DriverError::ConnectionError("not connected".to_string()));
        }
        Ok(remote_name.to_string())
    }

    async fn start_print(&self, remote_name: &str) -> Result<bool, DriverError> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(DriverError::ConnectionError("not connected".to_string()));
        }
        state.current_file = Some(remote_name.to_string());
        state.phase = SimPhase::Printing;
        state.current_layer = 0;
        state.progress = 0.0;
        state.inject_error = false;
        state.error_message = None;
        Ok(true)
    }

    async fn pause_print(&self) -> Result<bool, DriverError> {
        let mut state = self.state.lock().unwrap();
        state.phase = SimPhase::Paused;
        Ok(true)
    }

    async fn resume_print(&self) -> Result<bool, DriverError> {
        let mut state = self.state.lock().unwrap();
        state.phase = SimPhase::Printing;
        Ok(true)
    }

    async fn cancel_print(&self) -> Result<bool, DriverError> {
        let mut state = self.state.lock().unwrap();
        state.phase = SimPhase::Idle;
        state.current_file = None;
        state.progress = 0.0;
        state.current_layer = 0;
        Ok(true)
    }

    async fn set_bed_temperature(&self, celsius: f64) -> Result<bool, DriverError> {
        if !(0.0..=150.0).contains(&celsius) {
            return Err(DriverError::InvalidValue(format!(
                "bed temperature {celsius} out of range"
            )));
        }
        Ok(true)
    }

    async fn set_nozzle_temperature(&self, celsius: f64) -> Result<bool, DriverError> {
        if !(0.0..=350.0).contains(&celsius) {
            return Err(DriverError::InvalidValue(format!(
                "nozzle temperature {celsius} out of range"
            )));
        }
        Ok(true)
    }

    async fn home_axes(&self) -> Result<bool, DriverError> {
        Ok(true)
    }

    async fn capture_snapshot(&self) -> Result<Option<String>, DriverError> {
        if self.capability.has_camera {
            let layer = self.state.lock().unwrap().current_layer;
            Ok(Some(format!("snapshot://{}/layer-{layer}", self.capability.id)))
        } else {
            Ok(None)
        }
    }
}

/// Configuration for a [`MoonrakerDriver`]: base URL and optional API key.
/// Carried for shape-fidelity with the original Moonraker HTTP adapter;
/// unused beyond identifying the simulated printer, since no real HTTP call
/// is made.
#[derive(Debug, Clone)]
pub struct MoonrakerConfig {
    /// Base URL of the Moonraker instance, e.g. `http://voron.local`.
    pub base_url: String,
    /// Optional API key for authenticated instances.
    pub api_key: Option<String>,
}

/// Simulated Moonraker (Klipper) REST driver.
///
/// Mirrors the route surface from the spec: `/server/info`,
/// `/printer/objects/query`, `/server/files/upload`,
/// `/printer/print/{start,pause,resume,cancel}`, `/printer/gcode/script` —
/// represented here as trait method calls rather than actual HTTP requests.
pub struct MoonrakerDriver {
    #[allow(dead_code)]
    config: MoonrakerConfig,
    sim: Simulator,
}

impl MoonrakerDriver {
    /// Construct a driver for the given capability, reachable at `config`.
    pub fn new(config: MoonrakerConfig, capability: PrinterCapability) -> Self {
        Self {
            config,
            sim: Simulator::new(capability),
        }
    }

    /// Test hook: make the next status poll report `ERROR`.
    pub fn inject_error(&self, message: &str) {
        self.sim.inject_error(message);
    }
}

#[async_trait]
impl PrinterDriver for MoonrakerDriver {
    async fn connect(&self) -> Result<(), DriverError> {
        self.sim.connect().await
    }
    async fn disconnect(&self) {
        self.sim.disconnect().await
    }
    async fn is_connected(&self) -> bool {
        self.sim.is_connected().await
    }
    fn capabilities(&self) -> PrinterCapability {
        self.sim.capabilities()
    }
    async fn get_status(&self) -> Result<PrinterStatus, DriverError> {
        self.sim.get_status().await
    }
    async fn upload_gcode(&self, path: &Path, remote_name: &str) -> Result<String, DriverError> {
        self.sim.upload_gcode(path, remote_name).await
    }
    async fn start_print(&self, remote_name: &str) -> Result<bool, DriverError> {
        self.sim.start_print(remote_name).await
    }
    async fn pause_print(&self) -> Result<bool, DriverError> {
        self.sim.pause_print().await
    }
    async fn resume_print(&self) -> Result<bool, DriverError> {
        self.sim.resume_print().await
    }
    async fn cancel_print(&self) -> Result<bool, DriverError> {
        self.sim.cancel_print().await
    }
    async fn set_bed_temperature(&self, celsius: f64) -> Result<bool, DriverError> {
        self.sim.set_bed_temperature(celsius).await
    }
    async fn set_nozzle_temperature(&self, celsius: f64) -> Result<bool, DriverError> {
        self.sim.set_nozzle_temperature(celsius).await
    }
    async fn home_axes(&self, _x: bool, _y: bool, _z: bool) -> Result<bool, DriverError> {
        self.sim.home_axes().await
    }
    async fn capture_snapshot(&self) -> Result<Option<String>, DriverError> {
        self.sim.capture_snapshot().await
    }
}

/// Configuration for a [`BambuDriver`]: host, LAN access code, and serial.
#[derive(Debug, Clone)]
pub struct BambuConfig {
    /// Printer's LAN hostname or IP.
    pub host: String,
    /// LAN-mode access code.
    pub access_code: String,
    /// Printer serial number (used in the `device/{id}/...` topic names).
    pub serial: String,
}

/// Simulated Bambu Lab MQTT driver.
///
/// Mirrors the spec's `device/{id}/request` / `device/{id}/report` topic
/// pair and `{print:{command, param, sequence_id}}` envelope shape —
/// represented here as trait method calls, no real MQTT broker involved.
pub struct BambuDriver {
    #[allow(dead_code)]
    config: BambuConfig,
    sim: Simulator,
    sequence: std::sync::atomic::AtomicU64,
}

impl BambuDriver {
    /// Construct a driver for the given capability, reachable at `config`.
    pub fn new(config: BambuConfig, capability: PrinterCapability) -> Self {
        Self {
            config,
            sim: Simulator::new(capability),
            sequence: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Test hook: make the next status poll report `ERROR`.
    pub fn inject_error(&self, message: &str) {
        self.sim.inject_error(message);
    }

    fn next_sequence_id(&self) -> u64 {
        self.sequence.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }
}

#[async_trait]
impl PrinterDriver for BambuDriver {
    async fn connect(&self) -> Result<(), DriverError> {
        self.sim.connect().await
    }
    async fn disconnect(&self) {
        self.sim.disconnect().await
    }
    async fn is_connected(&self) -> bool {
        self.sim.is_connected().await
    }
    fn capabilities(&self) -> PrinterCapability {
        self.sim.capabilities()
    }
    async fn get_status(&self) -> Result<PrinterStatus, DriverError> {
        self.sim.get_status().await
    }
    async fn upload_gcode(&self, path: &Path, remote_name: &str) -> Result<String, DriverError> {
        self.sim.upload_gcode(path, remote_name).await
    }
    async fn start_print(&self, remote_name: &str) -> Result<bool, DriverError> {
        let _sequence_id = self.next_sequence_id();
        self.sim.start_print(remote_name).await
    }
    async fn pause_print(&self) -> Result<bool, DriverError> {
        let _sequence_id = self.next_sequence_id();
        self.sim.pause_print().await
    }
    async fn resume_print(&self) -> Result<bool, DriverError> {
        let _sequence_id = self.next_sequence_id();
        self.sim.resume_print().await
    }
    async fn cancel_print(&self) -> Result<bool, DriverError> {
        let _sequence_id = self.next_sequence_id();
        self.sim.cancel_print().await
    }
    async fn set_bed_temperature(&self, celsius: f64) -> Result<bool, DriverError> {
        self.sim.set_bed_temperature(celsius).await
    }
    async fn set_nozzle_temperature(&self, celsius: f64) -> Result<bool, DriverError> {
        self.sim.set_nozzle_temperature(celsius).await
    }
    async fn home_axes(&self, _x: bool, _y: bool, _z: bool) -> Result<bool, DriverError> {
        self.sim.home_axes().await
    }
    async fn capture_snapshot(&self) -> Result<Option<String>, DriverError> {
        self.sim.capture_snapshot().await
    }
}

/// Build a default capability envelope for tests and CLI demos.
pub fn demo_capability(id: &str, materials: &[&str]) -> PrinterCapability {
    PrinterCapability {
        id: id.to_string(),
        kind: "demo".to_string(),
        build_volume_mm: (256.0, 256.0, 256.0),
        supported_materials: materials.iter().map(|m| m.to_string()).collect::<HashSet<_>>(),
        has_camera: true,
        auto_level: true,
        multi_color: false,
        resume_after_power_loss: true,
    }
}

//! Print job data model: identity, mutable status, and the status-history log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A print job's lifecycle state. See the authoritative state machine in
/// the executor module docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to be picked up by the scheduler.
    Queued,
    /// Assigned to a printer; not yet uploading.
    Scheduled,
    /// G-code upload in progress.
    Uploading,
    /// Printer is actively printing this job.
    Printing,
    /// Finished successfully. Terminal.
    Completed,
    /// Failed. Terminal unless retried back to `Queued`.
    Failed,
    /// Cancelled by an operator. Terminal.
    Cancelled,
}

impl JobStatus {
    /// Whether this status can never transition again (ignoring retry,
    /// which moves `Failed` back to `Queued` explicitly).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled)
    }
}

/// One entry in a job's status-history log: `(from, to, reason, actor, timestamp)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    /// Status the job transitioned from (`None` for the initial `Queued` entry).
    pub from_status: Option<JobStatus>,
    /// Status the job transitioned to.
    pub to_status: JobStatus,
    /// Human-readable reason for the transition.
    pub reason: String,
    /// Who or what caused the transition (`"scheduler"`, `"executor"`, a user id, ...).
    pub changed_by: String,
    /// When the transition happened.
    pub changed_at: DateTime<Utc>,
}

/// Requested filament/resin material for a job. Matched against a printer's
/// currently-loaded material for batching and against its supported set for
/// fit checks.
pub type Material = String;

/// A print job. The identity fields are set at submission and never change;
/// the rest is mutated by the scheduler and executor under lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintJob {
    /// Stable, unique identifier.
    pub id: String,
    /// Human-readable job name.
    pub name: String,
    /// Path to the STL/3MF source or pre-sliced G-code.
    pub source_path: String,
    /// Requested material.
    pub material: Material,
    /// User priority, 1 (highest) through 10 (lowest).
    pub priority: u8,
    /// Deadline, if any. Overdue jobs dominate the optimizer's score.
    pub deadline: Option<DateTime<Utc>>,
    /// Number of retries attempted so far.
    pub retry_count: u32,
    /// Maximum retries allowed before the job stays `Failed`.
    pub max_retries: u32,
    /// Analyzed maximum bounding-box dimension in mm, if mesh analysis ran.
    pub max_dimension_mm: Option<f64>,

    /// Current lifecycle status.
    pub status: JobStatus,
    /// Printer currently assigned to this job, if any.
    pub assigned_printer: Option<String>,
    /// When the scheduler assigned this job to a printer.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// When the executor started printing.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Human-readable reason for the current status.
    pub status_reason: Option<String>,
    /// The optimizer score that won this job its most recent assignment.
    pub last_score: Option<f64>,
    /// The optimizer's reasoning string for the most recent assignment.
    pub last_reasoning: Option<String>,
    /// When the job was submitted (used for FIFO tie-breaking).
    pub queued_at: DateTime<Utc>,

    /// Append-only status-history log. Invariant (d): every status change
    /// appends exactly one entry here.
    pub history: Vec<StatusHistoryEntry>,
}

impl PrintJob {
    /// Construct a new job in `Queued` status with one initial history entry.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        source_path: impl Into<String>,
        material: impl Into<Material>,
        priority: u8,
        deadline: Option<DateTime<Utc>>,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Self {
        let priority = priority.clamp(1, 10);
        Self {
            id: id.into(),
            name: name.into(),
            source_path: source_path.into(),
            material: material.into(),
            priority,
            deadline,
            retry_count: 0,
            max_retries,
            max_dimension_mm: None,
            status: JobStatus::Queued,
            assigned_printer: None,
            scheduled_at: None,
            started_at: None,
            completed_at: None,
            status_reason: None,
            last_score: None,
            last_reasoning: None,
            queued_at: now,
            history: vec![StatusHistoryEntry {
                from_status: None,
                to_status: JobStatus::Queued,
                reason: "submitted".to_string(),
                changed_by: "queue".to_string(),
                changed_at: now,
            }],
        }
    }

    /// Apply a status transition, appending one history entry. Does not
    /// validate the transition against the state machine — callers (the
    /// scheduler, the executor) are expected to only call this after
    /// checking legality, since the legal edge set differs by caller
    /// (e.g. `cancel` accepts transitions the executor never makes itself).
    pub fn transition(
        &mut self,
        to: JobStatus,
        reason: impl Into<String>,
        actor: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        let from = self.status;
        self.status = to;
        let reason = reason.into();
        self.status_reason = Some(reason.clone());
        self.history.push(StatusHistoryEntry {
            from_status: Some(from),
            to_status: to,
            reason,
            changed_by: actor.into(),
            changed_at: now,
        });
        match to {
            JobStatus::Scheduled => self.scheduled_at = Some(now),
            JobStatus::Printing => self.started_at = Some(now),
            JobStatus::Completed | JobStatus::Cancelled => self.completed_at = Some(now),
            _ => {}
        }
    }

    /// Whether `deadline` has already passed as of `now`.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|d| d < now)
    }
}

/// Static build/material/feature envelope of a printer. Owned by the driver;
/// treated as read-only by the scheduler and optimizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterCapability {
    /// Stable printer identifier.
    pub id: String,
    /// Printer kind/model (e.g. `"bambu-x1c"`, `"voron-2.4"`).
    pub kind: String,
    /// Build volume in millimeters.
    pub build_volume_mm: (f64, f64, f64),
    /// Materials this printer can be loaded with.
    pub supported_materials: HashSet<Material>,
    /// Whether the printer has an onboard camera for snapshots.
    pub has_camera: bool,
    /// Whether the printer auto-levels its bed.
    pub auto_level: bool,
    /// Whether the printer supports multi-color/multi-material printing.
    pub multi_color: bool,
    /// Whether the printer can resume a print after a power loss.
    pub resume_after_power_loss: bool,
}

impl PrinterCapability {
    /// The smallest build-volume dimension, used as the fit constraint for
    /// the optimizer (a job's max bounding-box dimension must not exceed it).
    pub fn min_build_dimension(&self) -> f64 {
        let (x, y, z) = self.build_volume_mm;
        x.min(y).min(z)
    }
}

/// Live operating state reported by a driver. Never persisted by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrinterState {
    /// Unreachable.
    Offline,
    /// Online, not printing, ready for a new job.
    Idle,
    /// Actively printing.
    Printing,
    /// Print paused mid-job.
    Paused,
    /// Most recent print finished successfully.
    Complete,
    /// Most recent print (or the driver connection) errored.
    Error,
    /// Online but deliberately held back from scheduling.
    Standby,
}

/// A snapshot of a printer's current operating state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterStatus {
    /// Which printer this describes.
    pub printer_id: String,
    /// Coarse operating state.
    pub state: PrinterState,
    /// Whether the driver currently has a live connection.
    pub online: bool,
    /// Current nozzle temperature, Celsius.
    pub nozzle_temp: Option<f64>,
    /// Target nozzle temperature, Celsius.
    pub nozzle_target: Option<f64>,
    /// Current bed temperature, Celsius.
    pub bed_temp: Option<f64>,
    /// Target bed temperature, Celsius.
    pub bed_target: Option<f64>,
    /// Remote file name currently loaded/printing, if any.
    pub current_file: Option<String>,
    /// Print progress, 0.0 through 100.0.
    pub progress_percent: Option<f64>,
    /// Elapsed print time in seconds.
    pub elapsed_secs: Option<u64>,
    /// Estimated remaining print time in seconds.
    pub remaining_secs: Option<u64>,
    /// Current layer index, if known.
    pub current_layer: Option<u32>,
    /// Total layer count, if known.
    pub total_layers: Option<u32>,
    /// Error message, set only when `state == Error`.
    pub error_message: Option<String>,
}

impl PrinterStatus {
    /// Idle per the spec's idle criterion: online, not printing, not errored.
    pub fn is_idle(&self) -> bool {
        self.online && matches!(self.state, PrinterState::Idle)
    }
}

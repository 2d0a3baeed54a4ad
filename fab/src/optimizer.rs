//! Queue optimizer: a pure scoring function over queued jobs for one printer.

use crate::job::{JobStatus, Material, PrintJob, PrinterCapability};
use chrono::{DateTime, Utc};

/// +1000 for an overdue job; dominates every other term.
const OVERDUE_BONUS: f64 = 1000.0;
/// Scale for the within-horizon deadline-urgency term.
const URGENCY_SCALE: f64 = 500.0;
/// Default deadline horizon, in hours, for the urgency ramp.
pub const DEFAULT_DEADLINE_HORIZON_HOURS: f64 = 24.0;
/// Bonus for a job whose material matches the printer's currently loaded material.
const MATERIAL_BATCH_BONUS: f64 = 50.0;
/// Cap on the FIFO tie-break term, in hours.
const FIFO_CAP_HOURS: f64 = 10.0;

/// Tunable knobs for [`score`] and [`pick_best`].
#[derive(Debug, Clone, Copy)]
pub struct OptimizerConfig {
    /// Hours before a deadline within which urgency starts ramping up.
    pub deadline_horizon_hours: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            deadline_horizon_hours: DEFAULT_DEADLINE_HORIZON_HOURS,
        }
    }
}

/// The winning job's score plus a human-readable breakdown, recorded onto
/// the job before it's returned.
#[derive(Debug, Clone)]
pub struct ScoreBreakdown {
    /// Total score.
    pub score: f64,
    /// One line per contributing term, for `last_reasoning`.
    pub reasoning: String,
}

/// Score a single job against a printer's currently-loaded material. Higher
/// is better. Pure function of its inputs — no I/O, no mutation.
pub fn score(job: &PrintJob, current_material: &Material, now: DateTime<Utc>, config: &OptimizerConfig) -> ScoreBreakdown {
    let mut total = 0.0;
    let mut parts = Vec::new();

    let deadline_term = match job.deadline {
        None => 0.0,
        Some(deadline) => {
            if deadline < now {
                parts.push("overdue:+1000".to_string());
                OVERDUE_BONUS
            } else {
                let hours_remaining = (deadline - now).num_milliseconds() as f64 / 3_600_000.0;
                if hours_remaining <= config.deadline_horizon_hours {
                    let urgency =
                        URGENCY_SCALE * (1.0 - hours_remaining / config.deadline_horizon_hours);
                    parts.push(format!("deadline_urgency:+{urgency:.1}"));
                    urgency
                } else {
                    0.0
                }
            }
        }
    };
    total += deadline_term;

    let priority_term = (11 - job.priority as i32) as f64 * 10.0;
    parts.push(format!("priority:+{priority_term:.1}"));
    total += priority_term;

    let material_term = if &job.material == current_material {
        MATERIAL_BATCH_BONUS
    } else {
        0.0
    };
    if material_term > 0.0 {
        parts.push(format!("material_batch:+{material_term:.1}"));
    }
    total += material_term;

    let hours_since_queued = (now - job.queued_at).num_milliseconds() as f64 / 3_600_000.0;
    let fifo_term = hours_since_queued.max(0.0).min(FIFO_CAP_HOURS);
    parts.push(format!("fifo:+{fifo_term:.2}"));
    total += fifo_term;

    ScoreBreakdown {
        score: total,
        reasoning: parts.join(", "),
    }
}

/// Whether `job` fits the printer's build volume, given mesh analysis has run.
/// A job with no analyzed dimension is assumed to fit (analysis is optional
/// per the spec; the fit constraint only binds when a dimension is known).
fn fits(job: &PrintJob, printer: &PrinterCapability) -> bool {
    match job.max_dimension_mm {
        Some(dim) => dim <= printer.min_build_dimension(),
        None => true,
    }
}

/// Select the single best queued job for `printer`, or `None` if no queued
/// job fits. Breaks ties by earlier `queued_at`. Does not mutate `jobs`;
/// callers record the winning job's score/reasoning themselves (the
/// scheduler does this as part of its atomic QUEUED→SCHEDULED transition).
pub fn pick_best<'a>(
    jobs: &'a [PrintJob],
    printer: &PrinterCapability,
    current_material: &Material,
    now: DateTime<Utc>,
    config: &OptimizerConfig,
) -> Option<(&'a PrintJob, ScoreBreakdown)> {
    jobs.iter()
        .filter(|j| j.status == JobStatus::Queued)
        .filter(|j| fits(j, printer))
        .map(|j| (j, score(j, current_material, now, config)))
        .max_by(|(a_job, a_score), (b_job, b_score)| {
            a_score
                .score
                .partial_cmp(&b_score.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b_job.queued_at.cmp(&a_job.queued_at))
        })
}

//! Parallel scheduler: assigns at most one job per idle printer per tick,
//! plus the job-table operations (`cancel`, `retry`, `update_priority`).

use crate::driver::PrinterDriver;
use crate::error::SchedulerError;
use crate::job::{JobStatus, Material, PrintJob};
use crate::optimizer::{self, OptimizerConfig};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// One printer's assignment outcome from a scheduling tick.
#[derive(Debug, Clone)]
pub struct TickAssignment {
    /// Printer that received (or was considered for) an assignment.
    pub printer_id: String,
    /// The job assigned, if any.
    pub job_id: Option<String>,
    /// Why no job was assigned, when `job_id` is `None`.
    pub skip_reason: Option<String>,
}

/// Table of print jobs plus the printer fleet, guarded by a single mutex per
/// the simplification recorded in DESIGN.md: the whole read-score-write
/// sequence for an assignment runs as one critical section, which satisfies
/// "no job assigned to two printers" at the cost of coarser locking than a
/// sharded per-job-id pool.
pub struct ParallelScheduler {
    jobs: Mutex<HashMap<String, PrintJob>>,
    printers: HashMap<String, Arc<dyn PrinterDriver>>,
    /// Material currently loaded on each printer, independent of job history
    /// (an operator loads filament; the scheduler just reads it).
    loaded_material: Mutex<HashMap<String, Material>>,
    config: OptimizerConfig,
}

impl ParallelScheduler {
    /// Build a scheduler over the given printer fleet.
    pub fn new(printers: HashMap<String, Arc<dyn PrinterDriver>>, config: OptimizerConfig) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            printers,
            loaded_material: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Record which material is currently loaded on `printer_id`.
    pub fn set_loaded_material(&self, printer_id: &str, material: impl Into<Material>) {
        self.loaded_material
            .lock()
            .unwrap()
            .insert(printer_id.to_string(), material.into());
    }

    fn material_on(&self, printer_id: &str) -> Material {
        self.loaded_material
            .lock()
            .unwrap()
            .get(printer_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Submit a new job in `Queued` status.
    pub fn submit(&self, job: PrintJob) {
        self.jobs.lock().unwrap().insert(job.id.clone(), job);
    }

    /// Fetch a copy of a job by id.
    pub fn get(&self, job_id: &str) -> Option<PrintJob> {
        self.jobs.lock().unwrap().get(job_id).cloned()
    }

    /// All jobs, snapshotted.
    pub fn all_jobs(&self) -> Vec<PrintJob> {
        self.jobs.lock().unwrap().values().cloned().collect()
    }

    /// Driver for a printer, if known.
    pub fn driver(&self, printer_id: &str) -> Option<Arc<dyn PrinterDriver>> {
        self.printers.get(printer_id).cloned()
    }

    /// Run one scheduling tick: snapshot each printer's status concurrently,
    /// and for every idle printer (or any printer named in `forced`), assign
    /// its best-fit queued job.
    pub async fn tick(&self, forced: &[String]) -> Vec<TickAssignment> {
        let mut status_futures = Vec::new();
        for (printer_id, driver) in &self.printers {
            let printer_id = printer_id.clone();
            let driver = driver.clone();
            status_futures.push(async move {
                let status = driver.get_status().await;
                (printer_id, status)
            });
        }
        let statuses = futures::future::join_all(status_futures).await;

        let mut assignments = Vec::new();
        for (printer_id, status_result) in statuses {
            let is_forced = forced.contains(&printer_id);
            let idle = match &status_result {
                Ok(status) => status.is_idle(),
                Err(err) => {
                    warn!(printer = %printer_id, error = %err, "status poll failed");
                    false
                }
            };
            if !idle && !is_forced {
                assignments.push(TickAssignment {
                    printer_id,
                    job_id: None,
                    skip_reason: Some("printer not idle".to_string()),
                });
                continue;
            }

            let driver = match self.printers.get(&printer_id) {
                Some(d) => d.clone(),
                None => continue,
            };
            let capability = driver.capabilities();
            let material = self.material_on(&printer_id);
            let now = Utc::now();

            let mut jobs = self.jobs.lock().unwrap();
            let snapshot: Vec<PrintJob> = jobs.values().cloned().collect();
            let picked = optimizer::pick_best(&snapshot, &capability, &material, now, &self.config);

            match picked {
                Some((winner, breakdown)) => {
                    let job_id = winner.id.clone();
                    if let Some(job) = jobs.get_mut(&job_id) {
                        job.transition(JobStatus::Scheduled, "assigned by optimizer", "scheduler", now);
                        job.assigned_printer = Some(printer_id.clone());
                        job.last_score = Some(breakdown.score);
                        job.last_reasoning = Some(breakdown.reasoning.clone());
                        info!(printer = %printer_id, job = %job_id, score = breakdown.score, "assigned job");
                    }
                    assignments.push(TickAssignment {
                        printer_id,
                        job_id: Some(job_id),
                        skip_reason: None,
                    });
                }
                None => {
                    assignments.push(TickAssignment {
                        printer_id,
                        job_id: None,
                        skip_reason: Some("no queued job fits".to_string()),
                    });
                }
            }
        }

        assignments
    }

    /// Cancel any non-terminal job. Returns `false` (a no-op) if the job is
    /// already terminal or unknown.
    pub fn cancel(&self, job_id: &str, reason: &str, actor: &str) -> bool {
        let mut jobs = self.jobs.lock().unwrap();
        let Some(job) = jobs.get_mut(job_id) else {
            return false;
        };
        if job.status.is_terminal() {
            return false;
        }
        job.transition(JobStatus::Cancelled, reason, actor, Utc::now());
        job.assigned_printer = None;
        true
    }

    /// Retry a failed job: valid only when `status == Failed` and
    /// `retry_count < max_retries`. Resets assignment, bumps `retry_count`,
    /// and returns the job to `Queued`.
    pub fn retry(&self, job_id: &str) -> Result<(), SchedulerError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| SchedulerError::NotFound(job_id.to_string()))?;
        if job.status != JobStatus::Failed {
            return Err(SchedulerError::InvalidTransition {
                from: job.status,
                to: JobStatus::Queued,
            });
        }
        if job.retry_count >= job.max_retries {
            return Err(SchedulerError::Unfit(format!(
                "job {job_id} exhausted its {} retries",
                job.max_retries
            )));
        }
        job.retry_count += 1;
        job.assigned_printer = None;
        job.transition(
            JobStatus::Queued,
            format!("retry {}/{}", job.retry_count, job.max_retries),
            "scheduler",
            Utc::now(),
        );
        Ok(())
    }

    /// Update a job's priority in place. Purely a mutation of `priority`; no
    /// status transition, so it never appends a history row on its own.
    /// Idempotent: calling it twice with the same value is a no-op the
    /// second time.
    pub fn update_priority(&self, job_id: &str, priority: u8) -> Result<(), SchedulerError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| SchedulerError::NotFound(job_id.to_string()))?;
        let clamped = priority.clamp(1, 10);
        if job.priority == clamped {
            return Ok(());
        }
        job.priority = clamped;
        Ok(())
    }

    /// Apply an externally-decided status transition (used by the executor,
    /// which owns the SCHEDULED→...→terminal path per job).
    pub fn apply_transition(
        &self,
        job_id: &str,
        to: JobStatus,
        reason: &str,
        actor: &str,
    ) -> Result<(), SchedulerError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| SchedulerError::NotFound(job_id.to_string()))?;
        job.transition(to, reason, actor, Utc::now());
        Ok(())
    }

    /// Mutate a job in place under the table lock. Used by the executor for
    /// compound updates (status + assigned_printer + retry_count) that must
    /// land as one critical section.
    pub fn with_job_mut<F, R>(&self, job_id: &str, f: F) -> Result<R, SchedulerError>
    where
        F: FnOnce(&mut PrintJob) -> R,
    {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| SchedulerError::NotFound(job_id.to_string()))?;
        Ok(f(job))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{demo_capability, MoonrakerDriver, MoonrakerConfig};
    use crate::job::PrintJob;

    fn printer(id: &str, materials: &[&str]) -> Arc<dyn PrinterDriver> {
        Arc::new(MoonrakerDriver::new(
            MoonrakerConfig {
                base_url: format!("http://{id}.local"),
                api_key: None,
            },
            demo_capability(id, materials),
        ))
    }

    async fn connected_scheduler() -> ParallelScheduler {
        let bamboo = printer("bamboo", &["PLA"]);
        let elegoo = printer("elegoo", &["PETG"]);
        bamboo.connect().await.unwrap();
        elegoo.connect().await.unwrap();

        let mut printers: HashMap<String, Arc<dyn PrinterDriver>> = HashMap::new();
        printers.insert("bamboo".to_string(), bamboo);
        printers.insert("elegoo".to_string(), elegoo);

        let scheduler = ParallelScheduler::new(printers, OptimizerConfig::default());
        scheduler.set_loaded_material("bamboo", "PLA");
        scheduler.set_loaded_material("elegoo", "PETG");
        scheduler
    }

    #[tokio::test]
    async fn scenario_material_batching_and_overdue() {
        let scheduler = connected_scheduler().await;
        let now = Utc::now();
        let overdue = now - chrono::Duration::hours(1);

        scheduler.submit(PrintJob::new("A", "A", "a.stl", "PLA", 1, None, 1, now));
        scheduler.submit(PrintJob::new("B", "B", "b.stl", "PETG", 5, Some(overdue), 1, now));
        scheduler.submit(PrintJob::new("C", "C", "c.stl", "PLA", 3, None, 1, now));

        let assignments = scheduler.tick(&[]).await;
        let by_printer: HashMap<_, _> = assignments
            .into_iter()
            .map(|a| (a.printer_id, a.job_id))
            .collect();

        assert_eq!(by_printer.get("elegoo").cloned().flatten(), Some("B".to_string()));
        assert_eq!(by_printer.get("bamboo").cloned().flatten(), Some("A".to_string()));

        let c = scheduler.get("C").unwrap();
        assert_eq!(c.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn cancel_terminal_job_is_noop() {
        let scheduler = connected_scheduler().await;
        let now = Utc::now();
        scheduler.submit(PrintJob::new("A", "A", "a.stl", "PLA", 1, None, 1, now));
        assert!(scheduler.cancel("A", "user request", "alice"));
        assert!(!scheduler.cancel("A", "again", "alice"));
    }

    #[tokio::test]
    async fn retry_requires_failed_status_and_budget() {
        let scheduler = connected_scheduler().await;
        let now = Utc::now();
        let mut job = PrintJob::new("X", "X", "x.stl", "PLA", 1, None, 2, now);
        job.status = JobStatus::Failed;
        scheduler.submit(job);

        scheduler.retry("X").unwrap();
        let x = scheduler.get("X").unwrap();
        assert_eq!(x.status, JobStatus::Queued);
        assert_eq!(x.retry_count, 1);

        // Not failed anymore, so a second retry attempt is rejected.
        assert!(scheduler.retry("X").is_err());
    }

    #[tokio::test]
    async fn update_priority_is_idempotent() {
        let scheduler = connected_scheduler().await;
        let now = Utc::now();
        scheduler.submit(PrintJob::new("A", "A", "a.stl", "PLA", 5, None, 1, now));
        scheduler.update_priority("A", 3).unwrap();
        assert_eq!(scheduler.get("A").unwrap().priority, 3);
        scheduler.update_priority("A", 3).unwrap();
        assert_eq!(scheduler.get("A").unwrap().priority, 3);
    }

    #[tokio::test]
    async fn forced_printer_bypasses_idle_check() {
        let bamboo = printer("bamboo", &["PLA"]);
        // Not connected: status will be OFFLINE, not idle.
        let mut printers: HashMap<String, Arc<dyn PrinterDriver>> = HashMap::new();
        printers.insert("bamboo".to_string(), bamboo);
        let scheduler = ParallelScheduler::new(printers, OptimizerConfig::default());
        scheduler.set_loaded_material("bamboo", "PLA");
        let now = Utc::now();
        scheduler.submit(PrintJob::new("A", "A", "a.stl", "PLA", 1, None, 1, now));

        let assignments = scheduler.tick(&["bamboo".to_string()]).await;
        assert_eq!(assignments[0].job_id, Some("A".to_string()));
    }
}

//! Print executor: drives a single job from `Scheduled` through to a
//! terminal state (or back to `Queued` for a retry) against its assigned
//! printer's driver.

use crate::driver::PrinterDriver;
use crate::error::{DriverError, SchedulerError};
use crate::job::{JobStatus, PrinterState};
use crate::scheduler::ParallelScheduler;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Timing knobs for one executor run. Defaults follow §5's suspension-point
/// guidance: frequent enough to notice completion promptly, infrequent
/// enough not to hammer the driver.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    /// How often to poll `get_status` while printing.
    pub status_poll_interval: Duration,
    /// How often to capture a snapshot while printing (independent cadence
    /// from status polling; a snapshot is only captured on polls that land
    /// on or after a multiple of this interval).
    pub snapshot_interval: Duration,
    /// How long to sleep after a failure before returning the job to the
    /// queue for a retry.
    pub retry_delay: Duration,
    /// Whether to capture a "first_layer" snapshot right after the print
    /// starts.
    pub capture_first_layer: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            status_poll_interval: Duration::from_secs(5),
            snapshot_interval: Duration::from_secs(60),
            retry_delay: Duration::from_secs(30),
            capture_first_layer: true,
        }
    }
}

/// Outcome of one `execute` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The print completed successfully.
    Completed,
    /// The print failed and is terminal (retries exhausted).
    Failed(String),
    /// The print failed and the job was returned to `Queued` for a retry.
    Requeued(String),
}

/// Drives one job's `Scheduled` → ... → terminal lifecycle. Holds no locks
/// on other jobs; multiple executors run concurrently across printers via
/// separate tasks, sharing only the scheduler's job table and driver cache.
pub struct PrintExecutor {
    scheduler: Arc<ParallelScheduler>,
    config: ExecutorConfig,
}

impl PrintExecutor {
    /// Build an executor over the given scheduler (which owns the job table
    /// and the driver cache).
    pub fn new(scheduler: Arc<ParallelScheduler>, config: ExecutorConfig) -> Self {
        Self { scheduler, config }
    }

    /// Run the full execution sequence for a job that has already been
    /// assigned a printer (i.e. is in `Scheduled` status with a non-null
    /// `assigned_printer`).
    pub async fn execute(&self, job_id: &str) -> Result<ExecutionOutcome, SchedulerError> {
        let job = self
            .scheduler
            .get(job_id)
            .ok_or_else(|| SchedulerError::NotFound(job_id.to_string()))?;

        let printer_id = job
            .assigned_printer
            .clone()
            .ok_or_else(|| SchedulerError::Unfit(format!("job {job_id} has no assigned printer")))?;

        let driver = self
            .scheduler
            .driver(&printer_id)
            .ok_or_else(|| SchedulerError::NotFound(printer_id.clone()))?;

        if !driver.is_connected().await {
            if let Err(err) = driver.connect().await {
                return self.fail(job_id, &format!("connect failed: {err}")).await;
            }
        }

        self.scheduler
            .apply_transition(job_id, JobStatus::Uploading, "uploading g-code", "executor")?;

        let remote_name = format!("{job_id}.gcode");
        if let Err(err) = driver
            .upload_gcode(Path::new(&job.source_path), &remote_name)
            .await
        {
            return self.fail(job_id, &format!("upload failed: {err}")).await;
        }

        self.scheduler
            .apply_transition(job_id, JobStatus::Printing, "print started", "executor")?;

        if let Err(err) = driver.start_print(&remote_name).await {
            return self.fail(job_id, &format!("start_print failed: {err}")).await;
        }

        if self.config.capture_first_layer {
            match driver.capture_snapshot().await {
                Ok(Some(uri)) => info!(job = %job_id, snapshot = %uri, "captured first_layer snapshot"),
                Ok(None) => {}
                Err(err) => warn!(job = %job_id, error = %err, "first_layer snapshot failed"),
            }
        }

        self.poll_until_terminal(job_id, &printer_id, driver.as_ref()).await
    }

    async fn poll_until_terminal(
        &self,
        job_id: &str,
        printer_id: &str,
        driver: &dyn PrinterDriver,
    ) -> Result<ExecutionOutcome, SchedulerError> {
        let mut elapsed_since_snapshot = Duration::ZERO;
        loop {
            tokio::time::sleep(self.config.status_poll_interval).await;
            elapsed_since_snapshot += self.config.status_poll_interval;

            let status = match driver.get_status().await {
                Ok(status) => status,
                Err(err) => {
                    return self.fail(job_id, &format!("status poll failed: {err}")).await;
                }
            };

            if elapsed_since_snapshot >= self.config.snapshot_interval && status.state == PrinterState::Printing {
                elapsed_since_snapshot = Duration::ZERO;
                match driver.capture_snapshot().await {
                    Ok(Some(uri)) => info!(job = %job_id, snapshot = %uri, "captured progress snapshot"),
                    Ok(None) => {}
                    Err(err) => warn!(job = %job_id, error = %err, "progress snapshot failed"),
                }
            }

            match status.state {
                PrinterState::Complete => {
                    self.scheduler.apply_transition(
                        job_id,
                        JobStatus::Completed,
                        "print finished",
                        "executor",
                    )?;
                    return Ok(ExecutionOutcome::Completed);
                }
                PrinterState::Error => {
                    let reason = status
                        .error_message
                        .unwrap_or_else(|| "printer reported error".to_string());
                    return self.fail(job_id, &reason).await;
                }
                PrinterState::Offline => {
                    return self.fail(job_id, "printer offline").await;
                }
                _ => {
                    let _ = printer_id;
                    continue;
                }
            }
        }
    }

    async fn fail(&self, job_id: &str, reason: &str) -> Result<ExecutionOutcome, SchedulerError> {
        error!(job = %job_id, reason, "job failed");
        self.scheduler
            .apply_transition(job_id, JobStatus::Failed, reason, "executor")?;

        let should_retry = self
            .scheduler
            .with_job_mut(job_id, |job| job.retry_count < job.max_retries)?;

        if should_retry {
            tokio::time::sleep(self.config.retry_delay).await;
            match self.scheduler.retry(job_id) {
                Ok(()) => Ok(ExecutionOutcome::Requeued(reason.to_string())),
                Err(_) => Ok(ExecutionOutcome::Failed(reason.to_string())),
            }
        } else {
            Ok(ExecutionOutcome::Failed(reason.to_string()))
        }
    }
}

/// Surface `DriverError` at this module's boundary without forcing callers
/// to depend on the driver module directly.
pub type ExecDriverError = DriverError;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{demo_capability, MoonrakerConfig, MoonrakerDriver};
    use crate::job::PrintJob;
    use crate::optimizer::OptimizerConfig;
    use std::collections::HashMap;
    use std::io::Write;

    fn scheduler_with_one_printer() -> (Arc<ParallelScheduler>, Arc<MoonrakerDriver>) {
        let driver = Arc::new(MoonrakerDriver::new(
            MoonrakerConfig {
                base_url: "http://voron.local".into(),
                api_key: None,
            },
            demo_capability("voron", &["PLA"]),
        ));
        let mut printers: HashMap<String, Arc<dyn PrinterDriver>> = HashMap::new();
        printers.insert("voron".to_string(), driver.clone());
        let scheduler = Arc::new(ParallelScheduler::new(printers, OptimizerConfig::default()));
        (scheduler, driver)
    }

    #[tokio::test]
    async fn happy_path_completes() {
        let (scheduler, driver) = scheduler_with_one_printer();
        driver.connect().await.unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "G28").unwrap();

        let mut job = PrintJob::new(
            "J1",
            "widget",
            file.path().to_str().unwrap(),
            "PLA",
            1,
            None,
            2,
            chrono::Utc::now(),
        );
        job.status = JobStatus::Scheduled;
        job.assigned_printer = Some("voron".to_string());
        scheduler.submit(job);

        let executor = PrintExecutor::new(
            scheduler.clone(),
            ExecutorConfig {
                status_poll_interval: Duration::from_millis(1),
                snapshot_interval: Duration::from_millis(5),
                retry_delay: Duration::from_millis(1),
                capture_first_layer: true,
            },
        );

        let outcome = executor.execute("J1").await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Completed);
        assert_eq!(scheduler.get("J1").unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn error_during_poll_requeues_with_incremented_retry() {
        let (scheduler, driver) = scheduler_with_one_printer();
        driver.connect().await.unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "G28").unwrap();

        let mut job = PrintJob::new(
            "X",
            "widget",
            file.path().to_str().unwrap(),
            "PLA",
            1,
            None,
            2,
            chrono::Utc::now(),
        );
        job.status = JobStatus::Scheduled;
        job.assigned_printer = Some("voron".to_string());
        scheduler.submit(job);

        // start_print clears any prior injected error, so wait for the job
        // to actually reach Printing before tripping the driver into ERROR,
        // otherwise the injection would be wiped before the first poll.
        let watch_scheduler = scheduler.clone();
        let watch_driver = driver.clone();
        tokio::spawn(async move {
            loop {
                if let Some(job) = watch_scheduler.get("X") {
                    if job.status == JobStatus::Printing {
                        watch_driver.inject_error("thermal runaway");
                        break;
                    }
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });

        let executor = PrintExecutor::new(
            scheduler.clone(),
            ExecutorConfig {
                status_poll_interval: Duration::from_millis(1),
                snapshot_interval: Duration::from_millis(5),
                retry_delay: Duration::from_millis(1),
                capture_first_layer: false,
            },
        );

        let outcome = executor.execute("X").await.unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Requeued(_)));

        let job = scheduler.get("X").unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.retry_count, 1);
        assert!(job.assigned_printer.is_none());
    }

    #[tokio::test]
    async fn missing_file_fails_before_printing() {
        let (scheduler, driver) = scheduler_with_one_printer();
        driver.connect().await.unwrap();

        let mut job = PrintJob::new(
            "Y",
            "widget",
            "/nonexistent/missing.gcode",
            "PLA",
            1,
            None,
            0,
            chrono::Utc::now(),
        );
        job.status = JobStatus::Scheduled;
        job.assigned_printer = Some("voron".to_string());
        scheduler.submit(job);

        let executor = PrintExecutor::new(scheduler.clone(), ExecutorConfig::default());
        let outcome = executor.execute("Y").await.unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Failed(_)));
        assert_eq!(scheduler.get("Y").unwrap().status, JobStatus::Failed);
    }
}

//! Print job queue optimizer, parallel scheduler, and printer driver/executor
//! abstraction.
//!
//! A job moves `Queued` → `Scheduled` → `Uploading` → `Printing` →
//! `Completed`/`Failed`, with `Cancelled` reachable from any non-terminal
//! state and a bounded `Failed` → `Queued` retry. [`optimizer`] scores queued
//! jobs against an idle printer; [`scheduler::ParallelScheduler`] runs that
//! scoring on a tick and owns the job table; [`executor::PrintExecutor`]
//! drives one assigned job through upload, printing, and completion against
//! a [`driver::PrinterDriver`].

#![deny(missing_docs)]

pub mod driver;
pub mod error;
pub mod executor;
pub mod job;
pub mod optimizer;
pub mod scheduler;

pub use driver::{BambuConfig, BambuDriver, MoonrakerConfig, MoonrakerDriver, PrinterDriver};
pub use error::{DriverError, SchedulerError};
pub use executor::{ExecutionOutcome, ExecutorConfig, PrintExecutor};
pub use job::{JobStatus, Material, PrintJob, PrinterCapability, PrinterState, PrinterStatus};
pub use optimizer::OptimizerConfig;
pub use scheduler::{ParallelScheduler, TickAssignment};

//! The asynchronous build pipeline: request facade, batching scheduler,
//! build executor, and the shell primitive they run commands through.
//!
//! Control flow: the HTTP layer calls
//! [`BuildService::request_build`](service::BuildService::request_build),
//! which validates the trigger, reserves the revision in the ledger, and
//! enqueues a [`BuildTask`](executor::BuildTask) on the
//! [`Scheduler`](scheduler::Scheduler). The scheduler's coordinator drains
//! the queue in fixed-size batches on a timer and hands each descriptor to
//! the [`Executor`](executor::Executor), which clones, builds, publishes to
//! the artifact store, and records the outcome in the ledger.

pub mod executor;
pub mod scheduler;
pub mod service;
pub mod shell;

pub use executor::{BuildTask, Executor};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use service::{BuildRequestOutcome, BuildService, ProjectSummary, RejectReason};

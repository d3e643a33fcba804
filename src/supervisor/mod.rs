//! Task supervision for crawl runs
//!
//! This module provides:
//! - `Supervisor`: launches a run as a monitored task with a wall-clock limit
//! - `RunControl`: start, progress, stats, logs, wait, and cancel by domain
//! - `RunRegistry`: the process-wide map of active runs
//! - `EventSender`: the structured event channel feeding the run log
//! - `DomainVerifier`: pre-flight DNS, socket, and certificate checks

mod control;
mod events;
mod registry;
mod run;
mod verify;

pub use control::{Progress, RunControl};
pub use events::{spawn_logger, CrawlEvent, EventSender};
pub use registry::{RunEntry, RunId, RunRegistry};
pub use run::Supervisor;
pub use verify::{
    parse_certificate, CertificateInfo, DomainVerifier, NetworkVerifier, VerificationReport,
};

//! Run event channel
//!
//! Workers never write log lines themselves. They push `CrawlEvent`s into an
//! unbounded channel; one logger task per run drains it, forwards each event
//! to `tracing`, and appends it to the persisted run log.

use crate::state::RunStatus;
use crate::storage::{LogLevel, PersistenceSink};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Something that happened during a run
#[derive(Debug, Clone, PartialEq)]
pub enum CrawlEvent {
    /// Free-form log line
    Line { level: LogLevel, message: String },

    /// Live progress after a page completed
    Progress { pages_crawled: u64, percentage: f64 },

    /// Lifecycle change
    Status(RunStatus),
}

impl CrawlEvent {
    pub fn level(&self) -> LogLevel {
        match self {
            Self::Line { level, .. } => *level,
            Self::Progress { .. } => LogLevel::Debug,
            Self::Status(RunStatus::Failed) => LogLevel::Warning,
            Self::Status(_) => LogLevel::Info,
        }
    }

    /// Rendering written to the run log
    pub fn message(&self) -> String {
        match self {
            Self::Line { message, .. } => message.clone(),
            Self::Progress {
                pages_crawled,
                percentage,
            } => format!("Progress: {:.2}% ({} pages)", percentage, pages_crawled),
            Self::Status(status) => format!("Status: {}", status),
        }
    }
}

/// Cloneable producer side of a run's event channel
///
/// Sending never blocks and never fails loudly: once the logger is gone,
/// events are dropped.
#[derive(Debug, Clone)]
pub struct EventSender {
    domain: String,
    tx: mpsc::UnboundedSender<CrawlEvent>,
}

impl EventSender {
    /// Creates a sender and the receiver a logger drains
    pub fn channel(domain: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<CrawlEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                domain: domain.into(),
                tx,
            },
            rx,
        )
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn send(&self, event: CrawlEvent) {
        let _ = self.tx.send(event);
    }

    pub fn line(&self, level: LogLevel, message: impl Into<String>) {
        self.send(CrawlEvent::Line {
            level,
            message: message.into(),
        });
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.line(LogLevel::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.line(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.line(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.line(LogLevel::Error, message);
    }

    pub fn progress(&self, pages_crawled: u64, percentage: f64) {
        self.send(CrawlEvent::Progress {
            pages_crawled,
            percentage,
        });
    }

    pub fn status(&self, status: RunStatus) {
        self.send(CrawlEvent::Status(status));
    }
}

/// Spawns the task that drains a run's events
///
/// The task ends once every `EventSender` for the channel has been dropped
/// and the backlog is written.
pub fn spawn_logger(
    domain: String,
    mut rx: mpsc::UnboundedReceiver<CrawlEvent>,
    sink: Arc<dyn PersistenceSink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let level = event.level();
            let message = event.message();

            match level {
                LogLevel::Debug => tracing::debug!(domain = %domain, "{}", message),
                LogLevel::Info => tracing::info!(domain = %domain, "{}", message),
                LogLevel::Warning => tracing::warn!(domain = %domain, "{}", message),
                LogLevel::Error => tracing::error!(domain = %domain, "{}", message),
            }

            if let Err(e) = sink.append_log(&domain, &message, level) {
                tracing::warn!("Failed to persist log line for {}: {}", domain, e);
            }
        }
    })
}

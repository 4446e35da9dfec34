//! Foreground notification channel
//!
//! The import/export pipelines run on background tasks and never touch
//! foreground-owned state directly. Everything user-visible (progress
//! ticks, notices, completion) crosses this one-directional channel and is
//! drained by the single foreground consumer: the CLI, or whatever frontend
//! embeds the library.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ScheduleXmlError;

/// Severity of a user-visible notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A user-visible outcome message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
    pub detail: Option<String>,
    pub consequence: Option<String>,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, "Info", message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, "Warning", message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, "Error", message)
    }

    fn new(level: NoticeLevel, title: &str, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.to_string(),
            message: message.into(),
            detail: None,
            consequence: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_consequence(mut self, consequence: impl Into<String>) -> Self {
        self.consequence = Some(consequence.into());
        self
    }

    /// Error notice for a failed pipeline run: a short cause, the full
    /// error text as detail, and the operation's consequence string.
    pub fn from_error(error: &ScheduleXmlError, consequence: &str) -> Self {
        let message = match error {
            ScheduleXmlError::Parse { .. } => "Failed to parse input XML.",
            ScheduleXmlError::Serialize { .. } => "Failed to write output XML.",
            ScheduleXmlError::Validation { .. } => "Validation failed.",
            ScheduleXmlError::MalformedDocument { .. } => "Input XML is malformed.",
            ScheduleXmlError::InconsistentStore { .. } => "Schedule data is inconsistent.",
            ScheduleXmlError::Io(_) => "File operation failed.",
            ScheduleXmlError::Http(_)
            | ScheduleXmlError::HttpStatus { .. }
            | ScheduleXmlError::Timeout { .. }
            | ScheduleXmlError::SchemaCompile { .. } => "Failed to obtain XSD schema.",
        };
        Notice::error(message)
            .with_detail(error.to_string())
            .with_consequence(consequence)
    }
}

/// One message from a background pipeline to the foreground.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// Advance the progress indicator by one increment.
    Tick,
    /// Show a notice to the user.
    Notify(Notice),
    /// The operation ended; tear down the progress indicator. On a
    /// successful import, carries the imported file's path for display.
    Finish { imported: Option<PathBuf> },
}

/// Cloneable sending half handed to the pipelines.
#[derive(Debug, Clone)]
pub struct UiSender {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl UiSender {
    /// Create a channel pair: the sender for the pipelines, the receiver
    /// for the foreground drain loop.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn tick(&self) {
        // A closed receiver means the foreground is gone; the pipeline
        // still runs to completion (fire and forget).
        let _ = self.tx.send(UiEvent::Tick);
    }

    pub fn notify(&self, notice: Notice) {
        let _ = self.tx.send(UiEvent::Notify(notice));
    }

    pub fn finish(&self, imported: Option<PathBuf>) {
        let _ = self.tx.send(UiEvent::Finish { imported });
    }
}

/// Foreground-side bounded fractional progress counter. Each tick advances
/// by a fixed increment; with `steps` matching the pipeline's tick count
/// the bar reaches exactly 1.0 at the end.
#[derive(Debug, Clone)]
pub struct ProgressCounter {
    fraction: f64,
    increment: f64,
}

impl ProgressCounter {
    pub fn new(steps: usize) -> Self {
        Self {
            fraction: 0.0,
            increment: 1.0 / steps.max(1) as f64,
        }
    }

    /// Advance one increment and return the new fraction, clamped to 1.0.
    pub fn tick(&mut self) -> f64 {
        self.fraction = (self.fraction + self.increment).min(1.0);
        self.fraction
    }

    pub fn fraction(&self) -> f64 {
        self.fraction
    }
}

/// Number of progress ticks each pipeline emits: parse/build stages for the
/// seven days, schema acquisition, validation, and the final read/write
/// stage.
pub const PIPELINE_TICKS: usize = 10;

//! Progress reporting
//!
//! The pipeline never writes to a UI directly. It reports typed events to an
//! [`EventSink`] supplied by the caller; every event renders as one
//! human-readable log line.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::pipeline::{CourseState, RunSummary};

/// Everything the pipeline reports while running
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineEvent {
    RunStarted { courses: usize },
    CourseStarted { index: usize, total: usize, course_id: String },
    CourseState { course_id: String, state: CourseState },
    CourseExtracted { course_id: String, course_name: String, videos: usize },
    CourseFailed { course_id: String, reason: String },
    DownloadStarted { filename: String },
    DownloadSucceeded { filename: String, bytes: u64 },
    DownloadFailed { filename: String, reason: String },
    DispatchTimeout { waited: Duration, undispatched: usize },
    RunCompleted { summary: RunSummary },
    /// Diagnostics from the browser connection
    Browser(String),
    /// Free-form line, used for run-level errors
    Message(String),
}

impl PipelineEvent {
    /// Failures the user should notice
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            PipelineEvent::CourseFailed { .. }
                | PipelineEvent::DownloadFailed { .. }
                | PipelineEvent::DispatchTimeout { .. }
        )
    }
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunStarted { courses } => write!(f, "starting run with {} courses", courses),
            Self::CourseStarted { index, total, course_id } => {
                write!(f, "[{}/{}] processing course: {}", index, total, course_id)
            }
            Self::CourseState { course_id, state } => write!(f, "course {}: {}", course_id, state),
            Self::CourseExtracted { course_id, course_name, videos } => write!(
                f,
                "course {} ({}): {} videos found",
                course_id, course_name, videos
            ),
            Self::CourseFailed { course_id, reason } => {
                write!(f, "failed to read course {}: {}", course_id, reason)
            }
            Self::DownloadStarted { filename } => write!(f, "downloading: {}", filename),
            Self::DownloadSucceeded { filename, .. } => write!(f, "download succeeded: {}", filename),
            Self::DownloadFailed { filename, reason } => {
                write!(f, "download failed: {} - {}", filename, reason)
            }
            Self::DispatchTimeout { waited, undispatched } => write!(
                f,
                "no worker free after {:.1}s, {} courses not started; check the network connection",
                waited.as_secs_f64(),
                undispatched
            ),
            Self::RunCompleted { summary } => write!(
                f,
                "run finished: {} downloaded, {} failed, {} courses failed",
                summary.videos_downloaded, summary.videos_failed, summary.courses_failed
            ),
            Self::Browser(line) => write!(f, "[BROWSER] {}", line),
            Self::Message(line) => f.write_str(line),
        }
    }
}

/// Receiver of pipeline events and run lifecycle hooks
pub trait EventSink: Send + Sync {
    fn on_start(&self) {}

    fn report(&self, event: &PipelineEvent);

    fn on_finish(&self, _summary: Option<&RunSummary>) {}
}

/// Renders events through `tracing`
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn on_start(&self) {
        info!("=== download run started ===");
    }

    fn report(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::CourseState { .. } | PipelineEvent::Browser(_) => debug!("{}", event),
            PipelineEvent::DownloadSucceeded { .. } => info!("✅ {}", event),
            _ if event.is_failure() => warn!("❌ {}", event),
            _ => info!("{}", event),
        }
    }

    fn on_finish(&self, _summary: Option<&RunSummary>) {
        info!("=== download run finished ===");
    }
}

/// Message forwarded by [`ChannelSink`]
#[derive(Debug, Clone)]
pub enum SinkMessage {
    Started,
    Event(PipelineEvent),
    Finished(Option<RunSummary>),
}

/// Forwards events to another task, typically a UI loop
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkMessage>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, message: SinkMessage) {
        // A closed receiver means nobody is listening any more
        let _ = self.tx.send(message);
    }
}

impl EventSink for ChannelSink {
    fn on_start(&self) {
        self.send(SinkMessage::Started);
    }

    fn report(&self, event: &PipelineEvent) {
        self.send(SinkMessage::Event(event.clone()));
    }

    fn on_finish(&self, summary: Option<&RunSummary>) {
        self.send(SinkMessage::Finished(summary.cloned()));
    }
}

/// Collects rendered log lines in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
    events: Mutex<Vec<PipelineEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_line(&self, line: String) {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(line);
    }

    /// Every log line so far, lifecycle markers included
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Every event so far
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of log lines containing `needle`
    pub fn count_containing(&self, needle: &str) -> usize {
        self.lines().iter().filter(|line| line.contains(needle)).count()
    }
}

impl EventSink for MemorySink {
    fn on_start(&self) {
        self.push_line("=== download run started ===".to_string());
    }

    fn report(&self, event: &PipelineEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
        self.push_line(event.to_string());
    }

    fn on_finish(&self, _summary: Option<&RunSummary>) {
        self.push_line("=== download run finished ===".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_lines() {
        let started = PipelineEvent::CourseStarted {
            index: 2,
            total: 5,
            course_id: "C-9".to_string(),
        };
        assert_eq!(started.to_string(), "[2/5] processing course: C-9");

        let failed = PipelineEvent::DownloadFailed {
            filename: "a.mp4".to_string(),
            reason: "server returned status 404".to_string(),
        };
        assert_eq!(failed.to_string(), "download failed: a.mp4 - server returned status 404");
        assert!(failed.is_failure());
        assert_eq!(PipelineEvent::Browser("x".into()).to_string(), "[BROWSER] x");
    }

    #[test]
    fn test_memory_sink_collects_lines() {
        let sink = MemorySink::new();
        sink.on_start();
        sink.report(&PipelineEvent::DownloadStarted {
            filename: "a.mp4".to_string(),
        });
        sink.report(&PipelineEvent::DownloadSucceeded {
            filename: "a.mp4".to_string(),
            bytes: 3,
        });
        sink.on_finish(None);

        assert_eq!(sink.lines().len(), 4);
        assert_eq!(sink.count_containing("download succeeded:"), 1);
        assert_eq!(sink.events().len(), 2);
    }

    #[tokio::test]
    async fn test_channel_sink_forwards_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        sink.on_start();
        sink.report(&PipelineEvent::Message("hello".to_string()));
        sink.on_finish(None);
        drop(sink);

        assert!(matches!(rx.recv().await, Some(SinkMessage::Started)));
        match rx.recv().await {
            Some(SinkMessage::Event(event)) => assert_eq!(event.to_string(), "hello"),
            other => panic!("unexpected message: {:?}", other),
        }
        assert!(matches!(rx.recv().await, Some(SinkMessage::Finished(None))));
        assert!(rx.recv().await.is_none());
    }
}

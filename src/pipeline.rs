//! Bounded course pipeline
//!
//! Courses are admitted one by one against a worker semaphore. Each worker
//! reads its course page and downloads the listed videos in order; anything
//! that goes wrong stays inside that course.
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::catalog::CourseRecord;
use crate::config::{CatalogConfig, Config};
use crate::cookies::Credential;
use crate::download::VideoFetcher;
use crate::events::{EventSink, PipelineEvent};
use crate::extractor::{PageExtractor, VideoMetadata};
use crate::naming::{base_name, NameReservations};

/// Lifecycle of one course within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CourseState {
    Dispatched,
    Extracting,
    Downloading,
    Done,
    Failed,
}

impl fmt::Display for CourseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CourseState::Dispatched => "dispatched",
            CourseState::Extracting => "extracting",
            CourseState::Downloading => "downloading",
            CourseState::Done => "done",
            CourseState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Result of one course worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseOutcome {
    pub course_id: String,
    pub state: CourseState,
    pub downloaded: Vec<PathBuf>,
    pub failed_videos: usize,
    pub error_message: Option<String>,
}

/// Overall run results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub courses_total: usize,
    pub courses_dispatched: usize,
    pub courses_failed: usize,
    pub videos_downloaded: usize,
    pub videos_failed: usize,
    /// Dispatch stopped early because no worker became free in time
    pub dispatch_aborted: bool,
    pub total_time: Duration,
    pub outcomes: Vec<CourseOutcome>,
}

impl RunSummary {
    /// Write the summary as pretty-printed JSON
    pub async fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json_data = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json_data).await?;
        info!("💾 Results saved to: {}", path.display());
        Ok(())
    }
}

/// Tunables of the orchestrator
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub max_workers: usize,
    pub permit_timeout: Duration,
    pub pause_between_downloads: Duration,
    pub file_extension: String,
    pub columns: CatalogConfig,
}

impl From<&Config> for PipelineOptions {
    fn from(config: &Config) -> Self {
        Self {
            max_workers: config.pipeline.max_workers,
            permit_timeout: config.pipeline.permit_timeout(),
            pause_between_downloads: config.download.pause_between(),
            file_extension: config.download.file_extension.clone(),
            columns: config.catalog.clone(),
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Fans courses out to a bounded set of workers.
///
/// Each worker extracts one course and downloads its videos in table order.
/// Failures stay inside the course or video they happened in.
pub struct Pipeline {
    options: PipelineOptions,
    extractor: Arc<dyn PageExtractor>,
    fetcher: Arc<dyn VideoFetcher>,
    sink: Arc<dyn EventSink>,
}

impl Pipeline {
    pub fn new(
        options: PipelineOptions,
        extractor: Arc<dyn PageExtractor>,
        fetcher: Arc<dyn VideoFetcher>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            options,
            extractor,
            fetcher,
            sink,
        }
    }

    /// Process every course and wait for all dispatched workers.
    ///
    /// If no worker frees up within the permit timeout, the remaining courses
    /// are not started; workers already running still finish.
    pub async fn run(
        &self,
        courses: Vec<CourseRecord>,
        credentials: Vec<Credential>,
        destination: &Path,
    ) -> RunSummary {
        let start_time = Instant::now();
        let total = courses.len();
        let max_workers = self.options.max_workers.max(1);

        info!("🚀 Processing {} courses with {} workers", total, max_workers);
        self.sink.report(&PipelineEvent::RunStarted { courses: total });

        let worker = CourseWorker {
            extractor: Arc::clone(&self.extractor),
            fetcher: Arc::clone(&self.fetcher),
            sink: Arc::clone(&self.sink),
            reservations: Arc::new(NameReservations::new()),
            credentials: Arc::new(credentials),
            destination: Arc::new(destination.to_path_buf()),
            pause_between_downloads: self.options.pause_between_downloads,
            file_extension: self.options.file_extension.clone(),
        };

        let semaphore = Arc::new(Semaphore::new(max_workers));
        let mut workers = JoinSet::new();
        let mut dispatched = 0;
        let mut dispatch_aborted = false;

        for (index, record) in courses.into_iter().enumerate() {
            let permit = match tokio::time::timeout(
                self.options.permit_timeout,
                Arc::clone(&semaphore).acquire_owned(),
            )
            .await
            {
                Ok(Ok(permit)) => permit,
                Ok(Err(e)) => {
                    error!("Worker pool closed: {}", e);
                    dispatch_aborted = true;
                    break;
                }
                Err(_) => {
                    self.sink.report(&PipelineEvent::DispatchTimeout {
                        waited: self.options.permit_timeout,
                        undispatched: total - index,
                    });
                    dispatch_aborted = true;
                    break;
                }
            };

            let course_id = record.course_id(&self.options.columns).to_string();
            let lesson_id = record.lesson_id(&self.options.columns).to_string();
            let worker = worker.clone();
            dispatched += 1;

            workers.spawn(async move {
                let _permit = permit;
                worker.run_isolated(index + 1, total, course_id, lesson_id).await
            });
        }

        let mut outcomes = Vec::with_capacity(dispatched);
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!("Course worker did not finish: {}", e),
            }
        }

        let summary = RunSummary {
            courses_total: total,
            courses_dispatched: dispatched,
            courses_failed: outcomes
                .iter()
                .filter(|o| o.state == CourseState::Failed)
                .count(),
            videos_downloaded: outcomes.iter().map(|o| o.downloaded.len()).sum(),
            videos_failed: outcomes.iter().map(|o| o.failed_videos).sum(),
            dispatch_aborted,
            total_time: start_time.elapsed(),
            outcomes,
        };

        info!(
            "🎉 Run finished in {:.2}s: {} videos downloaded, {} failed",
            summary.total_time.as_secs_f64(),
            summary.videos_downloaded,
            summary.videos_failed
        );
        self.sink.report(&PipelineEvent::RunCompleted {
            summary: summary.clone(),
        });

        summary
    }
}

/// Shared state handed to each course task
#[derive(Clone)]
struct CourseWorker {
    extractor: Arc<dyn PageExtractor>,
    fetcher: Arc<dyn VideoFetcher>,
    sink: Arc<dyn EventSink>,
    reservations: Arc<NameReservations>,
    credentials: Arc<Vec<Credential>>,
    destination: Arc<PathBuf>,
    pause_between_downloads: Duration,
    file_extension: String,
}

impl CourseWorker {
    fn transition(&self, course_id: &str, state: CourseState) {
        self.sink.report(&PipelineEvent::CourseState {
            course_id: course_id.to_string(),
            state,
        });
    }

    /// Run one course, turning a panic into a failed outcome
    async fn run_isolated(
        self,
        index: usize,
        total: usize,
        course_id: String,
        lesson_id: String,
    ) -> CourseOutcome {
        let attempt = AssertUnwindSafe(self.process_course(index, total, course_id.clone(), lesson_id))
            .catch_unwind()
            .await;

        match attempt {
            Ok(outcome) => outcome,
            Err(panic) => {
                let reason = format!("worker panicked: {}", panic_message(panic.as_ref()));
                error!("💥 Course {} {}", course_id, reason);
                self.sink.report(&PipelineEvent::CourseFailed {
                    course_id: course_id.clone(),
                    reason: reason.clone(),
                });
                self.transition(&course_id, CourseState::Failed);
                CourseOutcome {
                    course_id,
                    state: CourseState::Failed,
                    downloaded: Vec::new(),
                    failed_videos: 0,
                    error_message: Some(reason),
                }
            }
        }
    }

    async fn process_course(
        &self,
        index: usize,
        total: usize,
        course_id: String,
        lesson_id: String,
    ) -> CourseOutcome {
        self.sink.report(&PipelineEvent::CourseStarted {
            index,
            total,
            course_id: course_id.clone(),
        });
        self.transition(&course_id, CourseState::Dispatched);

        let mut outcome = CourseOutcome {
            course_id: course_id.clone(),
            state: CourseState::Extracting,
            downloaded: Vec::new(),
            failed_videos: 0,
            error_message: None,
        };

        self.transition(&course_id, CourseState::Extracting);
        let listing = match self.extractor.extract(&course_id, &lesson_id).await {
            Ok(listing) => listing,
            Err(e) => {
                self.sink.report(&PipelineEvent::CourseFailed {
                    course_id: course_id.clone(),
                    reason: e.to_string(),
                });
                self.transition(&course_id, CourseState::Failed);
                outcome.state = CourseState::Failed;
                outcome.error_message = Some(e.to_string());
                return outcome;
            }
        };

        self.sink.report(&PipelineEvent::CourseExtracted {
            course_id: course_id.clone(),
            course_name: listing.course_name.clone(),
            videos: listing.videos.len(),
        });

        if !listing.videos.is_empty() {
            self.transition(&course_id, CourseState::Downloading);
        }

        for (position, video) in listing.videos.iter().enumerate() {
            if position > 0 && !self.pause_between_downloads.is_zero() {
                tokio::time::sleep(self.pause_between_downloads).await;
            }

            match self.download_video(video, &listing.course_name).await {
                Some(path) => outcome.downloaded.push(path),
                None => outcome.failed_videos += 1,
            }
        }

        self.transition(&course_id, CourseState::Done);
        outcome.state = CourseState::Done;
        outcome
    }

    async fn download_video(&self, video: &VideoMetadata, course_name: &str) -> Option<PathBuf> {
        let base = base_name(&video.record_date, course_name, &video.segment_title);
        let filename = self
            .reservations
            .reserve(&self.destination, &base, &self.file_extension)
            .await;
        let path = self.destination.join(&filename);

        self.sink.report(&PipelineEvent::DownloadStarted {
            filename: filename.clone(),
        });

        match self
            .fetcher
            .fetch(&video.download_url, &path, &self.credentials)
            .await
        {
            Ok(bytes) => {
                debug!("{} ({} bytes)", filename, bytes);
                self.sink
                    .report(&PipelineEvent::DownloadSucceeded { filename, bytes });
                Some(path)
            }
            Err(e) => {
                self.sink.report(&PipelineEvent::DownloadFailed {
                    filename,
                    reason: e.to_string(),
                });
                None
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_summary_saved_as_json() {
        tokio_test::block_on(async {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("report.json");
            let summary = RunSummary {
                courses_total: 2,
                courses_dispatched: 2,
                courses_failed: 1,
                videos_downloaded: 3,
                videos_failed: 0,
                dispatch_aborted: false,
                total_time: Duration::from_millis(1500),
                outcomes: vec![CourseOutcome {
                    course_id: "C-1".to_string(),
                    state: CourseState::Failed,
                    downloaded: Vec::new(),
                    failed_videos: 0,
                    error_message: Some("page not ready".to_string()),
                }],
            };

            summary.save(&path).await.unwrap();

            let loaded: RunSummary =
                serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
            assert_eq!(loaded, summary);
        });
    }

    #[test]
    fn test_options_follow_config() {
        let config = crate::config::ConfigBuilder::new()
            .with_workers(2)
            .with_permit_timeout(Duration::from_secs(7))
            .build();
        let options = PipelineOptions::from(&config);

        assert_eq!(options.max_workers, 2);
        assert_eq!(options.permit_timeout, Duration::from_secs(7));
        assert_eq!(options.pause_between_downloads, Duration::from_secs(1));
        assert_eq!(options.file_extension, ".mp4");
    }
}

/// Course Video Fetcher
///
/// Bulk downloader for recorded lessons of a web-based school console.
/// Reads a course catalog, opens each course in a real browser session,
/// lists its recordings and downloads them with the user's cookies.

pub mod catalog;
pub mod config;
pub mod cookies;
pub mod download;
pub mod error;
pub mod events;
pub mod extractor;
pub mod job;
pub mod naming;
pub mod pipeline;

// Re-export main types for easy access
pub use crate::catalog::{load_catalog, CourseRecord};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::cookies::{parse_cookie_string, to_header, Credential};
pub use crate::download::{HttpDownloader, VideoFetcher};
pub use crate::error::{CatalogError, DownloadError, ExtractError, FetchError};
pub use crate::events::{ChannelSink, EventSink, MemorySink, PipelineEvent, SinkMessage, TracingSink};
pub use crate::extractor::{ChromeExtractor, CourseListing, PageExtractor, VideoMetadata};
pub use crate::job::{run_job, run_with, RunInputs};
pub use crate::naming::{base_name, sanitize_filename, unique_filename, NameReservations};
pub use crate::pipeline::{CourseOutcome, CourseState, Pipeline, PipelineOptions, RunSummary};

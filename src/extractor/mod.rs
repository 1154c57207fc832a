//! Course page extraction
//!
//! A page extractor turns a course/lesson pair into the course title and
//! the list of downloadable recordings shown in the lesson table.

pub mod browser;
pub mod readiness;

pub use browser::ChromeExtractor;
pub use readiness::{DomProbe, PollingWait, WaitForReady};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ExtractError;
use crate::naming::sanitize_filename;

const RECORD_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One downloadable recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub download_url: String,
    /// Calendar date (`YYYY-MM-DD`) once validated
    pub record_date: String,
    pub segment_title: String,
    pub record_method: String,
}

/// Row as read from the lesson table, before validation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawVideoRow {
    pub download_url: String,
    pub record_date: String,
    pub segment_title: String,
    pub record_method: String,
}

/// Everything extracted for one course
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseListing {
    pub course_name: String,
    pub videos: Vec<VideoMetadata>,
}

/// Source of course listings
#[async_trait]
pub trait PageExtractor: Send + Sync {
    async fn extract(&self, course_id: &str, lesson_id: &str) -> Result<CourseListing, ExtractError>;
}

/// Reduce a `YYYY-MM-DD HH:MM:SS` timestamp to its date.
///
/// Anything else is cut at the first space.
pub fn format_record_date(raw: &str) -> String {
    match NaiveDateTime::parse_from_str(raw, RECORD_DATE_FORMAT) {
        Ok(timestamp) => timestamp.format("%Y-%m-%d").to_string(),
        Err(_) => raw.split(' ').next().unwrap_or_default().to_string(),
    }
}

/// Whether a URL points at a downloadable video
pub fn is_video_url(url: &str, extensions: &[String]) -> bool {
    let url = url.to_ascii_lowercase();
    !url.is_empty()
        && extensions
            .iter()
            .any(|ext| url.ends_with(&ext.to_ascii_lowercase()))
}

/// Keep rows with a video URL and normalize their dates
pub fn filter_videos(rows: Vec<RawVideoRow>, extensions: &[String]) -> Vec<VideoMetadata> {
    let total = rows.len();
    let videos: Vec<VideoMetadata> = rows
        .into_iter()
        .filter(|row| is_video_url(&row.download_url, extensions))
        .map(|row| VideoMetadata {
            record_date: format_record_date(&row.record_date),
            download_url: row.download_url,
            segment_title: row.segment_title,
            record_method: row.record_method,
        })
        .collect();

    if videos.len() < total {
        debug!("Discarded {} of {} table rows without a video link", total - videos.len(), total);
    }
    videos
}

/// Strip the label in front of the course title and make it file-safe
pub fn clean_course_title(raw: &str, prefix: &str) -> String {
    let title = raw.trim();
    let title = title.strip_prefix(prefix).unwrap_or(title);
    sanitize_filename(title.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(url: &str, date: &str) -> RawVideoRow {
        RawVideoRow {
            download_url: url.to_string(),
            record_date: date.to_string(),
            segment_title: "Lesson 1".to_string(),
            record_method: "cloud".to_string(),
        }
    }

    fn mp4() -> Vec<String> {
        vec![".mp4".to_string()]
    }

    #[test]
    fn test_filter_excludes_non_video_urls() {
        let rows = vec![
            row("https://cdn.example.com/cover.jpg", "2024-01-01 10:00:00"),
            row("", "2024-01-01 10:00:00"),
            row("https://cdn.example.com/v.mp4", "2024-01-02 08:30:00"),
        ];
        let videos = filter_videos(rows, &mp4());

        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].download_url, "https://cdn.example.com/v.mp4");
        assert_eq!(videos[0].record_date, "2024-01-02");
    }

    #[test]
    fn test_unparsable_date_falls_back_to_prefix() {
        let videos = filter_videos(vec![row("https://x/v.mp4", "2024/03/05 9:00")], &mp4());
        assert_eq!(videos[0].record_date, "2024/03/05");
    }

    #[test]
    fn test_format_record_date() {
        assert_eq!(format_record_date("2023-12-31 23:59:59"), "2023-12-31");
        assert_eq!(format_record_date("yesterday"), "yesterday");
        assert_eq!(format_record_date(""), "");
    }

    #[test]
    fn test_extension_match_ignores_case() {
        assert!(is_video_url("https://x/LESSON.MP4", &mp4()));
        assert!(!is_video_url("https://x/lesson.mp4?token=1", &mp4()));
    }

    #[test]
    fn test_row_order_is_preserved() {
        let rows = vec![
            row("https://x/1.mp4", "2024-01-01 00:00:00"),
            row("https://x/skip.png", "2024-01-01 00:00:00"),
            row("https://x/2.mp4", "2024-01-01 00:00:00"),
        ];
        let urls: Vec<_> = filter_videos(rows, &mp4())
            .into_iter()
            .map(|v| v.download_url)
            .collect();
        assert_eq!(urls, vec!["https://x/1.mp4", "https://x/2.mp4"]);
    }

    #[test]
    fn test_raw_rows_deserialize_with_missing_fields() {
        let rows: Vec<RawVideoRow> =
            serde_json::from_str(r#"[{"download_url":"https://x/a.mp4"},{}]"#).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], RawVideoRow::default());
    }

    #[test]
    fn test_clean_course_title() {
        assert_eq!(clean_course_title("课程名称：高一 数学/提高", "课程名称："), "高一 数学_提高");
        assert_eq!(clean_course_title("  Physics ", "课程名称："), "Physics");
    }
}

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the course video fetcher
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Catalog layout
    pub catalog: CatalogConfig,

    /// Browser session and page extraction settings
    pub browser: BrowserConfig,

    /// HTTP download settings
    pub download: DownloadConfig,

    /// Concurrency settings
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Leading rows ignored before the header row
    pub banner_rows: usize,

    /// Header text of the course identifier column
    pub course_id_column: String,

    /// Header text of the lesson identifier column
    pub lesson_id_column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run Chromium without a window
    pub headless: bool,

    /// Explicit Chromium binary, otherwise auto-detected
    pub chrome_executable: Option<PathBuf>,

    /// User agent presented by the browser and the downloader
    pub user_agent: String,

    /// Domain the session cookies are installed on
    pub cookie_domain: String,

    /// Lesson management page, `{course_id}` and `{lesson_id}` are substituted
    pub lesson_url_template: String,

    /// Element whose presence means the video table has rendered
    pub ready_selector: String,

    /// Maximum wait for the ready selector (seconds)
    pub ready_timeout_secs: u64,

    /// Pause after the ready selector appears (milliseconds)
    pub settle_delay_ms: u64,

    /// DOM polling interval while waiting (milliseconds)
    pub poll_interval_ms: u64,

    /// XPath of the element holding the course title
    pub course_title_xpath: String,

    /// Literal label stripped from the course title
    pub course_title_prefix: String,

    /// Run page extraction one course at a time
    pub serialize_navigation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Whole-request timeout for one video (seconds)
    pub timeout_secs: u64,

    /// Pause between consecutive downloads of one course (milliseconds)
    pub pause_between_ms: u64,

    /// URL suffixes accepted as downloadable videos
    pub video_extensions: Vec<String>,

    /// Extension given to saved files
    pub file_extension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum number of courses processed at once
    pub max_workers: usize,

    /// Maximum wait for a free worker before dispatch is abandoned (milliseconds)
    pub permit_timeout_ms: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            banner_rows: 3,
            course_id_column: "课程ID".to_string(),
            lesson_id_column: "课节ID".to_string(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            chrome_executable: None,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/90.0.4430.212 Safari/537.36".to_string(),
            cookie_domain: ".eeo.cn".to_string(),
            lesson_url_template: "https://console.eeo.cn/saas/school/index.html#/singlePage/CourseManagement/recordLessonManagement?courseId={course_id}&lessonId={lesson_id}&record=true&live=true".to_string(),
            ready_selector: "table > tbody > tr:first-child".to_string(),
            ready_timeout_secs: 60,
            settle_delay_ms: 2000,
            poll_interval_ms: 250,
            course_title_xpath: "//p[contains(.,'课程名称：')]/span".to_string(),
            course_title_prefix: "课程名称：".to_string(),
            serialize_navigation: false,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30 * 60,
            pause_between_ms: 1000,
            video_extensions: vec![".mp4".to_string()],
            file_extension: ".mp4".to_string(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_workers: 5,
            permit_timeout_ms: 30_000,
        }
    }
}

impl BrowserConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Deep link to the lesson management page of one course
    pub fn lesson_url(&self, course_id: &str, lesson_id: &str) -> String {
        self.lesson_url_template
            .replace("{course_id}", &urlencoding::encode(course_id))
            .replace("{lesson_id}", &urlencoding::encode(lesson_id))
    }
}

impl DownloadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn pause_between(&self) -> Duration {
        Duration::from_millis(self.pause_between_ms)
    }
}

impl PipelineConfig {
    pub fn permit_timeout(&self) -> Duration {
        Duration::from_millis(self.permit_timeout_ms)
    }
}

impl Config {
    /// Load configuration from the first config file found, falling back to
    /// defaults with environment overrides
    pub fn load() -> Result<Self> {
        let config_paths = ["course-fetcher.toml", "config/course-fetcher.toml"];

        for path in &config_paths {
            let path = Path::new(path);
            if path.exists() {
                match Self::from_file(path) {
                    Ok(config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {:#}", path.display(), e);
                    }
                }
            }
        }

        Self::from_env()
    }

    /// Load configuration from a specific TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&config_str).with_context(|| format!("parsing {}", path.display()))
    }

    /// Defaults overridden by `COURSE_FETCHER_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(workers) = std::env::var("COURSE_FETCHER_WORKERS") {
            config.pipeline.max_workers = workers
                .parse()
                .with_context(|| format!("COURSE_FETCHER_WORKERS={workers}"))?;
        }

        if let Ok(headless) = std::env::var("COURSE_FETCHER_HEADLESS") {
            config.browser.headless = matches!(headless.as_str(), "1" | "true" | "yes");
        }

        if let Ok(path) = std::env::var("COURSE_FETCHER_CHROME") {
            config.browser.chrome_executable = Some(PathBuf::from(path));
        }

        if let Ok(domain) = std::env::var("COURSE_FETCHER_COOKIE_DOMAIN") {
            config.browser.cookie_domain = domain;
        }

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.max_workers == 0 {
            return Err(anyhow!("max_workers must be greater than 0"));
        }

        if self.pipeline.permit_timeout_ms == 0 {
            return Err(anyhow!("permit_timeout_ms must be greater than 0"));
        }

        if self.download.video_extensions.is_empty() {
            return Err(anyhow!("at least one video extension is required"));
        }

        if !self.browser.lesson_url_template.contains("{course_id}")
            || !self.browser.lesson_url_template.contains("{lesson_id}")
        {
            return Err(anyhow!(
                "lesson_url_template must contain {{course_id}} and {{lesson_id}}"
            ));
        }

        if self.browser.poll_interval_ms == 0 {
            return Err(anyhow!("poll_interval_ms must be greater than 0"));
        }

        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Course Fetcher Configuration:\n\
            - Workers: {}\n\
            - Permit Timeout: {}ms\n\
            - Headless: {}\n\
            - Cookie Domain: {}\n\
            - Settle Delay: {}ms\n\
            - Download Timeout: {}s\n\
            - Video Extensions: {}",
            self.pipeline.max_workers,
            self.pipeline.permit_timeout_ms,
            self.browser.headless,
            self.browser.cookie_domain,
            self.browser.settle_delay_ms,
            self.download.timeout_secs,
            self.download.video_extensions.join(", "),
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.config.pipeline.max_workers = workers;
        self
    }

    pub fn with_permit_timeout(mut self, timeout: Duration) -> Self {
        self.config.pipeline.permit_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.config.browser.headless = headless;
        self
    }

    pub fn with_chrome_executable(mut self, path: PathBuf) -> Self {
        self.config.browser.chrome_executable = Some(path);
        self
    }

    pub fn with_download_pause(mut self, pause: Duration) -> Self {
        self.config.download.pause_between_ms = pause.as_millis() as u64;
        self
    }

    pub fn with_banner_rows(mut self, rows: usize) -> Self {
        self.config.catalog.banner_rows = rows;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

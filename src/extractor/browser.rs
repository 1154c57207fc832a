//! Chromium-backed page extractor
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::readiness::{DomProbe, PollingWait, WaitForReady};
use super::{clean_course_title, filter_videos, CourseListing, PageExtractor, RawVideoRow};
use crate::config::{BrowserConfig, Config};
use crate::cookies::Credential;
use crate::error::{ExtractError, FetchError};
use crate::events::{EventSink, PipelineEvent};

/// Reads the lesson table: link in cell 8, date in 4, title in 1, method in 3
const ROW_EXTRACTION_SCRIPT: &str = r#"
Array.from(document.querySelectorAll('table tbody tr')).map(row => {
    const cells = row.querySelectorAll('td');
    return {
        download_url: cells[8]?.querySelector('a')?.href || '',
        record_date: cells[4]?.textContent?.trim() || '',
        segment_title: cells[1]?.textContent?.trim() || '',
        record_method: cells[3]?.textContent?.trim() || ''
    };
})
"#;

/// One Chromium process shared by all course workers.
///
/// Every extraction opens its own page, so concurrent courses navigate
/// independently. With `serialize_navigation` set, extractions take turns.
pub struct ChromeExtractor {
    browser: Browser,
    handler_task: JoinHandle<()>,
    config: BrowserConfig,
    video_extensions: Vec<String>,
    readiness: Arc<dyn WaitForReady>,
    navigation_lock: Option<Mutex<()>>,
}

impl ChromeExtractor {
    /// Launch Chromium and install the session cookies
    pub async fn launch(
        config: &Config,
        credentials: &[Credential],
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, FetchError> {
        let browser_config = &config.browser;

        let mut builder = chromiumoxide::BrowserConfig::builder()
            .arg("--disable-web-security")
            .arg(format!("--user-agent={}", browser_config.user_agent));
        if !browser_config.headless {
            builder = builder.with_head();
        }
        if let Some(ref executable) = browser_config.chrome_executable {
            builder = builder.chrome_executable(executable);
        }
        let launch_config = builder.build().map_err(FetchError::Browser)?;

        info!("🌐 Launching Chromium (headless: {})", browser_config.headless);
        let (browser, mut handler) = Browser::launch(launch_config)
            .await
            .map_err(|e| FetchError::Browser(format!("failed to launch: {}", e)))?;

        let handler_task = tokio::spawn(async move {
            while let Some(message) = handler.next().await {
                if let Err(e) = message {
                    sink.report(&PipelineEvent::Browser(e.to_string()));
                }
            }
            debug!("Browser handler task ended");
        });

        let extractor = Self {
            browser,
            handler_task,
            config: browser_config.clone(),
            video_extensions: config.download.video_extensions.clone(),
            readiness: Arc::new(PollingWait::new(
                browser_config.poll_interval(),
                browser_config.settle_delay(),
            )),
            navigation_lock: browser_config.serialize_navigation.then(|| Mutex::new(())),
        };
        extractor.install_cookies(credentials).await?;

        Ok(extractor)
    }

    /// Replace the readiness strategy
    pub fn with_readiness(mut self, readiness: Arc<dyn WaitForReady>) -> Self {
        self.readiness = readiness;
        self
    }

    async fn install_cookies(&self, credentials: &[Credential]) -> Result<(), FetchError> {
        let cookies = credentials
            .iter()
            .map(|credential| {
                CookieParam::builder()
                    .name(&credential.name)
                    .value(&credential.value)
                    .domain(&self.config.cookie_domain)
                    .path("/")
                    .secure(credential.secure)
                    .build()
                    .map_err(FetchError::Browser)
            })
            .collect::<Result<Vec<_>, _>>()?;

        if cookies.is_empty() {
            warn!("No usable cookies supplied, pages will load unauthenticated");
            return Ok(());
        }

        let count = cookies.len();
        self.browser
            .set_cookies(cookies)
            .await
            .map_err(|e| FetchError::Browser(format!("failed to set cookies: {}", e)))?;
        info!("🍪 Installed {} cookies for {}", count, self.config.cookie_domain);
        Ok(())
    }

    async fn read_course_page(&self, page: &Page, url: &str) -> Result<CourseListing, ExtractError> {
        page.goto(url)
            .await
            .map_err(|e| ExtractError::Navigation(e.to_string()))?;

        self.readiness
            .wait_for_ready(
                &PageProbe(page),
                &self.config.ready_selector,
                self.config.ready_timeout(),
            )
            .await?;

        let raw_title = page
            .find_xpath(&self.config.course_title_xpath)
            .await
            .map_err(|e| ExtractError::Extraction(format!("course title: {}", e)))?
            .inner_text()
            .await
            .map_err(|e| ExtractError::Extraction(format!("course title: {}", e)))?
            .unwrap_or_default();

        let params = EvaluateParams::builder()
            .expression(ROW_EXTRACTION_SCRIPT)
            .return_by_value(true)
            .build()
            .map_err(ExtractError::Extraction)?;
        let rows: Vec<RawVideoRow> = page
            .evaluate_expression(params)
            .await
            .map_err(|e| ExtractError::Extraction(format!("table rows: {}", e)))?
            .into_value()
            .map_err(|e| ExtractError::Extraction(format!("table rows: {}", e)))?;

        debug!("Read {} table rows from {}", rows.len(), url);

        Ok(CourseListing {
            course_name: clean_course_title(&raw_title, &self.config.course_title_prefix),
            videos: filter_videos(rows, &self.video_extensions),
        })
    }

    /// Close the browser and wait for the process to exit
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            debug!("Browser process wait failed: {}", e);
        }
    }
}

impl Drop for ChromeExtractor {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

#[async_trait]
impl PageExtractor for ChromeExtractor {
    async fn extract(&self, course_id: &str, lesson_id: &str) -> Result<CourseListing, ExtractError> {
        let _turn = match self.navigation_lock {
            Some(ref lock) => Some(lock.lock().await),
            None => None,
        };

        let url = self.config.lesson_url(course_id, lesson_id);
        debug!("Opening {}", url);

        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| ExtractError::Navigation(e.to_string()))?;

        let listing = self.read_course_page(&page, &url).await;

        if let Err(e) = page.close().await {
            debug!("Failed to close page for course {}: {}", course_id, e);
        }

        listing
    }
}

struct PageProbe<'a>(&'a Page);

#[async_trait]
impl DomProbe for PageProbe<'_> {
    async fn is_present(&self, selector: &str) -> Result<bool, ExtractError> {
        let quoted = serde_json::to_string(selector)
            .map_err(|e| ExtractError::Extraction(format!("selector {}: {}", selector, e)))?;
        let params = EvaluateParams::builder()
            .expression(selector_check_script(&quoted))
            .return_by_value(true)
            .build()
            .map_err(ExtractError::Extraction)?;

        self.0
            .evaluate_expression(params)
            .await
            .map_err(|e| ExtractError::Extraction(format!("probing `{}`: {}", selector, e)))?
            .into_value()
            .map_err(|e| ExtractError::Extraction(format!("probing `{}`: {}", selector, e)))
    }
}

/// Expression that is `true` once `selector` (a JSON string literal) matches
fn selector_check_script(quoted_selector: &str) -> String {
    format!("document.querySelector({}) !== null", quoted_selector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_check_script_quotes_selector() {
        let quoted = serde_json::to_string("table > tbody > tr:first-child").unwrap();
        assert_eq!(
            selector_check_script(&quoted),
            r#"document.querySelector("table > tbody > tr:first-child") !== null"#
        );

        let quoted = serde_json::to_string(r#"a[href="x"]"#).unwrap();
        assert_eq!(
            selector_check_script(&quoted),
            r#"document.querySelector("a[href=\"x\"]") !== null"#
        );
    }
}

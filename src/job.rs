//! Run setup and teardown around the pipeline
//!
//! A job validates the caller's inputs, performs the run-level setup whose
//! failure stops everything (catalog, destination directory, browser), then
//! hands over to [`Pipeline`].
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::catalog::{load_catalog, CourseRecord};
use crate::config::Config;
use crate::cookies::{parse_cookie_string, Credential};
use crate::download::{HttpDownloader, VideoFetcher};
use crate::error::FetchError;
use crate::events::{EventSink, PipelineEvent};
use crate::extractor::{ChromeExtractor, PageExtractor};
use crate::pipeline::{Pipeline, PipelineOptions, RunSummary};

/// The three inputs a front end supplies
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunInputs {
    pub catalog_path: PathBuf,
    pub cookie: String,
    pub destination_dir: PathBuf,
}

impl RunInputs {
    pub fn new(
        catalog_path: impl Into<PathBuf>,
        cookie: impl Into<String>,
        destination_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            catalog_path: catalog_path.into(),
            cookie: cookie.into(),
            destination_dir: destination_dir.into(),
        }
    }

    /// Reject empty inputs before anything is started
    pub fn validate(&self) -> Result<(), FetchError> {
        if self.catalog_path.as_os_str().is_empty() {
            return Err(FetchError::InputValidation("catalog file".to_string()));
        }
        if self.cookie.trim().is_empty() {
            return Err(FetchError::InputValidation("cookie".to_string()));
        }
        if self.destination_dir.as_os_str().is_empty() {
            return Err(FetchError::InputValidation("destination directory".to_string()));
        }
        Ok(())
    }
}

/// Run a complete job with a Chromium extractor and the HTTP downloader
pub async fn run_job(
    inputs: &RunInputs,
    config: &Config,
    sink: Arc<dyn EventSink>,
) -> Result<RunSummary, FetchError> {
    sink.on_start();
    let result = launch_and_run(inputs, config, Arc::clone(&sink)).await;
    finish(sink.as_ref(), &result);
    result
}

async fn launch_and_run(
    inputs: &RunInputs,
    config: &Config,
    sink: Arc<dyn EventSink>,
) -> Result<RunSummary, FetchError> {
    let (credentials, courses) = prepare(inputs, config).await?;

    let fetcher = HttpDownloader::new(config.download.timeout(), &config.browser.user_agent)
        .map_err(|e| FetchError::Client(e.to_string()))?;
    let extractor = Arc::new(ChromeExtractor::launch(config, &credentials, Arc::clone(&sink)).await?);

    let pipeline = Pipeline::new(
        PipelineOptions::from(config),
        Arc::clone(&extractor) as Arc<dyn PageExtractor>,
        Arc::new(fetcher),
        sink,
    );
    let summary = pipeline
        .run(courses, credentials, &inputs.destination_dir)
        .await;
    drop(pipeline);

    match Arc::try_unwrap(extractor) {
        Ok(extractor) => extractor.close().await,
        Err(_) => warn!("Browser still in use after the run, leaving it to shut down on drop"),
    }

    Ok(summary)
}

/// Run a job with caller-supplied extraction and download backends.
///
/// Lifecycle hooks are fired around the run, as in [`run_job`].
pub async fn run_with(
    inputs: &RunInputs,
    config: &Config,
    extractor: Arc<dyn PageExtractor>,
    fetcher: Arc<dyn VideoFetcher>,
    sink: Arc<dyn EventSink>,
) -> Result<RunSummary, FetchError> {
    sink.on_start();
    let result = match prepare(inputs, config).await {
        Ok((credentials, courses)) => {
            let pipeline = Pipeline::new(
                PipelineOptions::from(config),
                extractor,
                fetcher,
                Arc::clone(&sink),
            );
            Ok(pipeline
                .run(courses, credentials, &inputs.destination_dir)
                .await)
        }
        Err(e) => Err(e),
    };
    finish(sink.as_ref(), &result);
    result
}

/// Validate inputs, decode cookies, load the catalog and create the
/// destination directory
async fn prepare(
    inputs: &RunInputs,
    config: &Config,
) -> Result<(Vec<Credential>, Vec<CourseRecord>), FetchError> {
    inputs.validate()?;

    let credentials = parse_cookie_string(&inputs.cookie);
    info!("🍪 Parsed {} cookies", credentials.len());

    let courses = load_catalog(&inputs.catalog_path, config.catalog.banner_rows)?;

    tokio::fs::create_dir_all(&inputs.destination_dir)
        .await
        .map_err(|source| FetchError::Directory {
            path: inputs.destination_dir.clone(),
            source,
        })?;

    Ok((credentials, courses))
}

fn finish(sink: &dyn EventSink, result: &Result<RunSummary, FetchError>) {
    match result {
        Ok(summary) => sink.on_finish(Some(summary)),
        Err(e) => {
            sink.report(&PipelineEvent::Message(e.to_string()));
            sink.on_finish(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_names_missing_input() {
        let inputs = RunInputs::new("courses.csv", "  ", "out");
        match inputs.validate() {
            Err(FetchError::InputValidation(what)) => assert_eq!(what, "cookie"),
            other => panic!("unexpected result: {:?}", other),
        }

        assert!(RunInputs::new("", "a=1", "out").validate().is_err());
        assert!(RunInputs::new("courses.csv", "a=1", "").validate().is_err());
        assert!(RunInputs::new("courses.csv", "a=1", "out").validate().is_ok());
    }
}

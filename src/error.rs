//! Error types for the course video pipeline
//!
//! Errors are split by the boundary that catches them: catalog and setup
//! errors stop a run before any work starts, extraction errors are isolated
//! to one course, download errors to one video.
use std::path::PathBuf;
use std::time::Duration;

/// Run-level errors returned to the caller of a job
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("missing input: {0}")]
    InputValidation(String),

    #[error("catalog error: {0}")]
    CatalogFormat(#[from] CatalogError),

    #[error("cannot create destination directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("browser error: {0}")]
    Browser(String),

    #[error("http client error: {0}")]
    Client(String),
}

/// Errors raised while loading the course catalog
#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("cannot open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("row {row}: file ends before the header row")]
    MissingHeader { row: u64 },

    #[error("row {row}: {source}")]
    Csv {
        row: u64,
        #[source]
        source: csv::Error,
    },

    #[error("row {row}: column count mismatch (expected {expected}, found {found})")]
    ColumnCount {
        row: u64,
        expected: usize,
        found: usize,
    },

    #[error("no course rows found")]
    Empty,
}

/// Per-course errors raised by a page extractor
#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("`{selector}` did not appear within {timeout:?}")]
    NotReady { selector: String, timeout: Duration },

    #[error("extraction failed: {0}")]
    Extraction(String),
}

/// Per-video errors raised by the download engine
#[derive(thiserror::Error, Debug)]
pub enum DownloadError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("server returned status {status}")]
    Status { status: u16 },

    #[error("cannot create {path}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

//! Output file naming
//!
//! Files are named `{date}_{course}_{title}.mp4`; repeated names get a
//! `(n)` counter. Workers share one destination directory, so a name is
//! reserved in-process at the moment it is chosen.
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::sync::Mutex;
use tracing::debug;

static RESERVED_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("static pattern"));

/// Replace characters that are invalid in file names with `_`
pub fn sanitize_filename(name: &str) -> String {
    RESERVED_CHARS.replace_all(name, "_").into_owned()
}

/// `{date}_{course}_{title}` with every part sanitized
pub fn base_name(record_date: &str, course_name: &str, segment_title: &str) -> String {
    format!(
        "{}_{}_{}",
        sanitize_filename(record_date),
        sanitize_filename(course_name),
        sanitize_filename(segment_title)
    )
}

fn candidate(base: &str, counter: u32, extension: &str) -> String {
    if counter == 0 {
        format!("{base}{extension}")
    } else {
        format!("{base}({counter}){extension}")
    }
}

/// First of `base.ext`, `base(1).ext`, ... that does not exist in `dir`.
///
/// Only consults the filesystem; concurrent writers should go through
/// [`NameReservations`].
pub fn unique_filename(dir: &Path, base: &str, extension: &str) -> String {
    (0..)
        .map(|counter| candidate(base, counter, extension))
        .find(|name| !dir.join(name).exists())
        .unwrap_or_else(|| candidate(base, 0, extension))
}

/// Names handed out during one run
#[derive(Debug, Default)]
pub struct NameReservations {
    reserved: Mutex<HashSet<PathBuf>>,
}

impl NameReservations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick and reserve a name that neither exists in `dir` nor was handed
    /// out earlier in this run.
    ///
    /// The lock is held across the existence checks, which run on tokio's
    /// blocking pool.
    pub async fn reserve(&self, dir: &Path, base: &str, extension: &str) -> String {
        let mut reserved = self.reserved.lock().await;

        let mut counter = 0;
        loop {
            let name = candidate(base, counter, extension);
            let path = dir.join(&name);
            if !reserved.contains(&path) && !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                debug!("Reserved output name {}", name);
                reserved.insert(path);
                return name;
            }
            counter += 1;
        }
    }

    /// Number of names handed out so far
    pub async fn len(&self) -> usize {
        self.reserved.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

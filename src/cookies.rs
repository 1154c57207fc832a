//! Cookie header parsing
//!
//! The console session is supplied as a raw `Cookie` header copied from a
//! logged-in browser. It is decoded once per run and shared by the browser
//! session and the HTTP downloader.
use serde::{Deserialize, Serialize};

/// A single session cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub name: String,
    pub value: String,
    /// A raw header carries no attributes, so parsed cookies are never secure-only
    pub secure: bool,
}

impl Credential {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            secure: false,
        }
    }
}

/// Parse a `name=value; name2=value2` string.
///
/// Segments without `=` or with an empty name are skipped. Values are kept
/// verbatim, including any further `=` characters.
pub fn parse_cookie_string(raw: &str) -> Vec<Credential> {
    raw.split(';')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .filter_map(|segment| segment.split_once('='))
        .filter(|(name, _)| !name.trim().is_empty())
        .map(|(name, value)| Credential::new(name.trim(), value.trim()))
        .collect()
}

/// Render credentials as a `Cookie` request header value
pub fn to_header(credentials: &[Credential]) -> String {
    credentials
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}

//! Fetching include and INHERIT targets
//!
//! The resolution core only needs "bytes for a location". A location is a
//! local path, an RFC 8089 `file:` URI or (with the `http` feature) an
//! `http(s)://` URL. Relative locations are joined onto a base before they
//! reach a [`Fetcher`].

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Source of document bytes
pub trait Fetcher: Send + Sync {
    /// Read the full contents of a location
    fn fetch(&self, location: &str) -> Result<Vec<u8>>;

    /// Expand a glob pattern into matching locations, sorted
    fn expand(&self, pattern: &str) -> Result<Vec<String>> {
        Ok(vec![pattern.to_string()])
    }

    /// Key used to detect include and INHERIT cycles
    fn canonical(&self, location: &str) -> String {
        location.to_string()
    }
}

/// Check whether a location is an http(s) URL
pub fn is_remote(location: &str) -> bool {
    let lower = location.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Check whether a target contains glob metacharacters
pub fn is_glob(target: &str) -> bool {
    target.contains(['*', '?', '['])
}

/// Join a target onto a base directory location
///
/// Absolute paths, `file:` URIs and URLs are returned unchanged.
pub fn join_location(base: &str, target: &str) -> String {
    if is_remote(target) || target.starts_with("file:") || Path::new(target).is_absolute() {
        return target.to_string();
    }
    if base.is_empty() {
        return target.to_string();
    }
    if is_remote(base) {
        let trimmed_target = target.strip_prefix("./").unwrap_or(target);
        return format!("{}/{}", base.trim_end_matches('/'), trimmed_target);
    }
    Path::new(base).join(target).to_string_lossy().into_owned()
}

/// The directory portion of a location
pub fn parent_location(location: &str) -> String {
    if is_remote(location) {
        return match location.rfind('/') {
            Some(idx) if idx > location.find("//").map(|i| i + 1).unwrap_or(0) => {
                location[..idx].to_string()
            }
            _ => location.to_string(),
        };
    }
    Path::new(location)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Local filesystem fetcher
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcher;

impl FileFetcher {
    pub fn new() -> Self {
        Self
    }

    fn local_path(location: &str) -> Result<PathBuf> {
        match location.strip_prefix("file:") {
            Some(rest) => normalize_file_uri(rest).map(PathBuf::from),
            None => {
                if location.contains('\0') {
                    return Err(Error::include_not_found(
                        location,
                        "File paths cannot contain null bytes",
                    ));
                }
                Ok(PathBuf::from(location))
            }
        }
    }
}

impl Fetcher for FileFetcher {
    fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        let path = Self::local_path(location)?;
        log::trace!("Reading {}", path.display());
        std::fs::read(&path).map_err(|e| {
            let message = if e.kind() == std::io::ErrorKind::NotFound {
                format!("No such file: {}", path.display())
            } else {
                format!("Failed to read {}: {}", path.display(), e)
            };
            Error::include_not_found(location, message)
        })
    }

    fn expand(&self, pattern: &str) -> Result<Vec<String>> {
        let path = Self::local_path(pattern)?;
        let pattern_str = path.to_string_lossy();
        let entries = glob::glob(&pattern_str).map_err(|e| {
            Error::invalid_directive("!include", format!("Invalid glob pattern '{}': {}", pattern, e))
        })?;

        let mut matches = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|e| Error::include_not_found(pattern, format!("Glob error: {}", e)))?;
            if entry.is_file() {
                matches.push(entry.to_string_lossy().into_owned());
            }
        }
        matches.sort();
        Ok(matches)
    }

    fn canonical(&self, location: &str) -> String {
        match Self::local_path(location) {
            Ok(path) => path
                .canonicalize()
                .unwrap_or(path)
                .to_string_lossy()
                .into_owned(),
            Err(_) => location.to_string(),
        }
    }
}

/// Normalize the part of an RFC 8089 `file:` URI after the scheme
///
/// Accepts `file:///abs`, `file://localhost/abs`, `file:/abs` and relative
/// `file:rel` forms. Remote hosts are rejected.
fn normalize_file_uri(rest: &str) -> Result<String> {
    if rest.contains('\0') {
        return Err(Error::include_not_found(
            format!("file:{}", rest),
            "File paths cannot contain null bytes",
        ));
    }

    let Some(after_slashes) = rest.strip_prefix("//") else {
        return Ok(rest.to_string());
    };

    if after_slashes.starts_with('/') {
        return Ok(after_slashes.to_string());
    }

    let (hostname, path) = match after_slashes.split_once('/') {
        Some((host, path)) => (host, format!("/{}", path)),
        None => (after_slashes, "/".to_string()),
    };

    if hostname.is_empty() || is_localhost(hostname) {
        Ok(path)
    } else {
        Err(Error::include_not_found(
            format!("file:{}", rest),
            format!(
                "Remote file URIs not supported: hostname '{}' is not localhost",
                hostname
            ),
        ))
    }
}

fn is_localhost(hostname: &str) -> bool {
    hostname.eq_ignore_ascii_case("localhost")
        || hostname.starts_with("127.")
        || hostname == "::1"
        || hostname == "[::1]"
}

/// Blocking HTTP(S) fetcher
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    timeout: std::time::Duration,
}

#[cfg(feature = "http")]
impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            timeout: std::time::Duration::from_secs(30),
        }
    }
}

#[cfg(feature = "http")]
impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the overall request timeout
    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(feature = "http")]
impl Fetcher for HttpFetcher {
    fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(self.timeout))
            .build();
        let agent: ureq::Agent = config.into();

        log::debug!("Fetching {}", location);
        let response = agent.get(location).call().map_err(|e| {
            let error_msg = match &e {
                ureq::Error::StatusCode(code) => format!("HTTP {}", code),
                ureq::Error::Timeout(kind) => format!("Request timeout: {:?}", kind),
                ureq::Error::Io(io_err) => format!("Connection error: {}", io_err),
                _ => format!("HTTP request failed: {}", e),
            };
            Error::include_not_found(location, error_msg)
        })?;

        response
            .into_body()
            .read_to_vec()
            .map_err(|e| Error::include_not_found(location, e.to_string()))
    }
}

/// Fetcher used when none is configured: local files, plus http(s) URLs
/// when built with the `http` feature
#[derive(Debug, Clone, Default)]
pub struct DefaultFetcher {
    file: FileFetcher,
    #[cfg(feature = "http")]
    http: HttpFetcher,
}

impl DefaultFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(feature = "http")]
    fn fetch_remote(&self, location: &str) -> Result<Vec<u8>> {
        self.http.fetch(location)
    }

    #[cfg(not(feature = "http"))]
    fn fetch_remote(&self, location: &str) -> Result<Vec<u8>> {
        Err(
            Error::include_not_found(location, "HTTP targets are not supported")
                .with_help("Rebuild tagforge with the 'http' feature to fetch remote targets"),
        )
    }
}

impl Fetcher for DefaultFetcher {
    fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        if is_remote(location) {
            return self.fetch_remote(location);
        }
        self.file.fetch(location)
    }

    fn expand(&self, pattern: &str) -> Result<Vec<String>> {
        if is_remote(pattern) {
            return Ok(vec![pattern.to_string()]);
        }
        self.file.expand(pattern)
    }

    fn canonical(&self, location: &str) -> String {
        if is_remote(location) {
            return location.to_string();
        }
        self.file.canonical(location)
    }
}

//! # Session Configuration
//!
//! [`SessionConfig`] is built once and handed to
//! [`crate::DebugSession::new`]; a running session never reads process-wide
//! settings.
//!
//! ## Environment overrides
//!
//! [`SessionConfig::from_env`] starts from the defaults and applies:
//!
//! - `REMORA_NATIVE_LOOKUP`: `1`, `0`, `true`, or `false`
//! - `REMORA_IMAGE_PATH`: directory list in the platform's `PATH` syntax
//! - `REMORA_CACHE_PAGES`: resident page limit

use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

use crate::error::{RemoraError, Result};

/// Default number of resident pages in the session's cache
pub const DEFAULT_CACHE_PAGE_COUNT: usize = 4096;

const ENV_NATIVE_LOOKUP: &str = "REMORA_NATIVE_LOOKUP";
const ENV_IMAGE_PATH: &str = "REMORA_IMAGE_PATH";
const ENV_CACHE_PAGES: &str = "REMORA_CACHE_PAGES";

/// Options fixed for the lifetime of one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig
{
    /// Ask the engine before consulting self-parsed symbol tables
    pub use_native_lookup: bool,
    /// Directories searched for module images; `None` means the process `PATH`
    pub image_search_path: Option<Vec<PathBuf>>,
    /// Maximum number of resident cache pages
    pub cache_page_count: usize,
    /// Expected page size; `None` takes whatever the engine reports
    pub cache_page_size: Option<usize>,
}

impl Default for SessionConfig
{
    fn default() -> Self
    {
        Self {
            use_native_lookup: true,
            image_search_path: None,
            cache_page_count: DEFAULT_CACHE_PAGE_COUNT,
            cache_page_size: None,
        }
    }
}

impl SessionConfig
{
    #[must_use]
    pub fn with_native_lookup(mut self, enabled: bool) -> Self
    {
        self.use_native_lookup = enabled;
        self
    }

    #[must_use]
    pub fn with_image_search_path<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.image_search_path = Some(dirs.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_cache_page_count(mut self, pages: usize) -> Self
    {
        self.cache_page_count = pages;
        self
    }

    #[must_use]
    pub fn with_cache_page_size(mut self, bytes: usize) -> Self
    {
        self.cache_page_size = Some(bytes);
        self
    }

    /// Defaults overlaid with the `REMORA_*` environment variables
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` naming the variable whose value could not be parsed.
    pub fn from_env() -> Result<Self>
    {
        Self::from_lookup(|key| env::var_os(key))
    }

    /// Same as [`SessionConfig::from_env`], reading variables through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_NATIVE_LOOKUP) {
            config.use_native_lookup = match value.to_str() {
                Some("1") | Some("true") => true,
                Some("0") | Some("false") => false,
                _ => return Err(invalid(ENV_NATIVE_LOOKUP, &value)),
            };
        }

        if let Some(value) = lookup(ENV_IMAGE_PATH) {
            config.image_search_path = Some(env::split_paths(&value).collect());
        }

        if let Some(value) = lookup(ENV_CACHE_PAGES) {
            config.cache_page_count = value
                .to_str()
                .and_then(|text| text.trim().parse().ok())
                .filter(|pages: &usize| *pages > 0)
                .ok_or_else(|| invalid(ENV_CACHE_PAGES, &value))?;
        }

        Ok(config)
    }

    /// Directories the load-object registry searches, in order
    pub fn resolved_search_path(&self) -> Vec<PathBuf>
    {
        match &self.image_search_path {
            Some(dirs) => dirs.clone(),
            None => env::var_os("PATH")
                .map(|path| env::split_paths(&path).collect())
                .unwrap_or_default(),
        }
    }
}

fn invalid(key: &str, value: &OsString) -> RemoraError
{
    RemoraError::InvalidArgument(format!("{key}={}", value.to_string_lossy()))
}

#[cfg(test)]
mod tests
{
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<OsString>
    {
        let vars: HashMap<String, OsString> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), OsString::from(v)))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults()
    {
        let config = SessionConfig::default();
        assert!(config.use_native_lookup);
        assert_eq!(config.cache_page_count, DEFAULT_CACHE_PAGE_COUNT);
        assert_eq!(config.cache_page_size, None);
        assert_eq!(config.image_search_path, None);
    }

    #[test]
    fn builder_overrides()
    {
        let config = SessionConfig::default()
            .with_native_lookup(false)
            .with_cache_page_count(16)
            .with_cache_page_size(0x4000)
            .with_image_search_path(["/opt/lib", "/usr/lib"]);

        assert!(!config.use_native_lookup);
        assert_eq!(config.cache_page_count, 16);
        assert_eq!(config.cache_page_size, Some(0x4000));
        assert_eq!(config.resolved_search_path(), vec![PathBuf::from("/opt/lib"), PathBuf::from("/usr/lib")]);
    }

    #[test]
    fn environment_overlay()
    {
        let joined = env::join_paths(["/a", "/b"]).unwrap();
        let joined = joined.to_str().unwrap();
        let config = SessionConfig::from_lookup(lookup_from(&[
            ("REMORA_NATIVE_LOOKUP", "0"),
            ("REMORA_IMAGE_PATH", joined),
            ("REMORA_CACHE_PAGES", "128"),
        ]))
        .unwrap();

        assert!(!config.use_native_lookup);
        assert_eq!(config.image_search_path, Some(vec![PathBuf::from("/a"), PathBuf::from("/b")]));
        assert_eq!(config.cache_page_count, 128);
    }

    #[test]
    fn malformed_environment_values_are_rejected()
    {
        let bad_flag = SessionConfig::from_lookup(lookup_from(&[("REMORA_NATIVE_LOOKUP", "maybe")]));
        assert!(matches!(bad_flag, Err(RemoraError::InvalidArgument(msg)) if msg.contains("REMORA_NATIVE_LOOKUP")));

        let zero_pages = SessionConfig::from_lookup(lookup_from(&[("REMORA_CACHE_PAGES", "0")]));
        assert!(matches!(zero_pages, Err(RemoraError::InvalidArgument(_))));

        let junk_pages = SessionConfig::from_lookup(lookup_from(&[("REMORA_CACHE_PAGES", "lots")]));
        assert!(matches!(junk_pages, Err(RemoraError::InvalidArgument(_))));
    }

    #[test]
    fn unset_environment_gives_defaults()
    {
        let config = SessionConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, SessionConfig::default());
    }
}

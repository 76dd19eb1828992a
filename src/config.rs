//! Run configuration.
//!
//! Every component receives a [`Config`] explicitly; there is no
//! process-wide settings state.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default number of concurrent downloads.
pub const DEFAULT_POOL_SIZE: usize = 20;

/// One media category and the local directory its files are bucketed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Category name as the catalog endpoint expects it (`photos`, `videos`, ...).
    pub name: String,
    /// Base directory for this category's `YYYY-MM` buckets.
    pub path: PathBuf,
}

impl Category {
    /// Creates a category entry.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

fn default_categories() -> Vec<Category> {
    vec![
        Category::new("photos", "./downloads/kuvat/"),
        Category::new("videos", "./downloads/videot/"),
        Category::new("audio", "./downloads/audio/"),
        Category::new("other", "./downloads/other/"),
    ]
}

/// Configuration for a download run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service root; login, catalog and download URLs are resolved against it.
    pub base_url: String,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
    /// `X-Request-Reason` header sent with every request.
    pub request_reason: String,
    /// Path of the file download endpoint, relative to `base_url`.
    pub download_endpoint: String,
    /// Number of concurrent file downloads.
    pub pool_size: usize,
    /// Pause between successive catalog pages, in milliseconds.
    pub page_delay_ms: u64,
    /// Hard ceiling on the number of catalog pages requested per category.
    pub max_pages: u32,
    /// Consecutive empty pages tolerated before pagination gives up.
    pub max_empty_pages: u32,
    /// Directory where per-category catalog snapshots are written.
    pub snapshot_dir: PathBuf,
    /// Whether to remove `.part` files when a download stream fails.
    pub cleanup_on_error: bool,
    /// Categories processed in order.
    pub categories: Vec<Category>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "https://pilvilinna.elisa.fi".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36"
                .to_string(),
            request_reason: "Trying-to-get-my-data-out-from-the-cloud".to_string(),
            download_endpoint: "/cloudia_api/core/get_file".to_string(),
            pool_size: DEFAULT_POOL_SIZE,
            page_delay_ms: 1000,
            max_pages: 10_000,
            max_empty_pages: 3,
            snapshot_dir: PathBuf::from("."),
            cleanup_on_error: true,
            categories: default_categories(),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the delay applied between catalog pages.
    #[must_use]
    pub const fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    /// Sets the service root URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the number of concurrent downloads. Zero is clamped to one.
    #[must_use]
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    /// Sets the delay between catalog pages.
    #[must_use]
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay_ms = delay.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    /// Sets the pagination ceilings.
    #[must_use]
    pub const fn with_page_limits(mut self, max_pages: u32, max_empty_pages: u32) -> Self {
        self.max_pages = max_pages;
        self.max_empty_pages = max_empty_pages;
        self
    }

    /// Sets the snapshot directory.
    #[must_use]
    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = dir.into();
        self
    }

    /// Replaces the category list.
    #[must_use]
    pub fn with_categories(mut self, categories: Vec<Category>) -> Self {
        self.categories = categories;
        self
    }

    /// Keeps only the categories whose names appear in `names`.
    /// An empty filter keeps everything.
    #[must_use]
    pub fn retain_categories(mut self, names: &[String]) -> Self {
        if !names.is_empty() {
            self.categories.retain(|c| names.contains(&c.name));
        }
        self
    }

    /// Returns the default config file location (`<config dir>/pilvi-dl/config.toml`).
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pilvi-dl")
            .join("config.toml")
    }

    /// Parses a TOML document. Missing keys take their default values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the document is not valid TOML for this schema.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let mut config: Self =
            toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))?;
        config.pool_size = config.pool_size.max(1);
        Ok(config)
    }

    /// Loads configuration from `path`.
    ///
    /// With `path == None` the default location is tried and a missing file
    /// yields the defaults. An explicitly named file must exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_path(), false),
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                log::info!("Loaded config from {}", path.display());
                Self::from_toml(&contents)
            }
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(Error::Config(format!("{}: {e}", path.display()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.pool_size, 20);
        assert_eq!(config.page_delay(), Duration::from_secs(1));
        assert_eq!(config.categories.len(), 4);
        assert_eq!(config.categories[0].name, "photos");
        assert!(config.cleanup_on_error);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .with_base_url("http://localhost:1234")
            .with_pool_size(3)
            .with_page_delay(Duration::ZERO)
            .with_page_limits(10, 1);

        assert_eq!(config.base_url, "http://localhost:1234");
        assert_eq!(config.pool_size, 3);
        assert_eq!(config.page_delay_ms, 0);
        assert_eq!(config.max_pages, 10);
        assert_eq!(config.max_empty_pages, 1);
    }

    #[test]
    fn zero_pool_size_is_clamped() {
        assert_eq!(Config::new().with_pool_size(0).pool_size, 1);
        let config = Config::from_toml("pool_size = 0").unwrap();
        assert_eq!(config.pool_size, 1);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            pool_size = 5

            [[categories]]
            name = "photos"
            path = "/tmp/photos"
            "#,
        )
        .unwrap();
        assert_eq!(config.pool_size, 5);
        assert_eq!(config.page_delay_ms, 1000);
        assert_eq!(config.categories, vec![Category::new("photos", "/tmp/photos")]);
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = Config::from_toml("pool_size = \"many\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn retain_categories_filters_by_name() {
        let config = Config::new().retain_categories(&["videos".to_string()]);
        assert_eq!(config.categories.len(), 1);
        assert_eq!(config.categories[0].name, "videos");

        let untouched = Config::new().retain_categories(&[]);
        assert_eq!(untouched.categories.len(), 4);
    }

    #[test]
    fn load_explicit_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_empty_pages = 7\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.max_empty_pages, 7);
    }

    #[test]
    fn config_serializes_to_toml() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed = Config::from_toml(&toml_str).unwrap();
        assert_eq!(parsed.pool_size, config.pool_size);
        assert_eq!(parsed.categories, config.categories);
    }
}

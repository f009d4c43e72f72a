//! GUI runner configuration

use refshot_common::{Error, Result, TestIdentity};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable overriding the report directory
pub const ENV_REPORT_PATH: &str = "REFSHOT_REPORT_PATH";

/// File inside the report directory holding the persisted result tree
pub const DATA_FILE_NAME: &str = "data.json";

/// GUI runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuiConfig {
    /// Report directory; also the source of reuse data
    pub report_path: PathBuf,

    /// Start a full run as soon as a client connects
    pub auto_run: bool,

    /// Test files or directories handed to discovery
    pub test_files: Vec<PathBuf>,

    /// Global filter applied to discovery and to every run
    pub filter: RunFilter,

    /// Named groups of test files or directories, selected by `filter.sets`
    pub sets: BTreeMap<String, Vec<PathBuf>>,

    /// Per-browser settings
    pub browsers: BTreeMap<String, BrowserConfig>,
}

impl Default for GuiConfig {
    fn default() -> Self {
        Self {
            report_path: PathBuf::from("refshot-report"),
            auto_run: false,
            test_files: vec![PathBuf::from("tests/refshot")],
            filter: RunFilter::default(),
            sets: BTreeMap::new(),
            browsers: BTreeMap::new(),
        }
    }
}

impl GuiConfig {
    /// Load configuration from file; an invalid grep pattern or an unknown
    /// set name is rejected here
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| Error::InvalidConfig(e.to_string()))?
        } else {
            Self::default()
        };

        if let Ok(report_path) = std::env::var(ENV_REPORT_PATH) {
            config.report_path = PathBuf::from(report_path);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that every set named by the filter is defined
    pub fn validate(&self) -> Result<()> {
        match self.filter.sets.iter().find(|s| !self.sets.contains_key(*s)) {
            Some(unknown) => Err(Error::InvalidConfig(format!(
                "filter names unknown test set '{}'",
                unknown
            ))),
            None => Ok(()),
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Path of the persisted data file
    pub fn data_file(&self) -> PathBuf {
        self.report_path.join(DATA_FILE_NAME)
    }

    pub fn browser(&self, browser_id: &str) -> Result<&BrowserConfig> {
        self.browsers
            .get(browser_id)
            .ok_or_else(|| Error::UnknownBrowser(browser_id.to_string()))
    }
}

/// Regular expression matched against full titles
#[derive(Debug, Clone)]
pub struct GrepPattern(Regex);

impl GrepPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        Regex::new(pattern).map(Self).map_err(|e| {
            Error::InvalidConfig(format!("invalid grep pattern '{}': {}", pattern, e))
        })
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_match(&self, full_title: &str) -> bool {
        self.0.is_match(full_title)
    }
}

impl PartialEq for GrepPattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Serialize for GrepPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for GrepPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let pattern = String::deserialize(deserializer)?;
        Regex::new(&pattern)
            .map(Self)
            .map_err(|e| serde::de::Error::custom(format!("invalid grep pattern: {}", e)))
    }
}

/// Global scope of a run: every selection is narrowed by this
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunFilter {
    /// Pattern the full title must match
    pub grep: Option<GrepPattern>,

    /// Names of `GuiConfig::sets` entries; empty means every test file
    pub sets: Vec<String>,

    /// Browser ids; empty means all configured browsers
    pub browsers: Vec<String>,
}

impl RunFilter {
    /// Whether a test falls inside the configured scope.
    ///
    /// Sets are resolved against test files by the engine, so only grep and
    /// browsers are checked here.
    pub fn allows<T: TestIdentity + ?Sized>(&self, test: &T) -> bool {
        let browser_ok =
            self.browsers.is_empty() || self.browsers.iter().any(|b| b == test.browser_id());
        let grep_ok = match &self.grep {
            Some(pattern) => pattern.is_match(&test.full_title()),
            None => true,
        };
        browser_ok && grep_ok
    }
}

/// Settings for one browser
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Root directory of reference screenshots
    pub screenshots_dir: PathBuf,
}

impl BrowserConfig {
    pub fn new(screenshots_dir: impl Into<PathBuf>) -> Self {
        Self {
            screenshots_dir: screenshots_dir.into(),
        }
    }

    /// Canonical reference path of a state: `<dir>/<title hash>/<browser>/<state>.png`
    pub fn screenshot_path<T: TestIdentity + ?Sized>(&self, test: &T, state_name: &str) -> PathBuf {
        self.screenshots_dir
            .join(test.title_hash())
            .join(test.browser_id())
            .join(format!("{}.png", state_name))
    }
}

/*!
 * Configuration for rate analysis
 *
 * Describes where the fee schedules and payment addenda live, which code
 * groups and years to process, and how results are cached. Values come
 * from a TOML file, environment variables, or the built-in defaults.
 */

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    constants::{DEFAULT_CACHE_TTL_SECS, DEFAULT_YEARS},
    data_types::{CodeGroup, FacilityType, ProcedureCode, YearLabel},
    reconcile::YearMap,
    ExportFormat, RatesError, Result,
};

/// Analysis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Root of the fee schedule tree (`<data_dir>/<group>/<file>`)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory of payment addendum CSV files
    #[serde(default = "default_payment_dir")]
    pub payment_dir: PathBuf,

    #[serde(default = "crate::default_groups")]
    pub groups: Vec<CodeGroup>,

    /// Reimbursement years in processing order
    #[serde(default = "default_years")]
    pub years: Vec<YearLabel>,

    #[serde(default)]
    pub year_map: YearMap,

    /// Codes whose payment rates are extracted
    #[serde(default = "crate::default_target_codes")]
    pub target_codes: Vec<ProcedureCode>,

    #[serde(default)]
    pub facility_type: FacilityType,

    /// Lifetime of cached results in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Whether to show progress bars while loading
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,

    #[serde(default)]
    pub default_export_format: ExportFormat,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            payment_dir: default_payment_dir(),
            groups: crate::default_groups(),
            years: default_years(),
            year_map: YearMap::default(),
            target_codes: crate::default_target_codes(),
            facility_type: FacilityType::Facility,
            cache_ttl_secs: default_cache_ttl_secs(),
            show_progress: default_show_progress(),
            default_export_format: ExportFormat::Json,
        }
    }
}

// Default value functions for serde
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_payment_dir() -> PathBuf {
    PathBuf::from("data").join("AB")
}

fn default_years() -> Vec<YearLabel> {
    DEFAULT_YEARS.iter().map(|y| YearLabel::new(y)).collect()
}

fn default_cache_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

fn default_show_progress() -> bool {
    true
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

impl AnalysisConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Look up a configured group by name
    pub fn group(&self, name: &str) -> Option<&CodeGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Load configuration from environment variables
    ///
    /// Supported environment variables:
    /// - `HCPCS_DATA_DIR`: fee schedule root directory
    /// - `HCPCS_PAYMENT_DIR`: payment addendum directory
    /// - `HCPCS_FACILITY_TYPE`: "facility" or "non-facility"
    /// - `HCPCS_CACHE_TTL`: cache lifetime in seconds
    /// - `HCPCS_YEARS`: comma separated year labels
    /// - `HCPCS_PROGRESS`: "true" or "false"
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Override fields from a variable lookup
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("HCPCS_DATA_DIR") {
            self.data_dir = PathBuf::from(val);
        }

        if let Some(val) = lookup("HCPCS_PAYMENT_DIR") {
            self.payment_dir = PathBuf::from(val);
        }

        if let Some(val) = lookup("HCPCS_FACILITY_TYPE") {
            if let Some(facility_type) = FacilityType::from_str_opt(&val) {
                self.facility_type = facility_type;
            }
        }

        if let Some(val) = lookup("HCPCS_CACHE_TTL") {
            if let Ok(secs) = val.trim().parse() {
                self.cache_ttl_secs = secs;
            }
        }

        if let Some(val) = lookup("HCPCS_YEARS") {
            let years: Vec<YearLabel> = val
                .split(',')
                .map(str::trim)
                .filter(|y| !y.is_empty())
                .map(YearLabel::new)
                .collect();
            if !years.is_empty() {
                self.years = years;
            }
        }

        if let Some(val) = lookup("HCPCS_PROGRESS") {
            self.show_progress = parse_bool(&val);
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(RatesError::Configuration {
                message: format!("Config file not found: {}", path.display()),
                suggestion: Some("Pass an existing TOML file or omit --config".to_string()),
            });
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents).map_err(|e| RatesError::Configuration {
            message: format!("Failed to parse config file: {}", e),
            suggestion: Some("Check that the file is valid TOML format".to_string()),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).map_err(|e| RatesError::Configuration {
            message: format!("Failed to serialize config: {}", e),
            suggestion: None,
        })?;
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/hcpcs-rates/config.toml` on Unix-like systems
    /// or `%APPDATA%\hcpcs-rates\config.toml` on Windows
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "hcpcs-rates")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load the default config file when present, then apply environment
    /// overrides on top of it or of the built-in defaults
    pub fn load() -> Self {
        let mut config = Self::default_config_path()
            .filter(|path| path.exists())
            .and_then(|path| match Self::from_file(&path) {
                Ok(config) => Some(config),
                Err(e) => {
                    log::warn!("Ignoring config file {}: {}", path.display(), e);
                    None
                }
            })
            .unwrap_or_default();

        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Check for settings that cannot produce any result
    pub fn validate(&self) -> Result<()> {
        if self.years.is_empty() {
            return Err(RatesError::Configuration {
                message: "No years configured".to_string(),
                suggestion: Some("Set `years` in the config file or HCPCS_YEARS".to_string()),
            });
        }

        for group in &self.groups {
            if !group.file_template.contains("{year}") {
                return Err(RatesError::Configuration {
                    message: format!("File template for group '{}' has no {{year}} placeholder", group.name),
                    suggestion: Some(
                        "Use a template such as '{year}-all-61885-national_payment_amount.csv'".to_string(),
                    ),
                });
            }
        }

        Ok(())
    }
}

/// Builder for customizing configuration
pub struct ConfigBuilder {
    config: AnalysisConfig,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AnalysisConfig::default(),
        }
    }

    /// Start from an existing configuration
    pub fn from_config(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn data_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.config.data_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn payment_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.config.payment_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn groups(mut self, groups: Vec<CodeGroup>) -> Self {
        self.config.groups = groups;
        self
    }

    pub fn years(mut self, years: &[&str]) -> Self {
        self.config.years = years.iter().map(|y| YearLabel::new(y)).collect();
        self
    }

    pub fn year_map(mut self, year_map: YearMap) -> Self {
        self.config.year_map = year_map;
        self
    }

    pub fn target_codes(mut self, codes: &[&str]) -> Self {
        self.config.target_codes = codes.iter().map(|c| ProcedureCode::new(c)).collect();
        self
    }

    pub fn facility_type(mut self, facility_type: FacilityType) -> Self {
        self.config.facility_type = facility_type;
        self
    }

    pub fn cache_ttl_secs(mut self, secs: u64) -> Self {
        self.config.cache_ttl_secs = secs;
        self
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.config.show_progress = show;
        self
    }

    pub fn build(self) -> AnalysisConfig {
        self.config
    }
}

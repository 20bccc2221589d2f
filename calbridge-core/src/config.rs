//! Global calbridge configuration.

use std::path::{Path, PathBuf};

use chrono::Duration;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::date_range::{DEFAULT_FUTURE_DAYS, DEFAULT_PAST_DAYS, RangeDefaults};
use crate::draft::DraftDefaults;
use crate::error::{BridgeError, BridgeResult};
use crate::ics::{DEFAULT_PRODUCT_ID, IcsCodec};
use crate::mutation::MutationPlanner;

static DEFAULT_CALENDAR_DIR: &str = "~/calendar";
static DEFAULT_UID_NAMESPACE: &str = "calbridge";
const DEFAULT_DURATION_MINUTES: i64 = 60;
const MAX_WINDOW_DAYS: i64 = 36_500;
const MAX_DURATION_MINUTES: i64 = 366 * 24 * 60;

fn default_calendar_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CALENDAR_DIR)
}

fn default_uid_namespace() -> String {
    DEFAULT_UID_NAMESPACE.to_string()
}

fn default_product_id() -> String {
    DEFAULT_PRODUCT_ID.to_string()
}

fn default_duration_minutes() -> i64 {
    DEFAULT_DURATION_MINUTES
}

fn default_past_days() -> i64 {
    DEFAULT_PAST_DAYS
}

fn default_future_days() -> i64 {
    DEFAULT_FUTURE_DAYS
}

/// Configuration at ~/.config/calbridge/config.toml, overridable with
/// `CALBRIDGE_*` environment variables.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BridgeConfig {
    #[serde(default = "default_calendar_dir")]
    pub calendar_dir: PathBuf,

    /// Domain part of generated UIDs
    #[serde(default = "default_uid_namespace")]
    pub uid_namespace: String,

    #[serde(default = "default_product_id")]
    pub product_id: String,

    /// Zone for times given without zone information
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_timezone: Option<String>,

    #[serde(default = "default_duration_minutes")]
    pub default_duration_minutes: i64,

    #[serde(default = "default_past_days")]
    pub list_past_days: i64,

    #[serde(default = "default_future_days")]
    pub list_future_days: i64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            calendar_dir: default_calendar_dir(),
            uid_namespace: default_uid_namespace(),
            product_id: default_product_id(),
            default_timezone: None,
            default_duration_minutes: DEFAULT_DURATION_MINUTES,
            list_past_days: DEFAULT_PAST_DAYS,
            list_future_days: DEFAULT_FUTURE_DAYS,
        }
    }
}

impl BridgeConfig {
    pub fn config_path() -> BridgeResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| BridgeError::Config("Could not determine config directory".into()))?
            .join("calbridge");

        Ok(config_dir.join("config.toml"))
    }

    /// Load from the default location, creating a commented config file on first run.
    pub fn load() -> BridgeResult<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> BridgeResult<Self> {
        let config: BridgeConfig = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix("CALBRIDGE").try_parsing(true))
            .build()
            .map_err(|e| BridgeError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| BridgeError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> BridgeResult<()> {
        let checks = [
            ("list_past_days", self.list_past_days, MAX_WINDOW_DAYS),
            ("list_future_days", self.list_future_days, MAX_WINDOW_DAYS),
            (
                "default_duration_minutes",
                self.default_duration_minutes,
                MAX_DURATION_MINUTES,
            ),
        ];
        for (key, value, max) in checks {
            if !(0..=max).contains(&value) {
                return Err(BridgeError::Config(format!(
                    "{key} must be between 0 and {max}, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> BridgeResult<()> {
        let contents = format!(
            "\
# calbridge configuration

# Where your calendars live (one subdirectory per calendar):
# calendar_dir = \"{DEFAULT_CALENDAR_DIR}\"

# Domain part of generated event UIDs:
# uid_namespace = \"{DEFAULT_UID_NAMESPACE}\"

# PRODID written into generated calendars:
# product_id = \"{DEFAULT_PRODUCT_ID}\"

# Zone for times given without zone information (UTC when unset):
# default_timezone = \"Europe/Berlin\"

# Length of new timed events without an end:
# default_duration_minutes = {DEFAULT_DURATION_MINUTES}

# Default listing window:
# list_past_days = {DEFAULT_PAST_DAYS}
# list_future_days = {DEFAULT_FUTURE_DAYS}
"
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                BridgeError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| BridgeError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }

    /// The effective configuration as TOML.
    pub fn render(&self) -> BridgeResult<String> {
        toml::to_string_pretty(self).map_err(|e| BridgeError::Serialization(e.to_string()))
    }

    /// Calendar directory with `~` expanded.
    pub fn data_path(&self) -> PathBuf {
        let full_path_str = shellexpand::tilde(&self.calendar_dir.to_string_lossy()).into_owned();

        PathBuf::from(full_path_str)
    }

    pub fn codec(&self) -> IcsCodec {
        IcsCodec::new(&self.product_id)
    }

    pub fn planner(&self) -> MutationPlanner {
        MutationPlanner::new(self.codec())
    }

    pub fn draft_defaults(&self) -> DraftDefaults {
        DraftDefaults {
            uid_namespace: self.uid_namespace.clone(),
            timezone: self.default_timezone.clone(),
            duration: Duration::minutes(self.default_duration_minutes.max(0)),
        }
    }

    pub fn range_defaults(&self) -> RangeDefaults {
        RangeDefaults {
            past_days: self.list_past_days,
            future_days: self.list_future_days,
        }
    }
}

//! Global groupdav configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{DavError, DavResult};
use crate::recurrence::{DEFAULT_MAX_INSTANCES, ExpandOptions};

pub const DEFAULT_SYNC_TOKEN_PREFIX: &str = "http://sabre.io/ns/sync/";
pub const DEFAULT_NOTIFICATION_TOPIC: &str = "calendar:event:notificationEmail:send";
pub const DEFAULT_PRODUCT_ID: &str = "-//groupdav//groupdav core//EN";

fn default_sync_token_prefix() -> String {
    DEFAULT_SYNC_TOKEN_PREFIX.to_string()
}

fn default_notification_topic() -> String {
    DEFAULT_NOTIFICATION_TOPIC.to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_max_instances() -> usize {
    DEFAULT_MAX_INSTANCES
}

fn default_expiration_grace() -> String {
    "0s".to_string()
}

fn default_product_id() -> String {
    DEFAULT_PRODUCT_ID.to_string()
}

/// Configuration at ~/.config/groupdav/config.toml
///
/// Every key can be overridden from the environment as `GROUPDAV_<KEY>`,
/// e.g. `GROUPDAV_MAX_INSTANCES=500`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DavConfig {
    /// Prefix of emitted sync tokens; the counter is appended.
    #[serde(default = "default_sync_token_prefix")]
    pub sync_token_prefix: String,

    /// Topic scheduling notifications are published to.
    #[serde(default = "default_notification_topic")]
    pub notification_topic: String,

    /// IANA zone for floating times and all-day dates.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    #[serde(default = "default_max_instances")]
    pub max_instances: usize,

    /// How long after an occurrence ends it still gets notifications.
    #[serde(default = "default_expiration_grace")]
    pub expiration_grace: String,

    #[serde(default = "default_product_id")]
    pub product_id: String,
}

impl Default for DavConfig {
    fn default() -> Self {
        DavConfig {
            sync_token_prefix: default_sync_token_prefix(),
            notification_topic: default_notification_topic(),
            default_timezone: default_timezone(),
            max_instances: default_max_instances(),
            expiration_grace: default_expiration_grace(),
            product_id: default_product_id(),
        }
    }
}

impl DavConfig {
    pub fn config_path() -> DavResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| DavError::Config("Could not determine config directory".into()))?
            .join("groupdav");

        Ok(config_dir.join("config.toml"))
    }

    /// Load from the default location, writing a commented-out template there
    /// on first use.
    pub fn load() -> DavResult<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
        }

        Self::load_from(&config_path)
    }

    /// Load from `path` (`~` is expanded). A missing file means defaults.
    pub fn load_from(path: &Path) -> DavResult<Self> {
        let expanded = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned());

        let config: DavConfig = Config::builder()
            .add_source(File::from(expanded).required(false))
            .add_source(Environment::with_prefix("GROUPDAV").try_parsing(true))
            .build()
            .map_err(|e| DavError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| DavError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> DavResult<()> {
        self.timezone()?;
        self.expiration_grace()?;
        if self.max_instances == 0 {
            return Err(DavError::Config("max_instances must be at least 1".into()));
        }
        Ok(())
    }

    pub fn timezone(&self) -> DavResult<Tz> {
        self.default_timezone.parse::<Tz>().map_err(|_| {
            DavError::Config(format!("Unknown timezone '{}'", self.default_timezone))
        })
    }

    pub fn expiration_grace(&self) -> DavResult<Duration> {
        humantime::parse_duration(&self.expiration_grace).map_err(|e| {
            DavError::Config(format!(
                "Invalid expiration_grace '{}': {}",
                self.expiration_grace, e
            ))
        })
    }

    pub fn expand_options(&self) -> ExpandOptions {
        ExpandOptions {
            max_instances: self.max_instances,
        }
    }

    /// Save to `path` as TOML.
    pub fn save(&self, path: &Path) -> DavResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| DavError::Config(e.to_string()))?;

        std::fs::write(path, content)
            .map_err(|e| DavError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> DavResult<()> {
        let contents = format!(
            "\
# groupdav configuration

# Prefix of sync tokens handed to clients:
# sync_token_prefix = \"{}\"

# Topic scheduling notifications are published to:
# notification_topic = \"{}\"

# Zone for floating times and all-day events:
# default_timezone = \"UTC\"

# Cap on instances generated from one never-ending rule:
# max_instances = {}

# Keep notifying for occurrences that ended this long ago:
# expiration_grace = \"0s\"
",
            DEFAULT_SYNC_TOKEN_PREFIX, DEFAULT_NOTIFICATION_TOPIC, DEFAULT_MAX_INSTANCES
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DavError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| DavError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }
}

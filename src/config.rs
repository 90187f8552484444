//! Configuration types for the quick timer engine.

use crate::composer::Target;
use crate::form::FormDefaults;
use crate::resolver::SurfaceIdentity;
use crate::snapshot::Notifications;
use crate::timing::{AtTime, TimeMode, TimeUnit};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Countdown and cache behaviour shared by every surface.
    pub engine: EngineConfig,
    /// Host surface binding.
    pub binding: BindingConfig,
    /// Logging.
    pub logging: LoggingConfig,
    /// Configured card/tile surfaces.
    pub cards: Vec<CardConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Countdown recompute period.
    pub tick_interval_ms: u64,
    /// History entries shown per surface.
    pub history_display_limit: usize,
    /// How long an inline submission error stays visible.
    pub inline_error_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            history_display_limit: 3,
            inline_error_ttl_secs: 5,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

/// Host surface binding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    /// Delay between discovery attempts while a detail view is opening.
    pub retry_interval_ms: u64,
    /// Discovery attempts before giving up on one opening.
    pub max_retry_attempts: u32,
    /// Consecutive misses after which a bound panel is torn down.
    pub miss_teardown_threshold: u32,
    /// Maximum depth of structural and bounded searches.
    pub search_depth: usize,
    /// Tag path from the root to the content container, tried first.
    pub direct_path: Vec<String>,
    /// Tag of the host's entity-detail dialog.
    pub dialog_tag: String,
    /// Attribute carrying the subject entity reference.
    pub subject_attribute: String,
    /// Tags that may host the injected panel.
    pub content_tags: Vec<String>,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: 150,
            max_retry_attempts: 20,
            miss_teardown_threshold: 3,
            search_depth: 12,
            direct_path: vec![
                "home-assistant".to_owned(),
                "ha-more-info-dialog".to_owned(),
                "ha-more-info-info".to_owned(),
            ],
            dialog_tag: "ha-more-info-dialog".to_owned(),
            subject_attribute: "entity-id".to_owned(),
            content_tags: vec!["ha-more-info-info".to_owned(), "more-info-content".to_owned()],
        }
    }
}

impl BindingConfig {
    #[must_use]
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms.max(1))
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for a daily-rolling log file. `None` logs to stderr only.
    pub directory: Option<PathBuf>,
    /// File name prefix inside `directory`.
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            directory: None,
            file_prefix: "quick-timer.log".to_owned(),
        }
    }
}

/// Compact tile or full card.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceLayout {
    #[default]
    Card,
    Tile,
}

/// One configured card/tile surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardConfig {
    /// Stable identity key, assigned once by [`CardConfig::ensure_task_id`].
    pub task_id: Option<String>,
    /// Legacy single entity.
    #[serde(alias = "entity_id")]
    pub entity: Option<String>,
    pub targets: Vec<Target>,
    pub label: Option<String>,
    pub layout: SurfaceLayout,
    /// Preselected command for a legacy single-entity card.
    pub command: Option<String>,
    /// Fire the command now and schedule its reverse.
    pub run_now: bool,
    pub default_time_mode: TimeMode,
    pub default_delay: u32,
    pub default_unit: TimeUnit,
    pub default_at_time: Option<AtTime>,
    pub notify_primary: bool,
    pub notify_channel: bool,
    pub notify_targets: Vec<String>,
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            task_id: None,
            entity: None,
            targets: Vec::new(),
            label: None,
            layout: SurfaceLayout::Card,
            command: None,
            run_now: false,
            default_time_mode: TimeMode::Relative,
            default_delay: 15,
            default_unit: TimeUnit::Minutes,
            default_at_time: None,
            notify_primary: false,
            notify_channel: false,
            notify_targets: Vec::new(),
        }
    }
}

/// A fresh identity key: `qt_` followed by 12 lowercase hex digits.
#[must_use]
pub fn generate_task_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("qt_{}", &hex[..12])
}

impl CardConfig {
    /// Assign an identity key if the card has none. Returns whether one was
    /// assigned; an existing key is never replaced.
    pub fn ensure_task_id(&mut self) -> bool {
        if self
            .task_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty())
        {
            return false;
        }
        self.task_id = Some(generate_task_id());
        true
    }

    #[must_use]
    pub fn identity(&self) -> SurfaceIdentity {
        SurfaceIdentity::new(self.task_id.clone(), &self.targets, self.entity.clone())
    }

    #[must_use]
    pub fn form_defaults(&self) -> FormDefaults {
        FormDefaults {
            time_mode: self.default_time_mode,
            delay: self.default_delay,
            unit: self.default_unit,
            at_time: self.default_at_time,
            notifications: Notifications {
                notify_primary: self.notify_primary,
                notify_channel: self.notify_channel,
                notify_targets: self.notify_targets.clone(),
            },
        }
    }
}

impl TimerConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::TimerError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::TimerError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/quick-timer/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("quick-timer").join("config.toml")
        } else if let Some(home) = dirs::home_dir() {
            home.join(".config").join("quick-timer").join("config.toml")
        } else {
            PathBuf::from("/tmp/quick-timer-config/config.toml")
        }
    }

    /// Give every card an identity key. Returns whether anything changed, in
    /// which case the config should be saved so the keys stay stable.
    pub fn ensure_card_ids(&mut self) -> bool {
        let mut changed = false;
        for card in &mut self.cards {
            changed |= card.ensure_task_id();
        }
        changed
    }
}

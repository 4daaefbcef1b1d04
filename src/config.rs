use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::applescript::ServiceKind;
use crate::images::{DEFAULT_FALLBACK_TEXT, DEFAULT_IMAGE_URLS};
use crate::store::{CorruptPolicy, Preselect};

/// Status of config file loading
#[derive(Debug, Clone)]
pub enum ConfigLoadStatus {
    /// Config loaded successfully from existing file
    Loaded,
    /// Created default config file (first run)
    Created,
    /// Error occurred during loading, using defaults.
    Error(String),
}

/// Template store configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// Backing JSON file. Unset means the platform data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Replacement for the bundled default templates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults_path: Option<String>,
    /// What to do with a backing file that fails to parse.
    pub on_corrupt: CorruptPolicy,
}

/// Messages automation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagesConfig {
    /// Path to the osascript binary.
    pub osascript: String,
    /// Messages service used to reach the recipient.
    pub service: ServiceKind,
    /// Seconds to wait for osascript before killing it. 0 waits forever.
    pub timeout_secs: u64,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            osascript: "/usr/bin/osascript".to_string(),
            service: ServiceKind::default(),
            timeout_secs: 30,
        }
    }
}

/// Random image configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagesConfig {
    /// Candidate image URLs, one is picked at random per send.
    pub urls: Vec<String>,
    /// Text sent instead when the image can't be fetched or sent.
    pub fallback_text: String,
    /// Download timeout in seconds. 0 disables the timeout.
    pub timeout_secs: u64,
    /// Where downloaded images are staged; the system temp dir when unset.
    pub temp_dir: Option<String>,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            urls: DEFAULT_IMAGE_URLS.iter().map(|u| u.to_string()).collect(),
            fallback_text: DEFAULT_FALLBACK_TEXT.to_string(),
            timeout_secs: 20,
            temp_dir: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Template selected when the UI opens: an index or a template name.
    /// Falls back to the first template when it doesn't resolve.
    pub preselect: Preselect,
    /// Template selected when the UI opens with `--quick`.
    pub quick_preselect: Preselect,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            preselect: Preselect::default(),
            // First duck response in the bundled list
            quick_preselect: Preselect::Index(2),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub behavior: BehaviorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Expand `~` to home directory in a path string
    pub fn expand_tilde(path: &str) -> PathBuf {
        if let Some(stripped) = path.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(stripped);
        }
        PathBuf::from(path)
    }

    /// Preselection for a normal or a `--quick` launch
    pub fn preselect(&self, quick: bool) -> &Preselect {
        if quick {
            &self.behavior.quick_preselect
        } else {
            &self.behavior.preselect
        }
    }

    /// Get the template store path, defaulting to the platform data dir
    pub fn store_path(&self) -> PathBuf {
        match &self.store.path {
            Some(path) => Self::expand_tilde(path),
            None => default_store_path(),
        }
    }

    /// Get the expanded custom defaults path, if configured
    pub fn defaults_path(&self) -> Option<PathBuf> {
        self.store.defaults_path.as_deref().map(Self::expand_tilde)
    }

    /// Get the expanded osascript path
    pub fn osascript_path(&self) -> PathBuf {
        Self::expand_tilde(&self.messages.osascript)
    }

    pub fn script_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.messages.timeout_secs)
    }

    pub fn download_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.images.timeout_secs)
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Loaded configuration with metadata
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub config_path: PathBuf,
    pub status: ConfigLoadStatus,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "spam-reply", "spam-reply")
}

/// Get the full path to the config file
pub fn get_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Default location of the template file
pub fn default_store_path() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("responses.json"))
        .unwrap_or_else(|| PathBuf::from("responses.json"))
}

/// Load configuration from file, environment, and defaults.
///
/// `explicit_path` (from `--config`) replaces the platform config location.
pub fn load_config(explicit_path: Option<&Path>) -> LoadedConfig {
    let config_path = match explicit_path.map(Path::to_path_buf).or_else(get_config_path) {
        Some(path) => path,
        None => {
            warn!("Could not determine config directory, using defaults");
            return LoadedConfig {
                config: apply_env_overrides(Config::default()),
                config_path: PathBuf::from("config.toml"),
                status: ConfigLoadStatus::Error("Could not determine config directory".to_string()),
            };
        }
    };

    debug!("Config path: {:?}", config_path);

    let (config, status) = load_or_create_config(&config_path);
    let config = apply_env_overrides(config);

    LoadedConfig {
        config,
        config_path,
        status,
    }
}

/// Load config from file, or create default if not exists
fn load_or_create_config(config_path: &Path) -> (Config, ConfigLoadStatus) {
    match fs::read_to_string(config_path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(config) => {
                info!("Loaded config from {:?}", config_path);
                (config, ConfigLoadStatus::Loaded)
            }
            Err(e) => {
                warn!(
                    "Config file malformed at {:?}: {}. Using defaults.",
                    config_path, e
                );
                (
                    Config::default(),
                    ConfigLoadStatus::Error(format!("Malformed TOML: {}", e)),
                )
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => create_default_config(config_path),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            warn!(
                "Permission denied reading config at {:?}. Using defaults.",
                config_path
            );
            (
                Config::default(),
                ConfigLoadStatus::Error("Permission denied reading config".to_string()),
            )
        }
        Err(e) => {
            warn!(
                "Error reading config at {:?}: {}. Using defaults.",
                config_path, e
            );
            (
                Config::default(),
                ConfigLoadStatus::Error(format!("Read error: {}", e)),
            )
        }
    }
}

/// Create the default config file
fn create_default_config(config_path: &Path) -> (Config, ConfigLoadStatus) {
    let config = Config::default();

    if let Some(parent) = config_path.parent()
        && let Err(e) = fs::create_dir_all(parent)
    {
        warn!(
            "Could not create config directory {:?}: {}. Continuing without file.",
            parent, e
        );
        return (
            config,
            ConfigLoadStatus::Error(format!("Could not create config directory: {}", e)),
        );
    }

    let toml_content = match toml::to_string_pretty(&config) {
        Ok(s) => s,
        Err(e) => {
            warn!("Could not serialize default config: {}", e);
            return (
                config,
                ConfigLoadStatus::Error(format!("Serialization error: {}", e)),
            );
        }
    };

    match fs::write(config_path, &toml_content) {
        Ok(()) => {
            info!("Created default config at {:?}", config_path);
            (config, ConfigLoadStatus::Created)
        }
        Err(e) => {
            warn!(
                "Could not write default config to {:?}: {}. Continuing without file.",
                config_path, e
            );
            (
                config,
                ConfigLoadStatus::Error(format!("Write error: {}", e)),
            )
        }
    }
}

/// Apply environment variable overrides to config
fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(path) = env::var("SPAM_REPLY_STORE") {
        debug!("Overriding store.path from SPAM_REPLY_STORE");
        config.store.path = Some(path);
    }

    if let Ok(path) = env::var("SPAM_REPLY_OSASCRIPT") {
        debug!("Overriding messages.osascript from SPAM_REPLY_OSASCRIPT");
        config.messages.osascript = path;
    }

    if let Ok(level) = env::var("SPAM_REPLY_LOG") {
        debug!("Overriding logging.level from SPAM_REPLY_LOG");
        config.logging.level = level;
    }

    config
}

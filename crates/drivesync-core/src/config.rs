//! Configuration module for DriveSync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::NamingConvention;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for DriveSync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub drive: DriveConfig,
    pub auth: AuthConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

/// Remote drive API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Base URL of the Drive v3 REST API.
    pub api_base_url: String,
    /// Base URL used for media uploads.
    pub upload_base_url: String,
    /// Private space holding the records (`appDataFolder`).
    pub space: String,
    /// Items requested per listing page (1..=1000).
    pub page_size: u32,
    /// How remote item names are split into record keys.
    pub naming_convention: NamingConvention,
    /// MIME type of record items; items of any other type are skipped.
    pub record_mime_type: String,
}

/// Authentication / OAuth settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// OAuth client ID. `None` until the application is registered.
    pub client_id: Option<String>,
    /// Loopback redirect URI for the authorization code.
    pub redirect_uri: String,
    /// OAuth scopes requested at sign-in.
    pub scopes: Vec<String>,
    /// Account name under which tokens are stored in the keyring.
    pub keyring_user: String,
}

/// Local record store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,
    /// Capacity of the store's request queue.
    pub queue_depth: usize,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/drivesync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("drivesync")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Drive scope restricted to the application's private space.
pub const APPDATA_SCOPE: &str = "https://www.googleapis.com/auth/drive.appdata";

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://www.googleapis.com/drive/v3".to_string(),
            upload_base_url: "https://www.googleapis.com/upload/drive/v3".to_string(),
            space: "appDataFolder".to_string(),
            page_size: 1000,
            naming_convention: NamingConvention::default(),
            record_mime_type: "application/json".to_string(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            redirect_uri: "http://127.0.0.1:8400/callback".to_string(),
            scopes: vec![APPDATA_SCOPE.to_string()],
            keyring_user: "default".to_string(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("~/.local/share"));
        Self {
            database_path: data_dir.join("drivesync").join("records.db"),
            queue_depth: 100,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"drive.page_size"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Largest page size the files.list endpoint accepts.
pub const MAX_PAGE_SIZE: u32 = 1000;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- drive ---
        for (field, value) in [
            ("drive.api_base_url", &self.drive.api_base_url),
            ("drive.upload_base_url", &self.drive.upload_base_url),
        ] {
            if url::Url::parse(value).is_err() {
                errors.push(ValidationError {
                    field: field.into(),
                    message: format!("not a valid URL: '{value}'"),
                });
            }
        }
        if self.drive.space.is_empty() {
            errors.push(ValidationError {
                field: "drive.space".into(),
                message: "must not be empty".into(),
            });
        }
        if self.drive.page_size == 0 || self.drive.page_size > MAX_PAGE_SIZE {
            errors.push(ValidationError {
                field: "drive.page_size".into(),
                message: format!("must be between 1 and {MAX_PAGE_SIZE}"),
            });
        }
        if self.drive.record_mime_type.is_empty() {
            errors.push(ValidationError {
                field: "drive.record_mime_type".into(),
                message: "must not be empty".into(),
            });
        }

        // --- auth ---
        if let Some(client_id) = &self.auth.client_id {
            if client_id.trim().is_empty() {
                errors.push(ValidationError {
                    field: "auth.client_id".into(),
                    message: "must not be blank when set".into(),
                });
            }
        }
        match url::Url::parse(&self.auth.redirect_uri) {
            Ok(uri) if uri.port().is_some() => {}
            _ => errors.push(ValidationError {
                field: "auth.redirect_uri".into(),
                message: format!(
                    "must be a loopback URL with an explicit port: '{}'",
                    self.auth.redirect_uri
                ),
            }),
        }
        if self.auth.scopes.is_empty() {
            errors.push(ValidationError {
                field: "auth.scopes".into(),
                message: "at least one scope is required".into(),
            });
        }
        if self.auth.keyring_user.is_empty() {
            errors.push(ValidationError {
                field: "auth.keyring_user".into(),
                message: "must not be empty".into(),
            });
        }

        // --- store ---
        if self.store.queue_depth == 0 {
            errors.push(ValidationError {
                field: "store.queue_depth".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use drivesync_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .auth_client_id("1234.apps.googleusercontent.com")
///     .drive_page_size(500)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- drive ---

    pub fn drive_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.drive.api_base_url = url.into();
        self
    }

    pub fn drive_upload_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.drive.upload_base_url = url.into();
        self
    }

    pub fn drive_space(mut self, space: impl Into<String>) -> Self {
        self.config.drive.space = space.into();
        self
    }

    pub fn drive_page_size(mut self, page_size: u32) -> Self {
        self.config.drive.page_size = page_size;
        self
    }

    pub fn drive_naming_convention(mut self, convention: NamingConvention) -> Self {
        self.config.drive.naming_convention = convention;
        self
    }

    pub fn drive_record_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.config.drive.record_mime_type = mime_type.into();
        self
    }

    // --- auth ---

    pub fn auth_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.auth.client_id = Some(client_id.into());
        self
    }

    pub fn auth_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.config.auth.redirect_uri = redirect_uri.into();
        self
    }

    pub fn auth_scopes(mut self, scopes: Vec<String>) -> Self {
        self.config.auth.scopes = scopes;
        self
    }

    pub fn auth_keyring_user(mut self, user: impl Into<String>) -> Self {
        self.config.auth.keyring_user = user.into();
        self
    }

    // --- store ---

    pub fn store_database_path(mut self, path: PathBuf) -> Self {
        self.config.store.database_path = path;
        self
    }

    pub fn store_queue_depth(mut self, depth: usize) -> Self {
        self.config.store.queue_depth = depth;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

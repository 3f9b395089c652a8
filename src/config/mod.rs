//! Configuration management
//!
//! Configuration is loaded from `config.yml` and can be overridden with
//! `EDUCATIA_*` environment variables. Missing values fall back to defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Externally visible base URL, used for links in outgoing mail
    #[serde(default = "default_public_url")]
    pub public_url: String,
    /// CORS allowed origin (for cookie-based auth)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_public_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/site.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Signing keys and lifetimes for sessions and account tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Key used to sign activation and password reset tokens.
    /// When empty a random key is generated at startup.
    #[serde(default)]
    pub secret_key: String,
    /// Lifetime of activation and reset tokens in seconds
    #[serde(default = "default_token_expiration")]
    pub token_expiration_secs: i64,
    /// Lifetime of a "remember me" login session in days
    #[serde(default = "default_session_expiration_days")]
    pub session_expiration_days: i64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            token_expiration_secs: default_token_expiration(),
            session_expiration_days: default_session_expiration_days(),
        }
    }
}

fn default_token_expiration() -> i64 {
    1800
}

fn default_session_expiration_days() -> i64 {
    7
}

/// Outgoing mail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// SMTP relay host. Without one, mail is written to the log instead.
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default = "default_mail_port")]
    pub port: u16,
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// From address; falls back to `username`
    #[serde(default)]
    pub sender: Option<String>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            server: None,
            port: default_mail_port(),
            use_tls: false,
            username: None,
            password: None,
            sender: None,
        }
    }
}

fn default_mail_port() -> u16 {
    25
}

impl MailConfig {
    /// Address used in the From header
    pub fn from_address(&self) -> String {
        self.sender
            .clone()
            .or_else(|| self.username.clone())
            .unwrap_or_else(|| "noreply@educatia.local".to_string())
    }
}

/// Profile picture upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Directory that holds profile pictures
    #[serde(default = "default_upload_path")]
    pub path: PathBuf,
    /// Maximum file size in bytes (default: 2MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Accepted file extensions, lowercase
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            path: default_upload_path(),
            max_file_size: default_max_file_size(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

fn default_upload_path() -> PathBuf {
    PathBuf::from("static/images/profile_pics")
}

fn default_max_file_size() -> u64 {
    2 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["jpg".to_string(), "png".to_string()]
}

impl UploadConfig {
    /// Check if a file extension is allowed (case-insensitive)
    pub fn is_extension_allowed(&self, ext: &str) -> bool {
        let ext = ext.to_lowercase();
        self.allowed_extensions.iter().any(|e| *e == ext)
    }
}

/// Administrator account created by the `create-admin` command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_username")]
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            username: default_admin_username(),
            email: None,
            password: None,
        }
    }
}

fn default_admin_username() -> String {
    "Admin".to_string()
}

/// Listing page size
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            per_page: default_per_page(),
        }
    }
}

fn default_per_page() -> i64 {
    5
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// A missing or empty file yields the default configuration.
    /// Invalid YAML is reported with its location.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Recognised variables:
    /// - EDUCATIA_SERVER_HOST, EDUCATIA_SERVER_PORT, EDUCATIA_SERVER_PUBLIC_URL
    /// - EDUCATIA_DATABASE_DRIVER, EDUCATIA_DATABASE_URL
    /// - EDUCATIA_SECRET_KEY
    /// - EDUCATIA_MAIL_SERVER, EDUCATIA_MAIL_PORT, EDUCATIA_MAIL_USE_TLS,
    ///   EDUCATIA_MAIL_USERNAME, EDUCATIA_MAIL_PASSWORD
    /// - EDUCATIA_ADMIN_EMAIL, EDUCATIA_ADMIN_PASSWORD
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("EDUCATIA_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("EDUCATIA_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(url) = std::env::var("EDUCATIA_SERVER_PUBLIC_URL") {
            self.server.public_url = url;
        }

        if let Ok(driver) = std::env::var("EDUCATIA_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {}
            }
        }
        if let Ok(url) = std::env::var("EDUCATIA_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(key) = std::env::var("EDUCATIA_SECRET_KEY") {
            self.security.secret_key = key;
        }

        if let Ok(server) = std::env::var("EDUCATIA_MAIL_SERVER") {
            self.mail.server = Some(server);
        }
        if let Ok(port) = std::env::var("EDUCATIA_MAIL_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.mail.port = port;
            }
        }
        if let Ok(tls) = std::env::var("EDUCATIA_MAIL_USE_TLS") {
            match tls.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.mail.use_tls = true,
                "0" | "false" | "no" => self.mail.use_tls = false,
                _ => {}
            }
        }
        if let Ok(username) = std::env::var("EDUCATIA_MAIL_USERNAME") {
            self.mail.username = Some(username);
        }
        if let Ok(password) = std::env::var("EDUCATIA_MAIL_PASSWORD") {
            self.mail.password = Some(password);
        }

        if let Ok(email) = std::env::var("EDUCATIA_ADMIN_EMAIL") {
            self.admin.email = Some(email);
        }
        if let Ok(password) = std::env::var("EDUCATIA_ADMIN_PASSWORD") {
            self.admin.password = Some(password);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pagination.per_page < 1 {
            return Err(ConfigError::ValidationError(
                "pagination.per_page must be at least 1".to_string(),
            ));
        }
        if self.security.token_expiration_secs < 1 {
            return Err(ConfigError::ValidationError(
                "security.token_expiration_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by every test that touches process environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

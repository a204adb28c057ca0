//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Token signing and bootstrap credentials.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Document storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Real-time notification settings.
    #[serde(default)]
    pub notifications: NotificationsConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Origin of the browser client allowed by CORS.
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

impl DatabaseConfig {
    pub fn runtime_settings(&self) -> omnidoc_db::DbRuntimeSettings {
        omnidoc_db::DbRuntimeSettings {
            busy_timeout_ms: self.busy_timeout_ms,
            pool_max_size: self.pool_max_size,
        }
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to sign bearer tokens. Must not be empty.
    #[serde(default)]
    pub jwt_secret: String,

    /// Lifetime of issued tokens, in seconds.
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,

    /// Email of the admin created when the user table is empty.
    #[serde(default)]
    pub admin_email: Option<String>,

    /// Password of the bootstrap admin.
    #[serde(default)]
    pub admin_password: Option<String>,
}

/// Document storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory of uploaded and generated documents.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,

    /// Optional PDF the certificate text is drawn onto.
    #[serde(default)]
    pub certificate_template: Option<String>,

    /// Largest accepted upload, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

/// Which audience receives subscriber and user mutation events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyScope {
    /// The owning agency plus admins and controleurs.
    #[default]
    Agency,
    /// Every connected channel.
    All,
}

impl std::str::FromStr for NotifyScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agency" => Ok(Self::Agency),
            "all" => Ok(Self::All),
            other => Err(format!("unknown notification scope: {}", other)),
        }
    }
}

/// Notification configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub scope: NotifyScope,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "omnidoc_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    5000
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_db_path() -> String {
    "omnidoc.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_token_ttl_secs() -> u64 {
    omnidoc_identity::DEFAULT_TOKEN_TTL_SECS
}

fn default_upload_dir() -> String {
    "uploads".to_string()
}

fn default_max_upload_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_secs: default_token_ttl_secs(),
            admin_email: None,
            admin_password: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            certificate_template: None,
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// No token signing secret was configured.
    #[error("auth.jwt_secret must be set (or OMNIDOC_JWT_SECRET)")]
    MissingJwtSecret,
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `OMNIDOC_HOST`, `OMNIDOC_PORT`, `OMNIDOC_CORS_ORIGIN` override `server.*`
/// - `OMNIDOC_DB_PATH` overrides `database.path`
/// - `OMNIDOC_JWT_SECRET`, `OMNIDOC_TOKEN_TTL_SECS`, `OMNIDOC_ADMIN_EMAIL`,
///   `OMNIDOC_ADMIN_PASSWORD` override `auth.*`
/// - `OMNIDOC_UPLOAD_DIR`, `OMNIDOC_CERTIFICATE_TEMPLATE` override `storage.*`
/// - `OMNIDOC_NOTIFY_SCOPE` overrides `notifications.scope` (`agency` or `all`)
/// - `OMNIDOC_LOG_LEVEL` overrides `logging.level`
/// - `OMNIDOC_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed, or
/// if no JWT secret is configured once overrides are applied.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    if config.auth.jwt_secret.trim().is_empty() {
        return Err(ConfigError::MissingJwtSecret);
    }

    Ok(config)
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(host) = var("OMNIDOC_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("OMNIDOC_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(origin) = var("OMNIDOC_CORS_ORIGIN") {
        config.server.cors_origin = origin;
    }
    if let Some(db_path) = var("OMNIDOC_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(secret) = var("OMNIDOC_JWT_SECRET") {
        config.auth.jwt_secret = secret;
    }
    if let Some(ttl) = var("OMNIDOC_TOKEN_TTL_SECS") {
        if let Ok(parsed) = ttl.parse() {
            config.auth.token_ttl_secs = parsed;
        }
    }
    if let Some(email) = var("OMNIDOC_ADMIN_EMAIL") {
        config.auth.admin_email = Some(email);
    }
    if let Some(password) = var("OMNIDOC_ADMIN_PASSWORD") {
        config.auth.admin_password = Some(password);
    }
    if let Some(dir) = var("OMNIDOC_UPLOAD_DIR") {
        config.storage.upload_dir = dir;
    }
    if let Some(template) = var("OMNIDOC_CERTIFICATE_TEMPLATE") {
        config.storage.certificate_template = Some(template);
    }
    if let Some(scope) = var("OMNIDOC_NOTIFY_SCOPE") {
        match scope.parse() {
            Ok(parsed) => config.notifications.scope = parsed,
            Err(e) => tracing::warn!("ignoring OMNIDOC_NOTIFY_SCOPE: {}", e),
        }
    }
    if let Some(level) = var("OMNIDOC_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("OMNIDOC_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_fill_missing_sections() {
        let config: Config = toml::from_str("[auth]\njwt_secret = \"s\"\n").unwrap();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.storage.upload_dir, "uploads");
        assert_eq!(config.storage.max_upload_bytes, 5 * 1024 * 1024);
        assert_eq!(config.notifications.scope, NotifyScope::Agency);
        assert_eq!(config.auth.token_ttl_secs, 86_400);
    }

    #[test]
    fn database_section_feeds_pool_settings() {
        let config: Config = toml::from_str(
            "[database]\npath = \":memory:\"\nbusy_timeout_ms = 250\npool_max_size = 2\n",
        )
        .unwrap();
        assert_eq!(
            config.database.runtime_settings(),
            omnidoc_db::DbRuntimeSettings {
                busy_timeout_ms: 250,
                pool_max_size: 2,
            }
        );
        let pool = omnidoc_db::open_database(
            &config.database.path,
            config.database.runtime_settings(),
        )
        .unwrap();
        assert_eq!(pool.max_size(), 1);
    }

    #[test]
    fn notification_scope_parses_from_toml() {
        let config: Config = toml::from_str("[notifications]\nscope = \"all\"\n").unwrap();
        assert_eq!(config.notifications.scope, NotifyScope::All);
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = [
            ("OMNIDOC_PORT", "8080"),
            ("OMNIDOC_JWT_SECRET", "from-env"),
            ("OMNIDOC_NOTIFY_SCOPE", "all"),
            ("OMNIDOC_LOG_JSON", "1"),
            ("OMNIDOC_HOST", "not-an-ip"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        apply_env_overrides(&mut config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.jwt_secret, "from-env");
        assert_eq!(config.notifications.scope, NotifyScope::All);
        assert!(config.logging.json);
        assert_eq!(config.server.host, default_host());
    }

    #[test]
    fn missing_secret_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = 5001\n").unwrap();

        // Only meaningful when the variable is not set in the test environment.
        if std::env::var("OMNIDOC_JWT_SECRET").is_err() {
            let err = load_config(path.to_str()).unwrap_err();
            assert!(matches!(err, ConfigError::MissingJwtSecret));
        }
    }
}

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("missing configuration: {0}")]
    Missing(&'static str),
}

/// One year.
pub const MAX_TOKEN_LIFETIME_HOURS: u64 = 24 * 366;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub db: DbConfig,
    pub jwt: JwtConfig,
    pub app: AppSection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl FromStr for Environment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "staging" | "stage" => Ok(Environment::Staging),
            "development" | "dev" | "local" => Ok(Environment::Development),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub env: Environment,
    pub log_level: String,
    pub shutdown_grace_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            env: Environment::Development,
            log_level: "info".to_string(),
            shutdown_grace_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DbConfig {
    pub pg: PgConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PgConfig {
    pub read: PgNodeConfig,
    pub write: PgNodeConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PgNodeConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    pub sslmode: String,
    pub max_open_connection: u32,
    pub max_idle_connection: u32,
    /// Seconds; 0 disables the lifetime cap.
    pub max_connection_lifetime: u64,
}

impl Default for PgNodeConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            name: "school_admin".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            sslmode: "disable".to_string(),
            max_open_connection: 20,
            max_idle_connection: 5,
            max_connection_lifetime: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    pub secret: String,
    pub expire_time_hours: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            expire_time_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub url: String,
    pub cors: CorsConfig,
    pub pagination: PaginationConfig,
    pub password: PasswordConfig,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            cors: CorsConfig::default(),
            pagination: PaginationConfig::default(),
            password: PasswordConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enable: bool,
    pub allow_credentials: bool,
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub max_age_seconds: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enable: true,
            allow_credentials: false,
            allowed_origins: vec!["*".to_string()],
            allowed_methods: ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            allowed_headers: ["Authorization", "Content-Type", "X-Tenant-ID", "X-Request-ID"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_age_seconds: 86400,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
        }
    }
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl AppConfig {
    /// Defaults, then the optional YAML file, then process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };

        let config = base.with_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Environment variables override dotted keys: `db.pg.read.host` is `DB_PG_READ_HOST`.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server overrides
        if let Some(v) = lookup("SERVER_HOST") {
            self.server.host = v;
        }
        override_parsed(&lookup, "SERVER_PORT", &mut self.server.port)?;
        if let Some(v) = lookup("SERVER_ENV") {
            self.server.env = v.parse().map_err(|_| ConfigError::InvalidValue {
                key: "SERVER_ENV",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("SERVER_LOG_LEVEL") {
            self.server.log_level = v;
        }
        override_parsed(
            &lookup,
            "SERVER_SHUTDOWN_GRACE_SECONDS",
            &mut self.server.shutdown_grace_seconds,
        )?;

        // Database overrides
        override_node(&lookup, "DB_PG_READ", &mut self.db.pg.read)?;
        override_node(&lookup, "DB_PG_WRITE", &mut self.db.pg.write)?;

        // JWT overrides
        if let Some(v) = lookup("JWT_SECRET") {
            self.jwt.secret = v;
        }
        override_parsed(&lookup, "JWT_EXPIRE_TIME_HOURS", &mut self.jwt.expire_time_hours)?;

        // App overrides
        if let Some(v) = lookup("APP_URL") {
            self.app.url = v;
        }
        let cors = &mut self.app.cors;
        override_parsed(&lookup, "APP_CORS_ENABLE", &mut cors.enable)?;
        override_parsed(&lookup, "APP_CORS_ALLOW_CREDENTIALS", &mut cors.allow_credentials)?;
        override_list(&lookup, "APP_CORS_ALLOWED_ORIGINS", &mut cors.allowed_origins);
        override_list(&lookup, "APP_CORS_ALLOWED_METHODS", &mut cors.allowed_methods);
        override_list(&lookup, "APP_CORS_ALLOWED_HEADERS", &mut cors.allowed_headers);
        override_parsed(&lookup, "APP_CORS_MAX_AGE_SECONDS", &mut cors.max_age_seconds)?;

        let pagination = &mut self.app.pagination;
        override_parsed(&lookup, "APP_PAGINATION_DEFAULT_LIMIT", &mut pagination.default_limit)?;
        override_parsed(&lookup, "APP_PAGINATION_MAX_LIMIT", &mut pagination.max_limit)?;

        let password = &mut self.app.password;
        override_parsed(&lookup, "APP_PASSWORD_MEMORY_KIB", &mut password.memory_kib)?;
        override_parsed(&lookup, "APP_PASSWORD_ITERATIONS", &mut password.iterations)?;
        override_parsed(&lookup, "APP_PASSWORD_PARALLELISM", &mut password.parallelism)?;

        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.secret.trim().is_empty() {
            return Err(ConfigError::Missing("jwt.secret"));
        }
        if !(1..=MAX_TOKEN_LIFETIME_HOURS).contains(&self.jwt.expire_time_hours) {
            return Err(ConfigError::InvalidValue {
                key: "jwt.expire_time_hours",
                value: self.jwt.expire_time_hours.to_string(),
            });
        }
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "server.port",
                value: "0".to_string(),
            });
        }
        let pagination = self.app.pagination;
        if pagination.max_limit == 0 || pagination.default_limit == 0 {
            return Err(ConfigError::InvalidValue {
                key: "app.pagination",
                value: "limits must be positive".to_string(),
            });
        }
        if pagination.default_limit > pagination.max_limit {
            return Err(ConfigError::InvalidValue {
                key: "app.pagination.default_limit",
                value: pagination.default_limit.to_string(),
            });
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.env == Environment::Production
    }
}

fn override_parsed<F, T>(lookup: &F, key: &'static str, field: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    override_node_parsed(lookup, key.to_string(), key, field)
}

fn override_list<F>(lookup: &F, key: &str, field: &mut Vec<String>)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup(key) {
        *field = v
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

fn override_node<F>(lookup: &F, prefix: &str, node: &mut PgNodeConfig) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let key = |suffix: &str| format!("{}_{}", prefix, suffix);

    if let Some(v) = lookup(&key("HOST")) {
        node.host = v;
    }
    if let Some(v) = lookup(&key("NAME")) {
        node.name = v;
    }
    if let Some(v) = lookup(&key("USER")) {
        node.user = v;
    }
    if let Some(v) = lookup(&key("PASSWORD")) {
        node.password = v;
    }
    if let Some(v) = lookup(&key("SSLMODE")) {
        node.sslmode = v;
    }

    override_node_parsed(lookup, key("PORT"), "db.pg.port", &mut node.port)?;
    override_node_parsed(
        lookup,
        key("MAX_OPEN_CONNECTION"),
        "db.pg.max_open_connection",
        &mut node.max_open_connection,
    )?;
    override_node_parsed(
        lookup,
        key("MAX_IDLE_CONNECTION"),
        "db.pg.max_idle_connection",
        &mut node.max_idle_connection,
    )?;
    override_node_parsed(
        lookup,
        key("MAX_CONNECTION_LIFETIME"),
        "db.pg.max_connection_lifetime",
        &mut node.max_connection_lifetime,
    )?;
    Ok(())
}

fn override_node_parsed<F, T>(
    lookup: &F,
    env_key: String,
    name: &'static str,
    field: &mut T,
) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(v) = lookup(&env_key) {
        *field = v
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key: name, value: v.clone() })?;
    }
    Ok(())
}

use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub snowflake: SnowflakeConfig,
    pub source: SourceConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

/// Connection settings for the Snowflake SQL API.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SnowflakeConfig {
    pub account: String,
    pub user: String,
    pub token: String,
    pub warehouse: String,
    pub role: String,
}

/// Shape of the upstream query-history pull.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Trailing window of query history to fetch, in days (default: 30)
    #[serde(deserialize_with = "deserialize_days_i64")]
    pub window_days: i64,
}

/// Metrics store refresh policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Snapshot age after which a read triggers a refresh (default: 1h)
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub ttl_secs: u64,
}

impl Config {
    /// Load configuration with environment variable override support
    ///
    /// Loading order:
    /// 1. Load from config.toml file
    /// 2. Override with environment variables (prefixed with APP_)
    /// 3. Validate the final configuration
    pub fn load() -> Result<Self, anyhow::Error> {
        Self::load_from(None)
    }

    /// Load from an explicit file path (`--config`) or the default search
    /// locations.
    pub fn load_from(path: Option<&str>) -> Result<Self, anyhow::Error> {
        // 1. Load from config file
        let mut config = if let Some(config_path) = path {
            Self::from_toml(config_path)?
        } else if let Some(config_path) = Self::find_config_file() {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("Configuration file not found, using defaults");
            Config::default()
        };

        // 2. Override with environment variables
        config.apply_env_overrides();

        // 3. Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - APP_SERVER_HOST: Server host (default: 0.0.0.0)
    /// - APP_SERVER_PORT: Server port (default: 8080)
    /// - APP_LOG_LEVEL: Logging level (e.g., "info,finops_admin=debug")
    /// - APP_SNOWFLAKE_ACCOUNT / APP_SNOWFLAKE_USER / APP_SNOWFLAKE_TOKEN /
    ///   APP_SNOWFLAKE_WAREHOUSE / APP_SNOWFLAKE_ROLE: SQL API connection
    /// - APP_SOURCE_WINDOW_DAYS: Query-history window in days (accepts "30" or "30d")
    /// - APP_METRICS_TTL_SECS: Snapshot staleness interval (accepts "3600", "30m", "1h")
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("APP_SERVER_HOST") {
            self.server.host = host;
            tracing::info!("Override server.host from env: {}", self.server.host);
        }

        if let Ok(port) = std::env::var("APP_SERVER_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
            tracing::info!("Override server.port from env: {}", self.server.port);
        }

        if let Ok(level) = std::env::var("APP_LOG_LEVEL") {
            self.logging.level = level;
            tracing::info!("Override logging.level from env: {}", self.logging.level);
        }

        if let Ok(account) = std::env::var("APP_SNOWFLAKE_ACCOUNT") {
            self.snowflake.account = account;
            tracing::info!("Override snowflake.account from env");
        }

        if let Ok(user) = std::env::var("APP_SNOWFLAKE_USER") {
            self.snowflake.user = user;
            tracing::info!("Override snowflake.user from env");
        }

        if let Ok(token) = std::env::var("APP_SNOWFLAKE_TOKEN") {
            self.snowflake.token = token;
            tracing::info!("Override snowflake.token from env");
        }

        if let Ok(warehouse) = std::env::var("APP_SNOWFLAKE_WAREHOUSE") {
            self.snowflake.warehouse = warehouse;
            tracing::info!("Override snowflake.warehouse from env");
        }

        if let Ok(role) = std::env::var("APP_SNOWFLAKE_ROLE") {
            self.snowflake.role = role;
            tracing::info!("Override snowflake.role from env");
        }

        if let Ok(window) = std::env::var("APP_SOURCE_WINDOW_DAYS") {
            match parse_days_to_i64(&window) {
                Ok(val) => {
                    self.source.window_days = val;
                    tracing::info!(
                        "Override source.window_days from env: {}",
                        self.source.window_days
                    );
                },
                Err(e) => tracing::warn!(
                    "Invalid APP_SOURCE_WINDOW_DAYS '{}': {} (keep {})",
                    window,
                    e,
                    self.source.window_days
                ),
            }
        }

        if let Ok(ttl) = std::env::var("APP_METRICS_TTL_SECS") {
            match parse_duration_to_secs(&ttl) {
                Ok(val) => {
                    self.metrics.ttl_secs = val;
                    tracing::info!("Override metrics.ttl_secs from env: {}", self.metrics.ttl_secs);
                },
                Err(e) => tracing::warn!(
                    "Invalid APP_METRICS_TTL_SECS '{}': {} (keep {})",
                    ttl,
                    e,
                    self.metrics.ttl_secs
                ),
            }
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.snowflake.token.is_empty() {
            tracing::warn!("⚠️  WARNING: No Snowflake API token configured!");
            tracing::warn!("⚠️  Set APP_SNOWFLAKE_TOKEN or update config.toml");
            tracing::warn!("⚠️  Refreshes will fail until a token is provided");
        }

        // Validate server port
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.source.window_days <= 0 {
            anyhow::bail!("source.window_days must be > 0");
        }
        if self.metrics.ttl_secs == 0 {
            anyhow::bail!("metrics.ttl_secs must be > 0");
        }

        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths =
            ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,finops_admin=debug".to_string(),
            file: Some("logs/finops-admin.log".to_string()),
        }
    }
}

impl Default for SnowflakeConfig {
    fn default() -> Self {
        Self {
            account: String::new(),
            user: String::new(),
            token: String::new(),
            warehouse: "COMPUTE_WH".to_string(),
            role: "FINOPS_READER".to_string(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self { window_days: 30 }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { ttl_secs: 3600 }
    }
}

// =========================
// Helpers for parsing values
// =========================

fn parse_duration_to_secs(input: &str) -> Result<u64, String> {
    // Accept plain numbers (treated as seconds)
    if let Ok(val) = input.parse::<u64>() {
        return Ok(val);
    }

    let s = input.trim().to_lowercase();
    let (num_str, unit) = s.split_at(s.chars().take_while(|c| c.is_ascii_digit()).count());
    if num_str.is_empty() || unit.is_empty() {
        return Err("missing number or unit".into());
    }
    let n: u64 = num_str.parse().map_err(|_| "invalid number".to_string())?;
    match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => Ok(n),
        "m" | "min" | "mins" | "minute" | "minutes" => Ok(n * 60),
        "h" | "hr" | "hour" | "hours" => Ok(n * 60 * 60),
        "d" | "day" | "days" => Ok(n * 60 * 60 * 24),
        _ => Err(format!("unsupported unit: {}", unit)),
    }
}

fn parse_days_to_i64(input: &str) -> Result<i64, String> {
    // Accept plain numbers (treated as days)
    if let Ok(val) = input.parse::<i64>() {
        return Ok(val);
    }

    let s = input.trim().to_lowercase();
    let (num_str, unit) = s.split_at(s.chars().take_while(|c| c.is_ascii_digit()).count());
    if num_str.is_empty() || unit.is_empty() {
        return Err("missing number or unit".into());
    }
    let n: i64 = num_str.parse().map_err(|_| "invalid number".to_string())?;
    match unit {
        "d" | "day" | "days" => Ok(n),
        "w" | "week" | "weeks" => Ok(n * 7),
        _ => Err(format!("unsupported unit: {}", unit)),
    }
}

// Custom serde deserializers to support numeric or human-friendly string values
fn deserialize_duration_secs<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Visitor;
    impl<'de> serde::de::Visitor<'de> for Visitor {
        type Value = u64;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a number of seconds or a string like '30s', '5m', '1h'")
        }
        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v)
        }
        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if v >= 0 { Ok(v as u64) } else { Err(E::custom("negative not allowed")) }
        }
        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_duration_to_secs(v).map_err(E::custom)
        }
        fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_duration_to_secs(&v).map_err(E::custom)
        }
    }
    deserializer.deserialize_any(Visitor)
}

fn deserialize_days_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Visitor;
    impl<'de> serde::de::Visitor<'de> for Visitor {
        type Value = i64;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a number of days or a string like '30d' or '2w'")
        }
        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(v)
        }
        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v as i64)
        }
        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_days_to_i64(v).map_err(E::custom)
        }
        fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_days_to_i64(&v).map_err(E::custom)
        }
    }
    deserializer.deserialize_any(Visitor)
}

use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub worker: WorkerConfig,
    pub retry: RetryConfig,
    pub providers: ProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub addr: String,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Number of parallel worker loops (C6). Default 4.
    pub worker_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Base of the exponential backoff formula (seconds). Default 60.
    pub base_seconds: u64,
    /// Exponent base of the backoff formula. Default 2.
    pub exponential_base: f64,
    /// Cap of the backoff formula (seconds). Default 3600.
    pub max_backoff_seconds: u64,
    /// Default `max_retries` for a notification when the caller omits it.
    pub default_max_retries: i64,
    /// Scheduler tick interval (seconds). Default 60.
    pub scheduler_tick_seconds: u64,
    /// DLQ monitor loop interval (seconds). Default 300 (5 min).
    pub dlq_monitor_interval_seconds: u64,
    /// Cleanup loop interval (seconds). Default 86400 (24h).
    pub cleanup_interval_seconds: u64,
    /// Retry sorted-set / DLQ entry retention, in days, pruned by the cleanup loop.
    pub cleanup_retention_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// `gmail`, `outlook`, or `custom` — selects the SMTP transport preset.
    pub smtp_provider: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
    /// `console` or `textbelt`.
    pub sms_provider: String,
    pub textbelt_api_key: Option<String>,
    pub fcm_server_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/notifications.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            redis: RedisConfig {
                addr: env::var("REDIS_ADDR").unwrap_or_else(|_| "localhost:6379".to_string()),
                password: env::var("REDIS_PASSWORD").ok(),
            },
            worker: WorkerConfig {
                worker_count: env::var("WORKER_COUNT")
                    .unwrap_or_else(|_| "4".to_string())
                    .parse()
                    .unwrap_or(4),
            },
            retry: RetryConfig {
                base_seconds: env::var("RETRY_BASE_SECONDS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap_or(60),
                exponential_base: env::var("RETRY_EXPONENTIAL_BASE")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .unwrap_or(2.0),
                max_backoff_seconds: env::var("RETRY_MAX_BACKOFF_SECONDS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()
                    .unwrap_or(3600),
                default_max_retries: env::var("NOTIFICATION_DEFAULT_MAX_RETRIES")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
                scheduler_tick_seconds: env::var("SCHEDULER_TICK_SECONDS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap_or(60),
                dlq_monitor_interval_seconds: env::var("DLQ_MONITOR_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .unwrap_or(300),
                cleanup_interval_seconds: env::var("CLEANUP_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "86400".to_string())
                    .parse()
                    .unwrap_or(86400),
                cleanup_retention_days: env::var("CLEANUP_RETENTION_DAYS")
                    .unwrap_or_else(|_| "7".to_string())
                    .parse()
                    .unwrap_or(7),
            },
            providers: ProviderConfig {
                smtp_provider: env::var("SMTP_PROVIDER").unwrap_or_else(|_| "custom".to_string()),
                smtp_host: env::var("SMTP_HOST").unwrap_or_default(),
                smtp_port: env::var("SMTP_PORT")
                    .unwrap_or_else(|_| "587".to_string())
                    .parse()
                    .unwrap_or(587),
                smtp_username: env::var("SMTP_USERNAME").ok(),
                smtp_password: env::var("SMTP_PASSWORD").ok(),
                smtp_from: env::var("SMTP_FROM").ok(),
                sms_provider: env::var("SMS_PROVIDER").unwrap_or_else(|_| "console".to_string()),
                textbelt_api_key: env::var("TEXTBELT_API_KEY").ok(),
                fcm_server_key: env::var("FCM_SERVER_KEY").ok(),
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite://data/notifications.db".to_string(),
                max_connections: 5,
            },
            redis: RedisConfig {
                addr: "localhost:6379".to_string(),
                password: None,
            },
            worker: WorkerConfig { worker_count: 4 },
            retry: RetryConfig {
                base_seconds: 60,
                exponential_base: 2.0,
                max_backoff_seconds: 3600,
                default_max_retries: 5,
                scheduler_tick_seconds: 60,
                dlq_monitor_interval_seconds: 300,
                cleanup_interval_seconds: 86400,
                cleanup_retention_days: 7,
            },
            providers: ProviderConfig {
                smtp_provider: "custom".to_string(),
                smtp_host: String::new(),
                smtp_port: 587,
                smtp_username: None,
                smtp_password: None,
                smtp_from: None,
                sms_provider: "console".to_string(),
                textbelt_api_key: None,
                fcm_server_key: None,
            },
        }
    }
}

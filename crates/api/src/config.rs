use std::path::PathBuf;
use std::time::Duration;

/// A configuration value that could not be parsed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got '{value}'")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8080`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Grace period for in-flight conversions on shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Maximum accepted request body (default: 50 MiB).
    pub max_upload_bytes: usize,
    /// Interval between observer pings (default: `30`).
    pub ws_heartbeat_interval_secs: u64,
    /// PostgreSQL URL. Jobs are kept in memory when unset.
    pub database_url: Option<String>,
    pub log_format: LogFormat,
    pub conversion: ConversionConfig,
}

/// Settings for the lifecycle engine and the retention sweeper.
#[derive(Debug, Clone)]
pub struct ConversionConfig {
    /// Root of per-job working directories (default: `/tmp/converter`).
    pub temp_dir: PathBuf,
    /// Converter executable (default: `libreoffice`).
    pub converter_bin: PathBuf,
    pub converter_timeout_secs: u64,
    /// Seconds between retention sweeps (default: one hour).
    pub cleanup_interval_secs: u64,
    /// Age after which a job is swept (default: 24 hours).
    pub retention_period_secs: u64,
}

impl ConversionConfig {
    pub fn converter_timeout(&self) -> Duration {
        Duration::from_secs(self.converter_timeout_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn retention_period(&self) -> Duration {
        Duration::from_secs(self.retention_period_secs)
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("/tmp/converter"),
            converter_bin: PathBuf::from("libreoffice"),
            converter_timeout_secs: 300,
            cleanup_interval_secs: 3600,
            retention_period_secs: 86_400,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                 |
    /// |------------------------------|-------------------------|
    /// | `HOST`                       | `0.0.0.0`               |
    /// | `PORT`                       | `8080`                  |
    /// | `CORS_ORIGINS`               | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`       | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`      | `30`                    |
    /// | `MAX_UPLOAD_BYTES`           | `52428800`              |
    /// | `WS_HEARTBEAT_INTERVAL_SECS` | `30`                    |
    /// | `DATABASE_URL`               | unset                   |
    /// | `LOG_FORMAT`                 | `text`                  |
    /// | `APP_TEMP_DIR`               | `/tmp/converter`        |
    /// | `CONVERTER_BIN`              | `libreoffice`           |
    /// | `CONVERTER_TIMEOUT_SECS`     | `300`                   |
    /// | `CLEANUP_INTERVAL_SECS`      | `3600`                  |
    /// | `RETENTION_PERIOD_SECS`      | `86400`                 |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ConversionConfig::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let conversion = ConversionConfig {
            temp_dir: var("APP_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_dir),
            converter_bin: var("CONVERTER_BIN")
                .map(PathBuf::from)
                .unwrap_or(defaults.converter_bin),
            converter_timeout_secs: parse_secs(
                "CONVERTER_TIMEOUT_SECS",
                var("CONVERTER_TIMEOUT_SECS"),
                defaults.converter_timeout_secs,
            )?,
            cleanup_interval_secs: parse_secs(
                "CLEANUP_INTERVAL_SECS",
                var("CLEANUP_INTERVAL_SECS"),
                defaults.cleanup_interval_secs,
            )?,
            retention_period_secs: parse_secs(
                "RETENTION_PERIOD_SECS",
                var("RETENTION_PERIOD_SECS"),
                defaults.retention_period_secs,
            )?,
        };

        let cors_origins: Vec<String> = var("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let log_format = match var("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "LOG_FORMAT",
                    expected: "'text' or 'json'",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse("PORT", "a valid port number", var("PORT"), 8080)?,
            cors_origins,
            request_timeout_secs: parse_secs(
                "REQUEST_TIMEOUT_SECS",
                var("REQUEST_TIMEOUT_SECS"),
                30,
            )?,
            shutdown_timeout_secs: parse(
                "SHUTDOWN_TIMEOUT_SECS",
                "a whole number of seconds",
                var("SHUTDOWN_TIMEOUT_SECS"),
                30,
            )?,
            max_upload_bytes: parse(
                "MAX_UPLOAD_BYTES",
                "a byte count",
                var("MAX_UPLOAD_BYTES"),
                50 * 1024 * 1024,
            )?,
            ws_heartbeat_interval_secs: parse_secs(
                "WS_HEARTBEAT_INTERVAL_SECS",
                var("WS_HEARTBEAT_INTERVAL_SECS"),
                30,
            )?,
            database_url: var("DATABASE_URL"),
            log_format,
            conversion,
        })
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.ws_heartbeat_interval_secs)
    }
}

fn parse<T: std::str::FromStr>(
    var: &'static str,
    expected: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            var,
            expected,
            value,
        }),
    }
}

/// Intervals and timeouts must be positive; a zero tokio interval panics.
fn parse_secs(var: &'static str, raw: Option<String>, default: u64) -> Result<u64, ConfigError> {
    let secs = parse(var, "a positive number of seconds", raw.clone(), default)?;
    if secs == 0 {
        return Err(ConfigError::Invalid {
            var,
            expected: "a positive number of seconds",
            value: raw.unwrap_or_default(),
        });
    }
    Ok(secs)
}

use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::workflows::documents::CompilerConfig;
use crate::workflows::intake::{IntakeSettings, SharedFieldPolicy, DEFAULT_LANGUAGE};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub intake: IntakeConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            intake: IntakeConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Intake portal settings: access, storage locations, and outbound integrations.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub access_codes: Vec<String>,
    pub admin_pass: String,
    pub catalog_path: Option<PathBuf>,
    pub template_dir: PathBuf,
    pub output_dir: PathBuf,
    pub outbox_dir: PathBuf,
    pub submission_log: PathBuf,
    pub bug_log: PathBuf,
    pub shared_fields: SharedFieldPolicy,
    pub language: String,
    pub phraser: PhraserConfig,
    pub alert_number: Option<String>,
}

impl IntakeConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let access_codes = env::var("FORMFLUX_ACCESS_CODES")
            .map(|codes| {
                codes
                    .split(',')
                    .map(str::trim)
                    .filter(|code| !code.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let shared_fields = match non_empty("FORMFLUX_SHARED_FIELDS") {
            Some(value) => SharedFieldPolicy::parse(&value)
                .ok_or(ConfigError::InvalidSharedFieldPolicy { value })?,
            None => SharedFieldPolicy::default(),
        };

        let timeout_ms = match non_empty("FORMFLUX_PHRASER_TIMEOUT_MS") {
            Some(value) => value
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .ok_or(ConfigError::InvalidTimeout)?,
            None => 5_000,
        };

        Ok(Self {
            access_codes,
            admin_pass: non_empty("FORMFLUX_ADMIN_PASS").unwrap_or_else(|| "admin".to_string()),
            catalog_path: non_empty("FORMFLUX_CATALOG").map(PathBuf::from),
            template_dir: path_or("FORMFLUX_TEMPLATE_DIR", "templates"),
            output_dir: path_or("FORMFLUX_OUTPUT_DIR", "output"),
            outbox_dir: path_or("FORMFLUX_OUTBOX_DIR", "outbox"),
            submission_log: path_or("FORMFLUX_SUBMISSION_LOG", "submission_log.csv"),
            bug_log: path_or("FORMFLUX_BUG_LOG", "bugs.csv"),
            shared_fields,
            language: non_empty("FORMFLUX_LANGUAGE").unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            phraser: PhraserConfig {
                api_key: non_empty("OPENAI_API_KEY").filter(|key| key.starts_with("sk-")),
                timeout: Duration::from_millis(timeout_ms),
            },
            alert_number: non_empty("LAWYER_PHONE_NUMBER"),
        })
    }

    pub fn compiler_config(&self) -> CompilerConfig {
        CompilerConfig {
            template_dir: self.template_dir.clone(),
            output_dir: self.output_dir.clone(),
        }
    }

    pub fn settings(&self) -> IntakeSettings {
        IntakeSettings {
            shared_fields: self.shared_fields,
            default_language: self.language.clone(),
            alert_recipient: self.alert_number.clone(),
        }
    }
}

/// Question phrasing backend. Without a usable API key, phrasing stays offline.
#[derive(Debug, Clone)]
pub struct PhraserConfig {
    pub api_key: Option<String>,
    pub timeout: Duration,
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn path_or(key: &str, default: &str) -> PathBuf {
    non_empty(key).map_or_else(|| PathBuf::from(default), PathBuf::from)
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidTimeout,
    InvalidSharedFieldPolicy { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidTimeout => {
                write!(f, "FORMFLUX_PHRASER_TIMEOUT_MS must be a positive integer")
            }
            ConfigError::InvalidSharedFieldPolicy { value } => write!(
                f,
                "FORMFLUX_SHARED_FIELDS must be 'reuse' or 'reprompt', got '{}'",
                value
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidTimeout
            | ConfigError::InvalidSharedFieldPolicy { .. } => None,
        }
    }
}

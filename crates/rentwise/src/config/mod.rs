use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use url::Url;

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
///
/// Provider and gateway settings are required: a service that cannot build its
/// outbound redirects or checkout calls must not start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub identity: IdentityProviderConfig,
    pub gateway: GatewayConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(&optional("APP_ENV", "development"));

        let host = optional("APP_HOST", "127.0.0.1");
        let port = optional("APP_PORT", "3000")
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let telemetry = TelemetryConfig {
            log_level: optional("APP_LOG_LEVEL", "info"),
            format: LogFormat::from_str(&optional("APP_LOG_FORMAT", "compact")),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry,
            identity: IdentityProviderConfig::from_env()?,
            gateway: GatewayConfig::from_env()?,
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

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn from_str(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Compact
        }
    }
}

/// Credential that must never end up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Endpoints and client registration for the external identity provider.
#[derive(Debug, Clone)]
pub struct IdentityProviderConfig {
    pub client_id: String,
    pub client_secret: Secret,
    pub authorize_url: Url,
    pub token_url: Url,
    pub userinfo_url: Url,
    pub redirect_uri: Url,
    pub scopes: Vec<String>,
    pub acr_values: Option<String>,
    pub timeout: Duration,
}

impl IdentityProviderConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            client_id: required("IDP_CLIENT_ID")?,
            client_secret: Secret::new(required("IDP_CLIENT_SECRET")?),
            authorize_url: required_url("IDP_AUTHORIZE_URL")?,
            token_url: required_url("IDP_TOKEN_URL")?,
            userinfo_url: required_url("IDP_USERINFO_URL")?,
            redirect_uri: required_url("IDP_REDIRECT_URI")?,
            scopes: optional("IDP_SCOPES", "openid profile phone")
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            acr_values: env::var("IDP_ACR_VALUES")
                .ok()
                .filter(|value| !value.trim().is_empty()),
            timeout: timeout("IDP_TIMEOUT_SECS", 10)?,
        })
    }
}

/// Payment gateway credentials and the URLs it should call back on.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: Url,
    pub secret_key: Secret,
    pub callback_url: Url,
    pub return_url: Url,
    pub webhook_secret: Option<Secret>,
    pub currency: String,
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: required_url("GATEWAY_BASE_URL")?,
            secret_key: Secret::new(required("GATEWAY_SECRET_KEY")?),
            callback_url: required_url("GATEWAY_CALLBACK_URL")?,
            return_url: required_url("GATEWAY_RETURN_URL")?,
            webhook_secret: env::var("GATEWAY_WEBHOOK_SECRET")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .map(Secret::new),
            currency: optional("GATEWAY_CURRENCY", "ETB").to_ascii_uppercase(),
            timeout: timeout("GATEWAY_TIMEOUT_SECS", 15)?,
        })
    }
}

fn optional(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing { name }),
    }
}

fn required_url(name: &'static str) -> Result<Url, ConfigError> {
    let raw = required(name)?;
    Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl { name, source })
}

fn timeout(name: &'static str, default_secs: u64) -> Result<Duration, ConfigError> {
    let raw = optional(name, &default_secs.to_string());
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidTimeout { name }),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost {
        source: std::net::AddrParseError,
    },
    Missing {
        name: &'static str,
    },
    InvalidUrl {
        name: &'static str,
        source: url::ParseError,
    },
    InvalidTimeout {
        name: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::Missing { name } => write!(f, "{name} must be set"),
            ConfigError::InvalidUrl { name, .. } => write!(f, "{name} must be an absolute URL"),
            ConfigError::InvalidTimeout { name } => {
                write!(f, "{name} must be a positive number of seconds")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidUrl { source, .. } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::Missing { .. }
            | ConfigError::InvalidTimeout { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    const VARS: &[&str] = &[
        "APP_ENV",
        "APP_HOST",
        "APP_PORT",
        "APP_LOG_LEVEL",
        "APP_LOG_FORMAT",
        "IDP_CLIENT_ID",
        "IDP_CLIENT_SECRET",
        "IDP_AUTHORIZE_URL",
        "IDP_TOKEN_URL",
        "IDP_USERINFO_URL",
        "IDP_REDIRECT_URI",
        "IDP_SCOPES",
        "IDP_ACR_VALUES",
        "IDP_TIMEOUT_SECS",
        "GATEWAY_BASE_URL",
        "GATEWAY_SECRET_KEY",
        "GATEWAY_CALLBACK_URL",
        "GATEWAY_RETURN_URL",
        "GATEWAY_WEBHOOK_SECRET",
        "GATEWAY_CURRENCY",
        "GATEWAY_TIMEOUT_SECS",
    ];

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for name in VARS {
            env::remove_var(name);
        }
    }

    fn set_required_env() {
        env::set_var("IDP_CLIENT_ID", "rentwise");
        env::set_var("IDP_CLIENT_SECRET", "idp-secret");
        env::set_var("IDP_AUTHORIZE_URL", "https://id.example.test/authorize");
        env::set_var("IDP_TOKEN_URL", "https://id.example.test/token");
        env::set_var("IDP_USERINFO_URL", "https://id.example.test/userinfo");
        env::set_var("IDP_REDIRECT_URI", "https://rentwise.test/verify/callback");
        env::set_var("GATEWAY_BASE_URL", "https://gateway.example.test/v1");
        env::set_var("GATEWAY_SECRET_KEY", "gw-secret");
        env::set_var("GATEWAY_CALLBACK_URL", "https://rentwise.test/api/v1/payments/webhook");
        env::set_var("GATEWAY_RETURN_URL", "https://rentwise.test/payments/done");
    }

    #[test]
    fn load_uses_defaults_when_optional_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        set_required_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.telemetry.format, LogFormat::Compact);
        assert_eq!(config.identity.scopes, vec!["openid", "profile", "phone"]);
        assert_eq!(config.identity.timeout, Duration::from_secs(10));
        assert!(config.identity.acr_values.is_none());
        assert_eq!(config.gateway.currency, "ETB");
        assert_eq!(config.gateway.timeout, Duration::from_secs(15));
        assert!(config.gateway.webhook_secret.is_none());
    }

    #[test]
    fn missing_provider_settings_fail_at_startup() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        set_required_env();
        env::remove_var("IDP_TOKEN_URL");

        match AppConfig::load() {
            Err(ConfigError::Missing { name }) => assert_eq!(name, "IDP_TOKEN_URL"),
            other => panic!("expected missing variable error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_relative_urls_and_zero_timeouts() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        set_required_env();
        env::set_var("GATEWAY_BASE_URL", "/relative");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidUrl {
                name: "GATEWAY_BASE_URL",
                ..
            })
        ));

        set_required_env();
        env::set_var("IDP_TIMEOUT_SECS", "0");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidTimeout {
                name: "IDP_TIMEOUT_SECS"
            })
        ));
    }

    #[test]
    fn secrets_are_redacted_in_debug_output() {
        let secret = Secret::new("super-secret");
        assert_eq!(format!("{secret:?}"), "Secret(***)");
        assert_eq!(secret.expose(), "super-secret");
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        set_required_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }
}

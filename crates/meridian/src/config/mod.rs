use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

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
    pub payment: PaymentConfig,
    pub notify: NotifyConfig,
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

        let payment = PaymentConfig::load()?;
        let notify = NotifyConfig::load();

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            payment,
            notify,
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

/// Checkout pricing and webhook verification settings.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// Shared secret used to verify provider webhook signatures.
    pub webhook_secret: String,
    /// Annual membership fee, in minor currency units.
    pub annual_fee_cents: u32,
    pub currency: String,
    pub product_name: String,
    /// Public base URL used to build payment links and redirect targets.
    pub base_url: String,
    /// Maximum accepted age of a signed webhook timestamp, in seconds.
    pub signature_tolerance_secs: i64,
}

impl PaymentConfig {
    fn load() -> Result<Self, ConfigError> {
        let webhook_secret =
            env::var("APP_WEBHOOK_SECRET").unwrap_or_else(|_| "whsec_dev_only".to_string());

        let annual_fee_cents = env::var("APP_ANNUAL_FEE_CENTS")
            .unwrap_or_else(|_| "5900".to_string())
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidFee)?;

        let currency = env::var("APP_CURRENCY").unwrap_or_else(|_| "usd".to_string());
        let product_name = env::var("APP_PRODUCT_NAME")
            .unwrap_or_else(|_| "Meridian Annual Membership".to_string());
        let base_url =
            env::var("APP_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

        let signature_tolerance_secs = env::var("APP_SIGNATURE_TOLERANCE_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse::<i64>()
            .map_err(|_| ConfigError::InvalidTolerance)?;

        Ok(Self {
            webhook_secret,
            annual_fee_cents,
            currency,
            product_name,
            base_url,
            signature_tolerance_secs,
        })
    }

    /// Payment page URL delivered to approved applicants. Carries the
    /// application id alongside the token because the payment endpoints
    /// validate the pair, never the token alone.
    pub fn payment_url(&self, application_id: &str, token: &str) -> String {
        format!(
            "{}/payment?application_id={application_id}&token={token}",
            self.base_url
        )
    }
}

/// Outbound notification settings for the staff chat channel.
#[derive(Debug, Clone, Default)]
pub struct NotifyConfig {
    pub chat_webhook_url: Option<String>,
}

impl NotifyConfig {
    fn load() -> Self {
        Self {
            chat_webhook_url: env::var("APP_CHAT_WEBHOOK_URL").ok(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidFee,
    InvalidTolerance,
    InvalidHost { source: std::net::AddrParseError },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidFee => write!(f, "APP_ANNUAL_FEE_CENTS must be a whole number"),
            ConfigError::InvalidTolerance => {
                write!(f, "APP_SIGNATURE_TOLERANCE_SECS must be a whole number")
            }
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidFee | ConfigError::InvalidTolerance => {
                None
            }
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

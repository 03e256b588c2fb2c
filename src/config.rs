/// Configuration management for the GidiPIN auth service
use crate::error::{AuthError, AuthResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub service: HttpConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub verification: VerificationConfig,
    pub pin: PinConfig,
    pub email: Option<EmailConfig>,
    pub sms: Option<SmsConfig>,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub auth_db: PathBuf,
}

/// Token lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Access token lifetime in seconds (default 1 hour)
    pub access_token_ttl_secs: u64,
    /// Refresh token lifetime in seconds (default 30 days)
    pub refresh_token_ttl_secs: u64,
    /// Rotation policy selector: "never", "every_nth:<n>", "max_age:<secs>"
    pub rotation_policy: String,
}

/// Verification code configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Minimum seconds between issuances for one identifier (default 60)
    pub cooldown_secs: u64,
    /// Code validity in seconds (default 15 minutes)
    pub code_ttl_secs: u64,
    /// Days a spent/expired code row is retained before the sweep (default 7)
    pub retention_days: u64,
}

/// PIN lockout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinConfig {
    /// Failed attempts before lockout (default 5)
    pub max_failed_attempts: u32,
    /// Lockout window in seconds (default 30 minutes)
    pub lockout_secs: u64,
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_url: String,
    pub from_address: String,
}

/// SMS gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsConfig {
    pub gateway_url: String,
    pub api_key: String,
    pub sender_id: String,
}

/// Global request rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_second: u32,
    pub burst_size: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl ServiceConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AuthResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("GIDIPIN_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("GIDIPIN_PORT")
            .unwrap_or_else(|_| "8350".to_string())
            .parse()
            .map_err(|_| AuthError::Validation("Invalid port number".to_string()))?;
        let version = env::var("GIDIPIN_VERSION").unwrap_or_else(|_| "0.1.0".to_string());

        let data_directory: PathBuf = env::var("GIDIPIN_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let auth_db = env::var("GIDIPIN_AUTH_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("auth.sqlite"));

        let jwt_secret = env::var("GIDIPIN_JWT_SECRET")
            .map_err(|_| AuthError::Validation("JWT secret required".to_string()))?;
        let access_token_ttl_secs = env::var("GIDIPIN_ACCESS_TOKEN_TTL_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .unwrap_or(3600);
        let refresh_token_ttl_secs = env::var("GIDIPIN_REFRESH_TOKEN_TTL_SECS")
            .unwrap_or_else(|_| "2592000".to_string())
            .parse()
            .unwrap_or(2_592_000);
        let rotation_policy = env::var("GIDIPIN_ROTATION_POLICY")
            .unwrap_or_else(|_| "every_nth:10".to_string());

        let cooldown_secs = env::var("GIDIPIN_CODE_COOLDOWN_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .unwrap_or(60);
        let code_ttl_secs = env::var("GIDIPIN_CODE_TTL_SECS")
            .unwrap_or_else(|_| "900".to_string())
            .parse()
            .unwrap_or(900);
        let retention_days = env::var("GIDIPIN_CODE_RETENTION_DAYS")
            .unwrap_or_else(|_| "7".to_string())
            .parse()
            .unwrap_or(7);

        let max_failed_attempts = env::var("GIDIPIN_PIN_MAX_FAILED_ATTEMPTS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .unwrap_or(5);
        let lockout_secs = env::var("GIDIPIN_PIN_LOCKOUT_SECS")
            .unwrap_or_else(|_| "1800".to_string())
            .parse()
            .unwrap_or(1800);

        let email = if let Ok(smtp_url) = env::var("GIDIPIN_EMAIL_SMTP_URL") {
            Some(EmailConfig {
                smtp_url,
                from_address: env::var("GIDIPIN_EMAIL_FROM_ADDRESS")
                    .unwrap_or_else(|_| format!("noreply@{}", hostname)),
            })
        } else {
            None
        };

        let sms = if let Ok(gateway_url) = env::var("GIDIPIN_SMS_GATEWAY_URL") {
            Some(SmsConfig {
                gateway_url,
                api_key: env::var("GIDIPIN_SMS_API_KEY")
                    .map_err(|_| AuthError::Validation("SMS API key required".to_string()))?,
                sender_id: env::var("GIDIPIN_SMS_SENDER_ID")
                    .unwrap_or_else(|_| "GidiPIN".to_string()),
            })
        } else {
            None
        };

        let rate_limit_enabled = env::var("GIDIPIN_RATE_LIMITS_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);
        let requests_per_second = env::var("GIDIPIN_RATE_LIMIT_RPS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);
        let burst_size = env::var("GIDIPIN_RATE_LIMIT_BURST")
            .unwrap_or_else(|_| "50".to_string())
            .parse()
            .unwrap_or(50);

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(ServiceConfig {
            service: HttpConfig {
                hostname,
                port,
                version,
            },
            storage: StorageConfig {
                data_directory,
                auth_db,
            },
            auth: AuthConfig {
                jwt_secret,
                access_token_ttl_secs,
                refresh_token_ttl_secs,
                rotation_policy,
            },
            verification: VerificationConfig {
                cooldown_secs,
                code_ttl_secs,
                retention_days,
            },
            pin: PinConfig {
                max_failed_attempts,
                lockout_secs,
            },
            email,
            sms,
            rate_limit: RateLimitConfig {
                enabled: rate_limit_enabled,
                requests_per_second,
                burst_size,
            },
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> AuthResult<()> {
        if self.service.hostname.is_empty() {
            return Err(AuthError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.auth.jwt_secret.len() < 32 {
            return Err(AuthError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.auth.access_token_ttl_secs >= self.auth.refresh_token_ttl_secs {
            return Err(AuthError::Validation(
                "Access token lifetime must be shorter than refresh token lifetime".to_string(),
            ));
        }

        if self.pin.max_failed_attempts == 0 {
            return Err(AuthError::Validation(
                "PIN attempt threshold must be at least 1".to_string(),
            ));
        }

        crate::token::RotationPolicy::parse(&self.auth.rotation_policy)?;

        Ok(())
    }
}

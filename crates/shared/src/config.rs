//! Application configuration management.
//!
//! No configuration value changes computation semantics; everything here
//! concerns the storage connection and the external collaborators
//! (authentication, OTP delivery, email).

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// JWT configuration for the authentication collaborator.
    pub jwt: Option<JwtConfig>,
    /// OTP issuance configuration.
    #[serde(default)]
    pub otp: OtpConfig,
    /// SMTP configuration for the email collaborator.
    pub email: Option<EmailConfig>,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// JWT configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// Secret key for signing tokens.
    pub secret: String,
    /// Access token expiration in seconds.
    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry_secs: u64,
}

fn default_access_token_expiry() -> u64 {
    900 // 15 minutes
}

/// OTP issuance configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OtpConfig {
    /// Minutes before an issued code expires.
    #[serde(default = "default_otp_expiration_minutes")]
    pub expiration_minutes: u32,
    /// Maximum verification attempts per code.
    #[serde(default = "default_otp_max_attempts")]
    pub max_attempts: u32,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            expiration_minutes: default_otp_expiration_minutes(),
            max_attempts: default_otp_max_attempts(),
        }
    }
}

fn default_otp_expiration_minutes() -> u32 {
    5
}

fn default_otp_max_attempts() -> u32 {
    3
}

/// SMTP configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// SMTP host.
    pub smtp_host: String,
    /// SMTP port.
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// SMTP username.
    pub smtp_user: String,
    /// SMTP password.
    pub smtp_password: String,
    /// Sender address.
    pub from_address: String,
}

fn default_smtp_port() -> u16 {
    587
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// A plain `DATABASE_URL` variable overrides the layered
    /// `database.url` value so the bins keep working in minimal
    /// environments.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("SALYQ").separator("__"))
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otp_defaults() {
        let otp = OtpConfig::default();
        assert_eq!(otp.expiration_minutes, 5);
        assert_eq!(otp.max_attempts, 3);
    }

    #[test]
    fn test_database_defaults_applied() {
        let json = serde_json::json!({ "url": "sqlite::memory:" });
        let db: DatabaseConfig = serde_json::from_value(json).unwrap();
        assert_eq!(db.max_connections, 10);
        assert_eq!(db.min_connections, 1);
    }
}

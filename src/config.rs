use crate::notification::delivery::SmtpConfig;
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://example.com";
const DEFAULT_SMTP_PORT: u16 = 465;
const DEFAULT_CALL_TIMEOUT_SECS: u64 = 10;
const DEFAULT_PORT: u16 = 9500;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Application configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub base_url: String,
    pub cron_secret: Option<String>,
    /// Lower-cased editor emails
    pub reviewer_emails: Vec<String>,
    pub smtp: SmtpConfig,
    pub call_timeout: Duration,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&std::env::vars().collect())
    }

    fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            vars.get(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let reviewer_emails = get("REVIEWER_EMAILS")
            .or_else(|| get("NEXT_PUBLIC_REVIEWER_EMAILS"))
            .map(|raw| parse_reviewer_emails(&raw))
            .unwrap_or_default();

        let smtp_user = get("SMTP_USER");
        let smtp_port = match get("SMTP_PORT") {
            Some(value) => parse_number("SMTP_PORT", &value)?,
            None => DEFAULT_SMTP_PORT,
        };
        let use_tls = match get("SMTP_TLS") {
            Some(value) => parse_flag("SMTP_TLS", &value)?,
            None => true,
        };
        let smtp = SmtpConfig {
            host: get("SMTP_HOST").unwrap_or_else(|| "localhost".to_string()),
            port: smtp_port,
            from: get("SMTP_FROM")
                .or_else(|| smtp_user.clone())
                .ok_or(ConfigError::Missing("SMTP_FROM"))?,
            username: smtp_user,
            password: get("SMTP_PASS"),
            use_tls,
        };

        let call_timeout = match get("NOTIFICATION_CALL_TIMEOUT_SECS") {
            Some(value) => parse_number("NOTIFICATION_CALL_TIMEOUT_SECS", &value)?,
            None => DEFAULT_CALL_TIMEOUT_SECS,
        };

        let port = match get("PORT") {
            Some(value) => parse_number("PORT", &value)?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            database_url,
            redis_url: get("REDIS_URL"),
            base_url: get("APP_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            cron_secret: get("NOTIFICATION_CRON_SECRET"),
            reviewer_emails,
            smtp,
            call_timeout: Duration::from_secs(call_timeout),
            port,
        })
    }
}

fn parse_reviewer_emails(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|email| email.trim().to_lowercase())
        .filter(|email| !email.is_empty())
        .collect()
}

fn parse_number<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        name,
        value: value.to_string(),
    })
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        }),
    }
}

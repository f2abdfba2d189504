use crate::error::{Error, Result};
use crate::utils::time::deadline_after;
use chrono::Utc;
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub webhook_secret: String,
    pub notification_webhook_url: Option<String>,
    pub assessment_duration_seconds: i64,
    pub expiry_sweep_schedule: String,
    pub log_json: bool,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let assessment_duration_seconds: i64 = get_env_parse_or("ASSESSMENT_DURATION_SECONDS", 1800)?;
        if assessment_duration_seconds <= 0 {
            return Err(Error::Config(
                "ASSESSMENT_DURATION_SECONDS must be positive".to_string(),
            ));
        }
        if deadline_after(Utc::now(), assessment_duration_seconds).is_none() {
            return Err(Error::Config(format!(
                "ASSESSMENT_DURATION_SECONDS {} is too large",
                assessment_duration_seconds
            )));
        }

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: get_env("DATABASE_URL")?,
            database_max_connections: get_env_parse_or("DATABASE_MAX_CONNECTIONS", 20)?,
            jwt_secret: get_env("JWT_SECRET")?,
            webhook_secret: env::var("WEBHOOK_SECRET").unwrap_or_default(),
            notification_webhook_url: env::var("NOTIFICATION_WEBHOOK_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            assessment_duration_seconds,
            expiry_sweep_schedule: env::var("EXPIRY_SWEEP_SCHEDULE")
                .unwrap_or_else(|_| "0 * * * * *".to_string()),
            log_json: env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        })
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> Result<&'static Config> {
    CONFIG
        .get()
        .ok_or_else(|| Error::Config("Configuration has not been initialized".to_string()))
}

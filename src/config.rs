use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use thiserror::Error;
use tracing::info;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";
pub const DEFAULT_BCRYPT_COST: u32 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    pub database_url: String,
    pub cors_origin: String,
    /// Stand-in for the signed-in organizer until real sessions exist.
    pub mock_organizer_id: i64,
    /// Stand-in for the shopper that owns the cart.
    pub mock_user_id: i64,
    pub bcrypt_cost: u32,
}

impl Config {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if dotenvy::dotenv().is_ok() {
            info!(target: "linkup", event = "dotenv_loaded");
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            port: parse_or(&lookup, "PORT", DEFAULT_PORT)?,
            database_url: lookup("DATABASE_URL").unwrap_or_else(default_database_url),
            cors_origin: lookup("CORS_ORIGIN").unwrap_or_else(|| DEFAULT_CORS_ORIGIN.to_string()),
            mock_organizer_id: positive_id(&lookup, "LINKUP_MOCK_ORGANIZER_ID")?,
            mock_user_id: positive_id(&lookup, "LINKUP_MOCK_USER_ID")?,
            bcrypt_cost: parse_or(&lookup, "LINKUP_BCRYPT_COST", DEFAULT_BCRYPT_COST)?,
        };

        if !(4..=31).contains(&config.bcrypt_cost) {
            return Err(ConfigError::Invalid {
                key: "LINKUP_BCRYPT_COST",
                value: config.bcrypt_cost.to_string(),
                reason: "bcrypt cost must be between 4 and 31".into(),
            });
        }

        Ok(config)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => {
            info!(target: "linkup", event = "config_default", key, default = %default);
            Ok(default)
        }
    }
}

fn positive_id<F>(lookup: &F, key: &'static str) -> Result<i64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let id: i64 = parse_or(lookup, key, 1)?;
    if id <= 0 {
        return Err(ConfigError::Invalid {
            key,
            value: id.to_string(),
            reason: "ids must be positive".into(),
        });
    }
    Ok(id)
}

fn default_database_url() -> String {
    let base = dirs::data_dir()
        .or_else(|| env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    let path = base.join("linkup").join("linkup.sqlite3");
    format!("sqlite://{}", path.display())
}

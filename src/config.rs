//! Service configuration read from `RAMPART_*` environment variables.

use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

const PREFIX: &str = "RAMPART_";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_host: SocketAddr,
    pub debug_host: SocketAddr,
    pub shutdown_timeout: Duration,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Key id new tokens are signed with.
    pub active_kid: String,
    pub issuer: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing)
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let api_host = parse(vars, "API_HOST", "0.0.0.0:3000")?;
        let debug_host = parse(vars, "DEBUG_HOST", "0.0.0.0:4000")?;
        let shutdown_timeout = Duration::from_secs(parse(vars, "SHUTDOWN_TIMEOUT_SECS", "20")?);

        let active_kid = lookup(vars, "AUTH_ACTIVE_KID")
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(format!("{PREFIX}AUTH_ACTIVE_KID")))?
            .to_owned();
        let issuer = lookup(vars, "AUTH_ISSUER").unwrap_or("rampart").to_owned();

        Ok(Config {
            api_host,
            debug_host,
            shutdown_timeout,
            auth: AuthConfig { active_kid, issuer },
        })
    }
}

fn lookup<'a>(vars: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    vars.get(&format!("{PREFIX}{name}")).map(String::as_str)
}

fn parse<T>(vars: &HashMap<String, String>, name: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(vars, name)
        .unwrap_or(default)
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            name: format!("{PREFIX}{name}"),
            reason: e.to_string(),
        })
}

use dotenv::dotenv;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::constants::{
    DEFAULT_AI_COPY_MODEL, DEFAULT_AI_IMAGE_MODEL, DEFAULT_BIND_ADDR, DEFAULT_JWT_TTL_SECS,
    DEFAULT_UPSTREAM_TIMEOUT_SECS, FACEBOOK_BASE_URL, FACEBOOK_OAUTH_BASE_URL, OPENAI_BASE_URL,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub frontend_url: Option<String>,
    pub log_json: bool,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub meta: MetaConfig,
    pub ai: AiConfig,
    pub upstream_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub ssl: bool,
    pub accept_invalid_certs: bool,
}

#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub ttl_secs: i64,
}

#[derive(Clone)]
pub struct MetaConfig {
    pub app_id: String,
    pub app_secret: String,
    pub graph_url: String,
    pub oauth_url: String,
}

#[derive(Clone)]
pub struct AiConfig {
    pub api_key: String,
    pub base_url: String,
    pub copy_model: String,
    pub image_model: String,
}

// Secrets stay out of log output.
impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

impl std::fmt::Debug for MetaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaConfig")
            .field("app_id", &self.app_id)
            .field("app_secret", &"<redacted>")
            .field("graph_url", &self.graph_url)
            .field("oauth_url", &self.oauth_url)
            .finish()
    }
}

impl std::fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("copy_model", &self.copy_model)
            .field("image_model", &self.image_model)
            .finish()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable not found: {0}")]
    MissingEnv(String),
    #[error("Invalid database URL: {0}")]
    InvalidDatabaseUrl(String),
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url = required("DATABASE_URL")?;

        // Validate the URL format
        Url::parse(&database_url).map_err(|e| ConfigError::InvalidDatabaseUrl(e.to_string()))?;

        let bind_addr = optional("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| invalid("BIND_ADDR", e))?;

        let frontend_url = optional("FRONTEND_URL");
        if let Some(origin) = &frontend_url {
            Url::parse(origin).map_err(|e| invalid("FRONTEND_URL", e))?;
        }

        let graph_url = url_or_default("META_GRAPH_URL", FACEBOOK_BASE_URL)?;
        let oauth_url = url_or_default("META_OAUTH_URL", FACEBOOK_OAUTH_BASE_URL)?;
        let openai_url = url_or_default("OPENAI_BASE_URL", OPENAI_BASE_URL)?;

        Ok(Self {
            bind_addr,
            frontend_url,
            log_json: flag("LOG_JSON", false)?,
            database: DatabaseConfig {
                url: database_url,
                ssl: flag("DATABASE_SSL", true)?,
                accept_invalid_certs: flag("DATABASE_SSL_ACCEPT_INVALID_CERTS", false)?,
            },
            jwt: JwtConfig {
                secret: required("JWT_SECRET")?,
                ttl_secs: number("JWT_TTL_SECS", DEFAULT_JWT_TTL_SECS)?,
            },
            meta: MetaConfig {
                app_id: required("META_APP_ID")?,
                app_secret: required("META_APP_SECRET")?,
                graph_url,
                oauth_url,
            },
            ai: AiConfig {
                api_key: required("OPENAI_API_KEY")?,
                base_url: openai_url,
                copy_model: optional("AI_COPY_MODEL")
                    .unwrap_or_else(|| DEFAULT_AI_COPY_MODEL.to_string()),
                image_model: optional("AI_IMAGE_MODEL")
                    .unwrap_or_else(|| DEFAULT_AI_IMAGE_MODEL.to_string()),
            },
            upstream_timeout: Duration::from_secs(number(
                "UPSTREAM_TIMEOUT_SECS",
                DEFAULT_UPSTREAM_TIMEOUT_SECS,
            )?),
        })
    }
}

fn required(name: &str) -> Result<String, ConfigError> {
    optional(name).ok_or_else(|| ConfigError::MissingEnv(name.to_string()))
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn invalid(name: &str, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

fn url_or_default(name: &str, default: &str) -> Result<String, ConfigError> {
    let value = optional(name).unwrap_or_else(|| default.to_string());
    Url::parse(&value).map_err(|e| invalid(name, e))?;
    Ok(value.trim_end_matches('/').to_string())
}

fn flag(name: &str, default: bool) -> Result<bool, ConfigError> {
    match optional(name) {
        None => Ok(default),
        Some(v) => parse_flag(&v).ok_or_else(|| invalid(name, format!("expected a boolean, got {v:?}"))),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn number<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match optional(name) {
        None => Ok(default),
        Some(v) => v.trim().parse::<T>().map_err(|e| invalid(name, e)),
    }
}

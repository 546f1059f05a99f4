use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CookieConfig {
    pub secure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub url_prefix: String,
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub app_url: String,
    pub jwt: JwtConfig,
    pub cookie: CookieConfig,
    pub uploads: UploadConfig,
    /// `None` means replies are logged instead of sent.
    pub smtp: Option<SmtpConfig>,
}

pub const SESSION_COOKIE: &str = "auth-token";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "portfolio".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "portfolio-admin".into()),
            ttl_minutes: env_parse("JWT_TTL_MINUTES").unwrap_or(60 * 24 * 7),
        };
        let cookie = CookieConfig {
            secure: env_parse("COOKIE_SECURE").unwrap_or(false),
        };
        let uploads = UploadConfig {
            dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("public/uploads")),
            url_prefix: std::env::var("UPLOAD_URL_PREFIX")
                .map(|p| p.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "/uploads".into()),
            max_bytes: env_parse("UPLOAD_MAX_BYTES").unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
        };
        let smtp = match std::env::var("SMTP_HOST") {
            Ok(host) if !host.is_empty() => Some(SmtpConfig {
                host,
                port: env_parse("SMTP_PORT").unwrap_or(587),
                username: std::env::var("SMTP_USERNAME").unwrap_or_default(),
                password: std::env::var("SMTP_PASSWORD").unwrap_or_default(),
                from: std::env::var("SMTP_FROM").context("SMTP_FROM is required with SMTP_HOST")?,
            }),
            _ => None,
        };
        Ok(Self {
            database_url,
            app_url: std::env::var("APP_URL").unwrap_or_else(|_| "http://localhost:8080".into()),
            jwt,
            cookie,
            uploads,
            smtp,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

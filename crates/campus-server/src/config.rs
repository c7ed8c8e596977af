use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

/// Placeholder JWT secrets that must not reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

/// Runtime settings, read from `CAMPUS_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub storage_dir: PathBuf,
    pub jwt_secret: String,
    pub session_ttl_hours: i64,
    /// 0 disables reset token expiry.
    pub reset_token_ttl_minutes: i64,
    pub app_url: String,
    pub meeting_domain: String,
    pub meeting_room: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = var("CAMPUS_JWT_SECRET", "dev-secret-change-me");
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            warn!("CAMPUS_JWT_SECRET is unset or still a placeholder; sessions are forgeable");
        }

        let port = var("CAMPUS_PORT", "3000").parse().context("CAMPUS_PORT must be a port number")?;
        let session_ttl_hours: i64 = var("CAMPUS_SESSION_TTL_HOURS", "720")
            .parse()
            .context("CAMPUS_SESSION_TTL_HOURS must be an integer")?;
        if session_ttl_hours <= 0 {
            anyhow::bail!("CAMPUS_SESSION_TTL_HOURS must be positive");
        }
        let reset_token_ttl_minutes: i64 = var("CAMPUS_RESET_TOKEN_TTL_MINUTES", "60")
            .parse()
            .context("CAMPUS_RESET_TOKEN_TTL_MINUTES must be an integer")?;
        if reset_token_ttl_minutes < 0 {
            anyhow::bail!("CAMPUS_RESET_TOKEN_TTL_MINUTES must not be negative");
        }

        Ok(Self {
            host: var("CAMPUS_HOST", "0.0.0.0"),
            port,
            db_path: var("CAMPUS_DB_PATH", "campus.db").into(),
            storage_dir: var("CAMPUS_STORAGE_DIR", "./storage").into(),
            jwt_secret,
            session_ttl_hours,
            reset_token_ttl_minutes,
            app_url: var("CAMPUS_APP_URL", "http://localhost:3000"),
            meeting_domain: var("CAMPUS_MEETING_DOMAIN", "meet.jit.si"),
            meeting_room: var("CAMPUS_MEETING_ROOM", "campus-lounge"),
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours)
    }

    pub fn reset_token_ttl(&self) -> Option<chrono::Duration> {
        (self.reset_token_ttl_minutes > 0).then(|| chrono::Duration::minutes(self.reset_token_ttl_minutes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.db_path, PathBuf::from("campus.db"));
        assert_eq!(cfg.session_ttl(), chrono::Duration::hours(720));
        assert_eq!(cfg.reset_token_ttl(), Some(chrono::Duration::minutes(60)));
        assert_eq!(cfg.addr().unwrap().to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn zero_ttl_disables_reset_expiry() {
        let cfg = config(&[("CAMPUS_RESET_TOKEN_TTL_MINUTES", "0")]).unwrap();
        assert_eq!(cfg.reset_token_ttl(), None);
    }

    #[test]
    fn rejects_bad_numbers() {
        assert!(config(&[("CAMPUS_PORT", "http")]).is_err());
        assert!(config(&[("CAMPUS_SESSION_TTL_HOURS", "0")]).is_err());
        assert!(config(&[("CAMPUS_RESET_TOKEN_TTL_MINUTES", "-5")]).is_err());
    }
}

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

const DEFAULT_STORAGE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_SERVER_PORT: u16 = 3000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub enforce_working_hours: bool,
    pub storage_timeout_ms: u64,
    pub notification_webhook_url: Option<String>,
    pub server_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
            enforce_working_hours: true,
            storage_timeout_ms: DEFAULT_STORAGE_TIMEOUT_MS,
            notification_webhook_url: None,
            server_port: DEFAULT_SERVER_PORT,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            enforce_working_hours: parse_var("SCHEDULING_ENFORCE_WORKING_HOURS", true),
            storage_timeout_ms: parse_var("STORAGE_TIMEOUT_MS", DEFAULT_STORAGE_TIMEOUT_MS),
            notification_webhook_url: env::var("NOTIFICATION_WEBHOOK_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            server_port: parse_var("SERVER_PORT", DEFAULT_SERVER_PORT),
        };

        if !config.is_configured() {
            warn!("Supabase not fully configured - missing environment variables");
        }

        config
    }

    /// True when the PostgREST backend can be used for persistence.
    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
    }

    pub fn is_auth_configured(&self) -> bool {
        !self.supabase_jwt_secret.is_empty()
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }
}

fn parse_var<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value '{}', using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_enforces_working_hours() {
        let config = AppConfig::default();
        assert!(config.enforce_working_hours);
        assert_eq!(config.storage_timeout(), Duration::from_millis(5_000));
        assert!(!config.is_configured());
    }

    #[test]
    fn configured_once_url_and_key_present() {
        let config = AppConfig {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "anon".to_string(),
            ..AppConfig::default()
        };
        assert!(config.is_configured());
        assert!(!config.is_auth_configured());
    }
}

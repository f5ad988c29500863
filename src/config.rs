use std::env;
use std::net::SocketAddr;

use crate::error::AppError;
use crate::supabase::SupabaseConfig;

const DEFAULT_SITE_URL: &str = "http://127.0.0.1:3000";
const DEFAULT_BIND: &str = "127.0.0.1:3000";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub supabase: SupabaseConfig,
    /// Public origin of this server, used to build the OAuth return url.
    pub site_url: String,
    pub bind_addr: SocketAddr,
}

impl AppConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let supabase = SupabaseConfig::from_lookup(&lookup)?;

        let site_url = lookup("TASKIFY_SITE_URL")
            .unwrap_or_else(|| DEFAULT_SITE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let bind = lookup("TASKIFY_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind_addr = bind
            .parse()
            .map_err(|e| AppError::Config(format!("TASKIFY_BIND {} is invalid: {}", bind, e)))?;

        Ok(Self {
            supabase,
            site_url,
            bind_addr,
        })
    }

    pub fn callback_url(&self) -> String {
        format!("{}/auth/callback", self.site_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(key: &str) -> Option<String> {
        match key {
            "SUPABASE_URL" => Some("https://abc.supabase.co".to_string()),
            "SUPABASE_ANON_KEY" => Some("anon".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup).expect("Failed to build config");
        assert_eq!(config.site_url, DEFAULT_SITE_URL);
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.callback_url(), "http://127.0.0.1:3000/auth/callback");
    }

    #[test]
    fn test_invalid_bind_address() {
        let result = AppConfig::from_lookup(|key| match key {
            "TASKIFY_BIND" => Some("not-an-address".to_string()),
            other => lookup(other),
        });
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}

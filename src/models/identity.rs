use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// The signed-in end user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// Provider token state backing an [`Identity`].
#[derive(Clone)]
pub struct Session {
    pub identity: Identity,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OAuthProvider {
    #[default]
    Google,
}

impl OAuthProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
        }
    }
}

impl FromStr for OAuthProvider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(OAuthProvider::Google),
            other => Err(AppError::validation(format!("Unsupported sign-in provider: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn session(expires_at: Option<DateTime<Utc>>) -> Session {
        Session {
            identity: Identity { id: Uuid::new_v4(), email: None },
            access_token: "secret-access".to_string(),
            refresh_token: Some("secret-refresh".to_string()),
            expires_at,
        }
    }

    #[test]
    fn test_session_expiry() {
        let now = Utc::now();
        assert!(!session(None).is_expired(now));
        assert!(!session(Some(now + Duration::minutes(5))).is_expired(now));
        assert!(session(Some(now - Duration::seconds(1))).is_expired(now));
    }

    #[test]
    fn test_session_debug_hides_tokens() {
        let printed = format!("{:?}", session(None));
        assert!(!printed.contains("secret-access"));
        assert!(!printed.contains("secret-refresh"));
    }

    #[test]
    fn test_parse_provider() {
        assert_eq!("Google".parse::<OAuthProvider>().ok(), Some(OAuthProvider::Google));
        assert!("myspace".parse::<OAuthProvider>().is_err());
    }
}

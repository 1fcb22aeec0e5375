//! Injected OAuth credential
//!
//! The token is obtained by an external authorization tool and stored as
//! JSON in the remote's configuration. It is parsed once, handed to the
//! REST binding at construction and reused for every request. Nothing here
//! refreshes it.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::ProviderError;

/// Token blob as written by OAuth tooling (`access_token`, `token_type`,
/// `refresh_token`, `expiry`); only the access token and expiry are used
#[derive(Debug, Deserialize)]
struct StoredToken {
    access_token: String,
    #[serde(default)]
    expiry: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct Token {
    access_token: SecretString,
    expiry: Option<DateTime<Utc>>,
}

impl Token {
    /// Wrap a bare access token
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            expiry: None,
        }
    }

    /// Parse a stored token blob
    pub fn from_json(json: &str) -> Result<Self, ProviderError> {
        let stored: StoredToken = serde_json::from_str(json)
            .map_err(|e| ProviderError::InvalidConfig(format!("Malformed token: {}", e)))?;
        if stored.access_token.trim().is_empty() {
            return Err(ProviderError::InvalidConfig("Token has an empty access_token".to_string()));
        }
        // Zero-valued expiry timestamps mean "no expiry"
        let expiry = stored.expiry.filter(|t| t.timestamp() > 0);
        Ok(Self {
            access_token: SecretString::from(stored.access_token),
            expiry,
        })
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|t| t <= now)
    }

    /// Value of the `Authorization` header.
    ///
    /// The disk API only accepts the `OAuth` scheme regardless of the
    /// `token_type` the authorization server reported.
    pub fn authorization(&self) -> String {
        format!("OAuth {}", self.access_token.expose_secret())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_from_json_full() {
        let json = r#"{"access_token":"AQAAAA","token_type":"bearer","refresh_token":"r","expiry":"2030-01-02T03:04:05+03:00"}"#;
        let token = Token::from_json(json).unwrap();
        assert_eq!(token.authorization(), "OAuth AQAAAA");
        let expiry = Utc.with_ymd_and_hms(2030, 1, 2, 0, 4, 5).unwrap();
        assert_eq!(token.expiry(), Some(expiry));
        assert!(!token.is_expired(Utc.with_ymd_and_hms(2029, 1, 1, 0, 0, 0).unwrap()));
        assert!(token.is_expired(Utc.with_ymd_and_hms(2031, 1, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_zero_expiry_means_none() {
        let json = r#"{"access_token":"abc","expiry":"0001-01-01T00:00:00Z"}"#;
        let token = Token::from_json(json).unwrap();
        assert_eq!(token.expiry(), None);
        assert!(!token.is_expired(Utc::now()));
    }

    #[test]
    fn test_rejects_bad_tokens() {
        assert!(matches!(Token::from_json("not json"), Err(ProviderError::InvalidConfig(_))));
        assert!(matches!(
            Token::from_json(r#"{"access_token":"  "}"#),
            Err(ProviderError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_debug_hides_secret() {
        let token = Token::new("very-secret");
        assert!(!format!("{:?}", token).contains("very-secret"));
    }
}

//! Provider configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! [provider]
//! issuer = "https://id.example.com"
//! access_token_lifetime = "15m"
//!
//! [provider.signing]
//! algorithm = "ES384"
//! rotation_interval = "7d"
//!
//! [[provider.clients]]
//! client_id = "foo"
//! client_secret = "bar"
//! redirect_uris = ["http://localhost:8080/cb"]
//! ```

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::token::jwt::SigningAlgorithm;
use crate::types::ClientRegistration;
use crate::user::UserSeed;

/// Upper bound for lifetimes and intervals; keeps expiry timestamps in range.
const MAX_LIFETIME: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Root provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Issuer identifier, the `iss` of every token and the discovery base.
    pub issuer: String,

    /// Authorization code lifetime.
    #[serde(with = "humantime_serde")]
    pub authorization_code_lifetime: Duration,

    /// Access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Refresh token lifetime.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,

    /// ID token lifetime.
    #[serde(with = "humantime_serde")]
    pub id_token_lifetime: Duration,

    /// How long a pending login/consent flow stays usable.
    #[serde(with = "humantime_serde")]
    pub authorization_flow_lifetime: Duration,

    /// Browser login session lifetime.
    #[serde(with = "humantime_serde")]
    pub login_session_lifetime: Duration,

    /// Issue a new refresh token on every refresh and invalidate the old one.
    pub refresh_token_rotation: bool,

    /// Token signing.
    pub signing: SigningConfig,

    /// Interval of the expired-entry sweep.
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,

    /// Scopes clients may request.
    pub scopes_supported: Vec<String>,

    /// Clients registered at startup.
    pub clients: Vec<ClientRegistration>,

    /// End users of the built-in directory.
    pub users: Vec<UserSeed>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:3000".to_string(),
            authorization_code_lifetime: Duration::from_secs(60),
            access_token_lifetime: Duration::from_secs(3600),
            refresh_token_lifetime: Duration::from_secs(30 * 24 * 3600),
            id_token_lifetime: Duration::from_secs(3600),
            authorization_flow_lifetime: Duration::from_secs(600),
            login_session_lifetime: Duration::from_secs(8 * 3600),
            refresh_token_rotation: true,
            signing: SigningConfig::default(),
            cleanup_interval: Duration::from_secs(300),
            scopes_supported: ["openid", "profile", "email", "offline_access"]
                .into_iter()
                .map(String::from)
                .collect(),
            clients: vec![ClientRegistration::confidential(
                "foo",
                "bar",
                vec!["http://localhost:8080/cb".to_string()],
            )],
            users: Vec::new(),
        }
    }
}

/// Token signing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Algorithm of every signing key.
    pub algorithm: SigningAlgorithm,

    /// Automatic key rotation. Disabled when unset.
    #[serde(default, with = "humantime_serde")]
    pub rotation_interval: Option<Duration>,

    /// PKCS#8 PEM private key to use as the initial key. A key is generated
    /// when unset.
    pub key_file: Option<PathBuf>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            algorithm: SigningAlgorithm::RS256,
            rotation_interval: None,
            key_file: None,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl From<ConfigError> for AuthError {
    fn from(err: ConfigError) -> Self {
        AuthError::configuration(err.to_string())
    }
}

impl ProviderConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The issuer is not an absolute http(s) URL without query or fragment
    /// - A lifetime or interval is zero or longer than 100 years
    /// - `scopes_supported` lacks `openid`
    /// - A client registration is invalid or a `client_id` repeats
    /// - A username repeats
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::Missing("issuer".to_string()));
        }
        let issuer = url::Url::parse(&self.issuer)
            .map_err(|e| ConfigError::InvalidValue(format!("issuer '{}': {e}", self.issuer)))?;
        if !matches!(issuer.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue(format!(
                "issuer '{}' must use http or https",
                self.issuer
            )));
        }
        if issuer.query().is_some() || issuer.fragment().is_some() {
            return Err(ConfigError::InvalidValue(format!(
                "issuer '{}' must not have a query or fragment",
                self.issuer
            )));
        }

        let durations = [
            ("authorization_code_lifetime", self.authorization_code_lifetime),
            ("access_token_lifetime", self.access_token_lifetime),
            ("refresh_token_lifetime", self.refresh_token_lifetime),
            ("id_token_lifetime", self.id_token_lifetime),
            ("authorization_flow_lifetime", self.authorization_flow_lifetime),
            ("login_session_lifetime", self.login_session_lifetime),
            ("cleanup_interval", self.cleanup_interval),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue(format!("{name} must be > 0")));
            }
            if value > MAX_LIFETIME {
                return Err(ConfigError::InvalidValue(format!(
                    "{name} must not exceed 100 years"
                )));
            }
        }
        if let Some(interval) = self.signing.rotation_interval {
            if interval.is_zero() || interval > MAX_LIFETIME {
                return Err(ConfigError::InvalidValue(
                    "signing.rotation_interval must be > 0 and at most 100 years".to_string(),
                ));
            }
        }

        if !self.scopes_supported.iter().any(|s| s == "openid") {
            return Err(ConfigError::InvalidValue(
                "scopes_supported must include 'openid'".to_string(),
            ));
        }

        let mut client_ids = HashSet::new();
        for registration in &self.clients {
            if !client_ids.insert(registration.client_id.as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "duplicate client '{}'",
                    registration.client_id
                )));
            }
            registration
                .clone()
                .into_client()
                .map_err(|e| ConfigError::InvalidValue(format!("client '{}': {e}", registration.client_id)))?;
        }

        let mut usernames = HashSet::new();
        for user in &self.users {
            if !usernames.insert(user.username.as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "duplicate user '{}'",
                    user.username
                )));
            }
        }

        Ok(())
    }

    /// Issuer without a trailing slash, for building endpoint URLs.
    #[must_use]
    pub fn issuer_base(&self) -> &str {
        self.issuer.trim_end_matches('/')
    }

    /// How long a retired signing key keeps verifying: the longest lifetime
    /// of any JWT the provider signs.
    #[must_use]
    pub fn key_retention(&self) -> time::Duration {
        to_time(self.access_token_lifetime.max(self.id_token_lifetime))
    }
}

/// Converts a configured duration, saturating on overflow.
#[must_use]
pub fn to_time(duration: Duration) -> time::Duration {
    time::Duration::try_from(duration).unwrap_or(time::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProviderConfig::default();
        assert_eq!(config.issuer, "http://localhost:3000");
        assert_eq!(config.authorization_code_lifetime, Duration::from_secs(60));
        assert!(config.refresh_token_rotation);
        assert_eq!(config.signing.algorithm, SigningAlgorithm::RS256);
        assert_eq!(config.clients.len(), 1);
        assert_eq!(config.clients[0].client_id, "foo");
    }

    #[test]
    fn test_default_config_validates() {
        assert!(ProviderConfig::default().validate().is_ok());
    }

    #[test]
    fn test_issuer_validation() {
        for issuer in ["", "not a url", "ftp://id.example.com", "https://id.example.com/?a=b"] {
            let config = ProviderConfig {
                issuer: issuer.to_string(),
                ..ProviderConfig::default()
            };
            assert!(config.validate().is_err(), "{issuer} should be rejected");
        }
    }

    #[test]
    fn test_zero_lifetime_rejected() {
        let config = ProviderConfig {
            access_token_lifetime: Duration::ZERO,
            ..ProviderConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("access_token_lifetime"));
    }

    #[test]
    fn test_unbounded_lifetime_rejected() {
        let config = ProviderConfig {
            access_token_lifetime: Duration::from_secs(400_000 * 365 * 24 * 60 * 60),
            ..ProviderConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("access_token_lifetime"));

        let mut config = ProviderConfig::default();
        config.signing.rotation_interval = Some(Duration::MAX);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_client_rejected() {
        let mut config = ProviderConfig::default();
        config.clients.push(config.clients[0].clone());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate client"));
    }

    #[test]
    fn test_openid_scope_required() {
        let config = ProviderConfig {
            scopes_supported: vec!["profile".to_string()],
            ..ProviderConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_key_retention_is_longest_jwt_lifetime() {
        let config = ProviderConfig {
            access_token_lifetime: Duration::from_secs(900),
            id_token_lifetime: Duration::from_secs(1800),
            ..ProviderConfig::default()
        };
        assert_eq!(config.key_retention(), time::Duration::seconds(1800));
    }

    #[test]
    fn test_deserialize_humantime() {
        let config: ProviderConfig = serde_json::from_str(
            r#"{
                "issuer": "https://id.example.com/",
                "access_token_lifetime": "15m",
                "signing": { "algorithm": "ES384", "rotation_interval": "7d" }
            }"#,
        )
        .unwrap();
        assert_eq!(config.access_token_lifetime, Duration::from_secs(900));
        assert_eq!(config.signing.algorithm, SigningAlgorithm::ES384);
        assert_eq!(
            config.signing.rotation_interval,
            Some(Duration::from_secs(7 * 24 * 3600))
        );
        assert_eq!(config.issuer_base(), "https://id.example.com");
        assert!(config.validate().is_ok());
    }
}

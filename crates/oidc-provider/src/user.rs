//! End-user authentication.
//!
//! The provider does not own end-user accounts. It asks a
//! [`UserAuthenticator`] to check credentials and to describe a subject for
//! ID tokens and the userinfo endpoint. [`InMemoryUserDirectory`] is the
//! built-in implementation seeded from configuration.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::error::AuthError;
use crate::secret::{generate_token, hash_password, verify_password};
use crate::types::{Scope, scope};

/// An authenticated end-user as seen by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndUser {
    /// Stable subject identifier (`sub`).
    pub subject: String,
    /// Login name.
    pub username: String,
    /// Display name.
    pub name: Option<String>,
    /// Email address.
    pub email: Option<String>,
    /// Whether the email address has been verified.
    pub email_verified: bool,
}

impl EndUser {
    /// Claims released for `scope`: `sub` always, `name` and
    /// `preferred_username` with `profile`, `email` and `email_verified`
    /// with `email`.
    #[must_use]
    pub fn claims(&self, scope: &Scope) -> serde_json::Map<String, serde_json::Value> {
        let mut claims = serde_json::Map::new();
        claims.insert("sub".into(), self.subject.clone().into());

        if scope.contains(scope::PROFILE) {
            claims.insert("preferred_username".into(), self.username.clone().into());
            if let Some(name) = &self.name {
                claims.insert("name".into(), name.clone().into());
            }
        }
        if scope.contains(scope::EMAIL) {
            if let Some(email) = &self.email {
                claims.insert("email".into(), email.clone().into());
                claims.insert("email_verified".into(), self.email_verified.into());
            }
        }
        claims
    }
}

/// Checks end-user credentials.
#[async_trait]
pub trait UserAuthenticator: Send + Sync {
    /// Returns the user if `username` and `password` match, `None` otherwise.
    ///
    /// # Errors
    /// Returns an error only if the backing directory fails.
    async fn authenticate(&self, username: &str, password: &str) -> AuthResult<Option<EndUser>>;

    /// Finds a user by subject.
    ///
    /// # Errors
    /// Returns an error only if the backing directory fails.
    async fn find_user(&self, subject: &str) -> AuthResult<Option<EndUser>>;
}

/// A user account as written in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSeed {
    /// Login name, also used as subject.
    pub username: String,
    /// Plaintext password, hashed on load.
    pub password: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Email address.
    #[serde(default)]
    pub email: Option<String>,
    /// Whether the email address has been verified.
    #[serde(default)]
    pub email_verified: bool,
}

struct StoredUser {
    user: EndUser,
    password_hash: String,
}

/// Users held in memory with Argon2 password hashes.
pub struct InMemoryUserDirectory {
    users: DashMap<String, StoredUser>,
    /// Checked for unknown usernames so every login costs one Argon2 run.
    decoy_hash: Option<String>,
}

impl Default for InMemoryUserDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryUserDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        let decoy_hash = match hash_password(&generate_token()) {
            Ok(hash) => Some(hash),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to prepare decoy password hash");
                None
            }
        };
        Self {
            users: DashMap::new(),
            decoy_hash,
        }
    }

    /// Creates a directory from configured accounts.
    ///
    /// # Errors
    /// Returns an error if a password cannot be hashed or a username repeats.
    pub fn from_seeds(seeds: &[UserSeed]) -> AuthResult<Self> {
        let directory = Self::new();
        for seed in seeds {
            directory.add_user(seed)?;
        }
        Ok(directory)
    }

    /// Adds an account.
    ///
    /// # Errors
    /// Returns an error if the password cannot be hashed or the username is
    /// taken.
    pub fn add_user(&self, seed: &UserSeed) -> AuthResult<()> {
        if self.users.contains_key(&seed.username) {
            return Err(AuthError::configuration(format!(
                "duplicate user '{}'",
                seed.username
            )));
        }
        let password_hash =
            hash_password(&seed.password).map_err(|e| AuthError::internal(e.to_string()))?;
        self.users.insert(
            seed.username.clone(),
            StoredUser {
                user: EndUser {
                    subject: seed.username.clone(),
                    username: seed.username.clone(),
                    name: seed.name.clone(),
                    email: seed.email.clone(),
                    email_verified: seed.email_verified,
                },
                password_hash,
            },
        );
        Ok(())
    }

    /// Number of accounts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Returns `true` if there are no accounts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserAuthenticator for InMemoryUserDirectory {
    async fn authenticate(&self, username: &str, password: &str) -> AuthResult<Option<EndUser>> {
        let Some((user, hash)) = self
            .users
            .get(username)
            .map(|u| (u.user.clone(), u.password_hash.clone()))
        else {
            if let Some(decoy) = self.decoy_hash.clone() {
                let _ = verify_blocking(password, decoy).await;
            }
            tracing::debug!(username = %username, "Login for unknown user");
            return Ok(None);
        };

        let matched = verify_blocking(password, hash).await?;
        Ok(matched.then_some(user))
    }

    async fn find_user(&self, subject: &str) -> AuthResult<Option<EndUser>> {
        Ok(self.users.get(subject).map(|u| u.user.clone()))
    }
}

/// Argon2 is CPU-bound; keep it off the async workers.
async fn verify_blocking(password: &str, hash: String) -> AuthResult<bool> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AuthError::internal(e.to_string()))?
        .map_err(|e| AuthError::internal(e.to_string()))
}

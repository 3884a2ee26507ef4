//! Client registry.
//!
//! Owns client registrations: registration, lookup, exact redirect URI
//! matching and client authentication.

use std::sync::Arc;

use crate::AuthResult;
use crate::error::AuthError;
use crate::secret::{hash_client_secret, verify_client_secret};
use crate::storage::ClientStorage;
use crate::types::{Client, ClientRegistration};

/// Registered OAuth 2.0 clients.
#[derive(Clone)]
pub struct ClientRegistry {
    storage: Arc<dyn ClientStorage>,
    /// Compared against when the client is unknown, so unknown and known
    /// clients cost the same.
    decoy_hash: Arc<str>,
}

impl ClientRegistry {
    /// Creates a registry over `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn ClientStorage>) -> Self {
        Self {
            storage,
            decoy_hash: hash_client_secret(&crate::secret::generate_token()).into(),
        }
    }

    /// Registers a client and returns its `client_id`.
    ///
    /// # Errors
    /// `InvalidClientMetadata` for an inconsistent registration,
    /// `DuplicateClient` if the `client_id` is taken.
    pub async fn register(&self, registration: ClientRegistration) -> AuthResult<String> {
        let client = registration
            .into_client()
            .map_err(|e| AuthError::invalid_client_metadata(e.to_string()))?;
        let client_id = client.client_id.clone();
        self.storage.insert_client(client).await?;
        tracing::info!(client_id = %client_id, "Client registered");
        Ok(client_id)
    }

    /// Looks up a client.
    ///
    /// # Errors
    /// `UnknownClient` if the client is not registered.
    pub async fn lookup(&self, client_id: &str) -> AuthResult<Client> {
        self.storage
            .find_client(client_id)
            .await?
            .ok_or_else(|| AuthError::UnknownClient {
                client_id: client_id.to_string(),
            })
    }

    /// Checks that `redirect_uri` is registered for the client, by exact
    /// string comparison.
    ///
    /// # Errors
    /// `UnknownClient` or `RedirectMismatch`.
    pub async fn validate_redirect(&self, client_id: &str, redirect_uri: &str) -> AuthResult<()> {
        let client = self.lookup(client_id).await?;
        if client.is_redirect_uri_allowed(redirect_uri) {
            Ok(())
        } else {
            tracing::warn!(client_id = %client_id, redirect_uri = %redirect_uri, "Redirect URI mismatch");
            Err(AuthError::RedirectMismatch {
                redirect_uri: redirect_uri.to_string(),
            })
        }
    }

    /// Authenticates a client at the token, revocation or introspection
    /// endpoint.
    ///
    /// Confidential clients must present their secret; public clients must
    /// present none. Secrets are compared in constant time.
    ///
    /// # Errors
    /// `InvalidClientCredentials` for every failure, including unknown
    /// clients.
    pub async fn authenticate(&self, client_id: &str, secret: Option<&str>) -> AuthResult<Client> {
        let Some(client) = self.storage.find_client(client_id).await? else {
            let _ = verify_client_secret(secret.unwrap_or_default(), &self.decoy_hash);
            tracing::debug!(client_id = %client_id, "Authentication for unknown client");
            return Err(AuthError::InvalidClientCredentials);
        };

        let authenticated = match (client.secret_hash.as_deref(), secret) {
            (Some(hash), Some(secret)) => verify_client_secret(secret, hash),
            (None, None) => true,
            _ => false,
        };

        if authenticated {
            Ok(client)
        } else {
            tracing::warn!(client_id = %client_id, "Client authentication failed");
            Err(AuthError::InvalidClientCredentials)
        }
    }

    /// Replaces the registration of an existing client.
    ///
    /// # Errors
    /// `InvalidClientMetadata` or `UnknownClient`.
    pub async fn update(&self, registration: ClientRegistration) -> AuthResult<()> {
        let client = registration
            .into_client()
            .map_err(|e| AuthError::invalid_client_metadata(e.to_string()))?;
        let client_id = client.client_id.clone();
        self.storage.replace_client(client).await?;
        tracing::info!(client_id = %client_id, "Client updated");
        Ok(())
    }

    /// Removes a client.
    ///
    /// # Errors
    /// `UnknownClient` if the client is not registered.
    pub async fn remove(&self, client_id: &str) -> AuthResult<()> {
        if self.storage.delete_client(client_id).await? {
            tracing::info!(client_id = %client_id, "Client removed");
            Ok(())
        } else {
            Err(AuthError::UnknownClient {
                client_id: client_id.to_string(),
            })
        }
    }

    /// Lists every registered client.
    ///
    /// # Errors
    /// Returns an error if the storage operation fails.
    pub async fn list(&self) -> AuthResult<Vec<Client>> {
        self.storage.list_clients().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    const CB: &str = "http://localhost:8080/cb";

    async fn registry() -> ClientRegistry {
        let registry = ClientRegistry::new(Arc::new(InMemoryStore::new()));
        registry
            .register(ClientRegistration::confidential("foo", "bar", vec![CB.to_string()]))
            .await
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = registry().await;
        let client = registry.lookup("foo").await.unwrap();
        assert_eq!(client.redirect_uris, vec![CB.to_string()]);

        assert!(matches!(
            registry.lookup("nope").await,
            Err(AuthError::UnknownClient { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let registry = registry().await;
        let err = registry
            .register(ClientRegistration::confidential("foo", "other", vec![CB.to_string()]))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DuplicateClient { .. }));
    }

    #[tokio::test]
    async fn test_invalid_registration() {
        let registry = registry().await;
        let err = registry
            .register(ClientRegistration::confidential("bad", "x", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidClientMetadata { .. }));
    }

    #[tokio::test]
    async fn test_validate_redirect_exact_match() {
        let registry = registry().await;
        assert!(registry.validate_redirect("foo", CB).await.is_ok());
        for uri in [
            "http://localhost:8080/cb/",
            "http://localhost:8080/cb/evil",
            "http://localhost:8080/cb?next=x",
            "http://LOCALHOST:8080/cb",
        ] {
            assert!(
                matches!(
                    registry.validate_redirect("foo", uri).await,
                    Err(AuthError::RedirectMismatch { .. })
                ),
                "{uri} should not match"
            );
        }
        assert!(matches!(
            registry.validate_redirect("nope", CB).await,
            Err(AuthError::UnknownClient { .. })
        ));
    }

    #[tokio::test]
    async fn test_authenticate() {
        let registry = registry().await;
        assert!(registry.authenticate("foo", Some("bar")).await.is_ok());

        for (id, secret) in [("foo", Some("baz")), ("foo", None), ("nope", Some("bar"))] {
            assert!(matches!(
                registry.authenticate(id, secret).await,
                Err(AuthError::InvalidClientCredentials)
            ));
        }
    }

    #[tokio::test]
    async fn test_public_client_authenticates_without_secret() {
        let registry = registry().await;
        registry
            .register(ClientRegistration::public("spa", vec![CB.to_string()]))
            .await
            .unwrap();

        assert!(registry.authenticate("spa", None).await.is_ok());
        assert!(matches!(
            registry.authenticate("spa", Some("guess")).await,
            Err(AuthError::InvalidClientCredentials)
        ));
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let registry = registry().await;
        registry
            .update(ClientRegistration::confidential(
                "foo",
                "rotated",
                vec!["https://app.example/cb".to_string()],
            ))
            .await
            .unwrap();
        assert!(registry.authenticate("foo", Some("rotated")).await.is_ok());
        assert!(registry.validate_redirect("foo", CB).await.is_err());

        registry.remove("foo").await.unwrap();
        assert!(registry.lookup("foo").await.is_err());
        assert!(matches!(
            registry.remove("foo").await,
            Err(AuthError::UnknownClient { .. })
        ));
        assert!(registry.list().await.unwrap().is_empty());
    }
}

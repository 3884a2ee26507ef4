//! Provider lifecycle.
//!
//! A [`Provider`] is created with [`Provider::init`], shared behind an `Arc`,
//! and torn down with [`Provider::shutdown`]. There is no global instance.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::AuthResult;
use crate::config::ProviderConfig;
use crate::error::AuthError;
use crate::oauth::service::{AuthorizationConfig, AuthorizationService};
use crate::registry::ClientRegistry;
use crate::secret::hash_token;
use crate::storage::{GrantStore, InMemoryStore};
use crate::token::jwt::SigningKeyPair;
use crate::token::keyring::KeyRing;
use crate::token::service::{TokenConfig, TokenService};
use crate::user::{InMemoryUserDirectory, UserAuthenticator};

/// An initialized authorization server.
pub struct Provider {
    config: ProviderConfig,
    store: Arc<InMemoryStore>,
    registry: ClientRegistry,
    keys: Arc<KeyRing>,
    tokens: Arc<TokenService>,
    authorization: Arc<AuthorizationService>,
    users: Arc<dyn UserAuthenticator>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Provider {
    /// Initializes a provider whose end-users come from `config.users`.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid, a user or client
    /// cannot be registered, or the signing key cannot be loaded or
    /// generated.
    pub async fn init(config: ProviderConfig) -> AuthResult<Self> {
        let users = InMemoryUserDirectory::from_seeds(&config.users)?;
        Self::init_with_authenticator(config, Arc::new(users)).await
    }

    /// Initializes a provider that authenticates end-users with
    /// `authenticator`.
    ///
    /// # Errors
    /// See [`Provider::init`].
    pub async fn init_with_authenticator(
        config: ProviderConfig,
        authenticator: Arc<dyn UserAuthenticator>,
    ) -> AuthResult<Self> {
        config.validate()?;

        let keys = Arc::new(load_keys(&config).await?);
        let store = Arc::new(InMemoryStore::new());

        let registry = ClientRegistry::new(store.clone());
        for registration in &config.clients {
            registry.register(registration.clone()).await?;
        }

        let grant_store: Arc<dyn GrantStore> = store.clone();
        let tokens = Arc::new(TokenService::new(
            keys.clone(),
            grant_store.clone(),
            TokenConfig::from_provider(&config),
        ));
        let authorization = Arc::new(AuthorizationService::new(
            registry.clone(),
            grant_store,
            authenticator.clone(),
            tokens.clone(),
            AuthorizationConfig::from_provider(&config),
        ));

        tracing::info!(
            issuer = %config.issuer_base(),
            algorithm = %keys.algorithm(),
            kid = %keys.active_kid(),
            clients = config.clients.len(),
            "OIDC provider initialized"
        );

        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            config,
            store,
            registry,
            keys,
            tokens,
            authorization,
            users: authenticator,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        })
    }

    // ---- Accessors ----

    /// Validated configuration.
    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Issuer without a trailing slash.
    #[must_use]
    pub fn issuer(&self) -> &str {
        self.config.issuer_base()
    }

    /// The grant store.
    #[must_use]
    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    /// Registered clients.
    #[must_use]
    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Signing keys.
    #[must_use]
    pub fn keys(&self) -> &Arc<KeyRing> {
        &self.keys
    }

    /// Token issuance and verification.
    #[must_use]
    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.tokens
    }

    /// The authorization endpoint logic.
    #[must_use]
    pub fn authorization(&self) -> &Arc<AuthorizationService> {
        &self.authorization
    }

    /// End-user directory.
    #[must_use]
    pub fn users(&self) -> &Arc<dyn UserAuthenticator> {
        &self.users
    }

    // ---- Lifecycle ----

    /// Starts the background sweep of expired entries and, when
    /// `signing.rotation_interval` is set, periodic key rotation.
    ///
    /// Must be called from within a Tokio runtime. The tasks run until
    /// [`Provider::shutdown`].
    pub fn spawn_maintenance(&self) {
        let mut handles = Vec::with_capacity(2);

        let store = self.store.clone();
        let keys = self.keys.clone();
        handles.push(spawn_periodic(
            self.config.cleanup_interval,
            self.shutdown.subscribe(),
            move || {
                let store = store.clone();
                let keys = keys.clone();
                async move {
                    let now = OffsetDateTime::now_utc();
                    match store.purge_expired(now).await {
                        Ok(0) => {}
                        Ok(purged) => tracing::debug!(purged, "Expired grant entries purged"),
                        Err(e) => tracing::warn!(error = %e, "Grant store sweep failed"),
                    }
                    keys.prune(now);
                }
            },
        ));

        if let Some(interval) = self.config.signing.rotation_interval {
            let keys = self.keys.clone();
            handles.push(spawn_periodic(interval, self.shutdown.subscribe(), move || {
                let keys = keys.clone();
                async move {
                    // A failed rotation keeps the current key in service.
                    if let Err(e) = keys.rotate() {
                        tracing::error!(error = %e, "Signing key rotation failed");
                    }
                }
            }));
        }

        tracing::info!(
            cleanup_interval = ?self.config.cleanup_interval,
            rotation_interval = ?self.config.signing.rotation_interval,
            "Maintenance tasks started"
        );
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(handles);
    }

    /// Stops background tasks and flushes the store.
    ///
    /// # Errors
    /// Returns an error if the store cannot be flushed.
    pub async fn shutdown(&self) -> AuthResult<()> {
        self.shutdown.send_replace(true);
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Maintenance task ended abnormally");
            }
        }

        self.store.flush().await?;
        tracing::info!("OIDC provider shut down");
        Ok(())
    }
}

/// Runs `job` every `period` until `shutdown` flips to `true`.
fn spawn_periodic<F, Fut>(period: Duration, mut shutdown: watch::Receiver<bool>, job: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => job().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

async fn load_keys(config: &ProviderConfig) -> AuthResult<KeyRing> {
    let algorithm = config.signing.algorithm;
    let retention = config.key_retention();
    let issuer = config.issuer_base();

    let Some(path) = &config.signing.key_file else {
        return Ok(KeyRing::generate(algorithm, issuer, retention)?);
    };

    let pem = tokio::fs::read_to_string(path).await.map_err(|e| {
        AuthError::configuration(format!("cannot read signing key {}: {e}", path.display()))
    })?;
    // Stable across restarts, so tokens issued before a restart keep their kid.
    let kid = hash_token(&pem)[..16].to_string();
    let key = SigningKeyPair::from_private_pem(kid, algorithm, &pem)?;
    tracing::info!(path = %path.display(), kid = %key.kid(), "Loaded signing key");
    Ok(KeyRing::with_key(key, issuer, retention))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::TokenStorage;
    use crate::types::{Scope, TokenKind, TokenRecord, TokenStatus};
    use crate::user::UserSeed;

    #[tokio::test]
    async fn test_init_registers_configured_clients() {
        let provider = Provider::init(ProviderConfig::default()).await.unwrap();
        let client = provider.registry().lookup("foo").await.unwrap();
        assert_eq!(client.redirect_uris, vec!["http://localhost:8080/cb".to_string()]);
        assert_eq!(provider.keys().jwks().keys.len(), 1);
    }

    #[tokio::test]
    async fn test_init_rejects_invalid_config() {
        let config = ProviderConfig {
            issuer: "not a url".into(),
            ..ProviderConfig::default()
        };
        assert!(matches!(
            Provider::init(config).await,
            Err(AuthError::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_init_with_seeded_users() {
        let config = ProviderConfig {
            users: vec![UserSeed {
                username: "alice".into(),
                password: "wonderland".into(),
                name: None,
                email: None,
                email_verified: false,
            }],
            ..ProviderConfig::default()
        };
        let provider = Provider::init(config).await.unwrap();
        let user = provider.users().authenticate("alice", "wonderland").await.unwrap();
        assert_eq!(user.map(|u| u.subject), Some("alice".to_string()));
    }

    #[tokio::test]
    async fn test_missing_key_file_is_fatal() {
        let mut config = ProviderConfig::default();
        config.signing.key_file = Some("/nonexistent/signing-key.pem".into());
        assert!(matches!(
            Provider::init(config).await,
            Err(AuthError::Configuration { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_rotates_and_stops() {
        let mut config = ProviderConfig::default();
        config.signing.algorithm = crate::token::jwt::SigningAlgorithm::ES384;
        config.signing.rotation_interval = Some(Duration::from_secs(3600));
        let provider = Provider::init(config).await.unwrap();
        let first_kid = provider.keys().active_kid();

        provider.spawn_maintenance();
        tokio::time::sleep(Duration::from_secs(3601)).await;
        assert_ne!(provider.keys().active_kid(), first_kid);

        provider.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_flushes_store() {
        let provider = Provider::init(ProviderConfig::default()).await.unwrap();
        let now = OffsetDateTime::now_utc();
        provider
            .store()
            .store_token(TokenRecord {
                key: "jti-1".into(),
                kind: TokenKind::AccessToken,
                grant_id: uuid::Uuid::new_v4(),
                parent: None,
                client_id: "foo".into(),
                subject: "alice".into(),
                scope: Scope::parse("openid"),
                auth_time: None,
                issued_at: now,
                expires_at: now + time::Duration::hours(1),
                status: TokenStatus::Active,
            })
            .await
            .unwrap();
        assert_eq!(provider.store().token_count(), 1);

        provider.shutdown().await.unwrap();
        assert_eq!(provider.store().token_count(), 0);
    }
}

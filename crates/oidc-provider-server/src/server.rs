use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::{Json, Router, routing::get};
use oidc_provider::Provider;
use oidc_provider::http::{OidcState, router};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;

pub struct OidcServer {
    addr: SocketAddr,
    app: Router,
    provider: Arc<Provider>,
}

/// Builds the application: provider endpoints under the issuer's path plus
/// `/healthz` at the root.
pub fn build_app(cfg: &AppConfig, provider: Arc<Provider>) -> Router {
    let oidc = router(OidcState::new(provider));
    let mount = cfg.mount_path();
    let app = if mount.is_empty() {
        Router::new().merge(oidc)
    } else {
        Router::new().nest(&mount, oidc)
    };

    app.route("/healthz", get(healthz)).layer(
        ServiceBuilder::new()
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(|req: &axum::http::Request<_>| {
                        use tracing::field::Empty;
                        // The query string may carry codes and states; log the path only.
                        tracing::info_span!(
                            "http.request",
                            http.method = %req.method(),
                            http.target = %req.uri().path(),
                            http.status_code = Empty,
                        )
                    })
                    .on_response(
                        |res: &axum::http::Response<_>, latency: std::time::Duration, span: &tracing::Span| {
                            span.record("http.status_code", tracing::field::display(res.status().as_u16()));
                            tracing::info!(
                                http.status = %res.status().as_u16(),
                                elapsed_ms = %latency.as_millis(),
                                "request handled"
                            );
                        },
                    ),
            )
            .layer(CatchPanicLayer::new())
            .layer(cors_layer(&cfg.server.cors_allowed_origins))
            .layer(axum::extract::DefaultBodyLimit::max(cfg.server.body_limit_bytes)),
    )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Default)]
pub struct ServerBuilder {
    config: AppConfig,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    /// Initializes the provider and assembles the router.
    pub async fn build(self) -> anyhow::Result<OidcServer> {
        let provider = Arc::new(Provider::init(self.config.provider.clone()).await?);
        let app = build_app(&self.config, provider.clone());
        Ok(OidcServer {
            addr: self.config.addr(),
            app,
            provider,
        })
    }
}

impl OidcServer {
    pub fn provider(&self) -> &Arc<Provider> {
        &self.provider
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!(issuer = %self.provider.issuer(), "listening on {}", self.addr);

        self.provider.spawn_maintenance();
        let served = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        // Stop background tasks even if serving failed.
        self.provider.shutdown().await?;
        served?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

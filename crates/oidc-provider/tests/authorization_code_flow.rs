//! Authorization code flow through the provider services.

use std::sync::Arc;

use oidc_provider::error::AuthError;
use oidc_provider::oauth::{
    AuthorizationRequest, AuthorizeFailure, CodeChallenge, CodeVerifier, FlowStep, TokenRequest,
};
use oidc_provider::token::IdTokenClaims;
use oidc_provider::{Client, ClientRegistration, Provider, ProviderConfig, SigningAlgorithm, UserSeed};

const REDIRECT_URI: &str = "http://localhost:8080/cb";

async fn provider() -> Arc<Provider> {
    let mut config = ProviderConfig::default();
    config.signing.algorithm = SigningAlgorithm::ES384;
    config
        .clients
        .push(ClientRegistration::public("spa", vec!["http://localhost:5173/cb".to_string()]));
    config.users.push(UserSeed {
        username: "alice".into(),
        password: "wonderland".into(),
        name: Some("Alice Liddell".into()),
        email: None,
        email_verified: false,
    });
    Arc::new(Provider::init(config).await.unwrap())
}

fn request(client_id: &str, redirect_uri: &str, scope: &str) -> AuthorizationRequest {
    AuthorizationRequest {
        response_type: Some("code".into()),
        client_id: Some(client_id.into()),
        redirect_uri: Some(redirect_uri.into()),
        scope: Some(scope.into()),
        state: Some("xyz".into()),
        ..AuthorizationRequest::default()
    }
}

/// Logs alice in, approves, and returns the issued code.
async fn authorize(provider: &Provider, request: &AuthorizationRequest) -> String {
    let authorization = provider.authorization();
    let FlowStep::Login { flow, .. } = authorization.begin(request, None).await.unwrap() else {
        panic!("expected the login step");
    };
    let outcome = authorization.login(&flow.id, "alice", "wonderland").await.unwrap();
    assert!(outcome.session.is_some());
    let redirect = match outcome.step {
        FlowStep::Consent { .. } => authorization.approve(&flow.id).await.unwrap(),
        FlowStep::Redirect(redirect) => redirect,
        FlowStep::Login { .. } => panic!("login failed"),
    };

    let location = url::Url::parse(&redirect.location).unwrap();
    let param = |name: &str| {
        location
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    };
    assert_eq!(param("state").as_deref(), Some("xyz"));
    param("code").unwrap()
}

fn code_request(code: &str, redirect_uri: &str) -> TokenRequest {
    TokenRequest {
        grant_type: Some("authorization_code".into()),
        code: Some(code.into()),
        redirect_uri: Some(redirect_uri.into()),
        ..TokenRequest::default()
    }
}

async fn client(provider: &Provider, client_id: &str) -> Client {
    provider.registry().lookup(client_id).await.unwrap()
}

#[tokio::test]
async fn code_exchange_issues_id_token_with_nonce() {
    let provider = provider().await;
    let mut req = request("foo", REDIRECT_URI, "openid profile");
    req.nonce = Some("n-0S6_WzA2Mj".into());
    let code = authorize(&provider, &req).await;

    let response = provider
        .tokens()
        .exchange_code(&client(&provider, "foo").await, &code_request(&code, REDIRECT_URI))
        .await
        .unwrap();
    assert_eq!(response.token_type, "Bearer");
    assert!(response.refresh_token.is_some());

    let id_token = response.id_token.unwrap();
    let claims: IdTokenClaims = provider.keys().verify(&id_token).unwrap();
    assert_eq!(claims.sub, "alice");
    assert_eq!(claims.aud, "foo");
    assert_eq!(claims.nonce.as_deref(), Some("n-0S6_WzA2Mj"));
    assert!(claims.at_hash.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_redemption_has_exactly_one_winner() {
    let provider = provider().await;
    let foo = client(&provider, "foo").await;

    for _ in 0..20 {
        let code = authorize(&provider, &request("foo", REDIRECT_URI, "openid")).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let provider = provider.clone();
            let foo = foo.clone();
            let req = code_request(&code, REDIRECT_URI);
            handles.push(tokio::spawn(async move {
                provider.tokens().exchange_code(&foo, &req).await
            }));
        }

        let mut winners = Vec::new();
        let mut losers = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(response) => winners.push(response),
                Err(AuthError::CodeAlreadyUsed) => losers += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(winners.len(), 1);
        assert_eq!(losers, 7);

        // Replays revoke everything minted from the code.
        let winner = &winners[0];
        assert!(provider.tokens().verify_access_token(&winner.access_token).await.is_err());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_refresh_rotates_once() {
    let provider = provider().await;
    let foo = client(&provider, "foo").await;

    for _ in 0..20 {
        let code = authorize(&provider, &request("foo", REDIRECT_URI, "openid")).await;
        let issued = provider
            .tokens()
            .exchange_code(&foo, &code_request(&code, REDIRECT_URI))
            .await
            .unwrap();
        let refresh_token = issued.refresh_token.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let provider = provider.clone();
            let foo = foo.clone();
            let req = TokenRequest {
                grant_type: Some("refresh_token".into()),
                refresh_token: Some(refresh_token.clone()),
                ..TokenRequest::default()
            };
            handles.push(tokio::spawn(async move { provider.tokens().refresh(&foo, &req).await }));
        }

        let mut winners = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(response) => winners.push(response),
                Err(AuthError::RefreshTokenReused | AuthError::TokenRevoked) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(winners.len(), 1);

        // Reuse of the rotated token revokes the winner's tokens too.
        let winner = &winners[0];
        assert!(winner.refresh_token.as_deref().is_some_and(|t| t != refresh_token));
        assert!(provider.tokens().verify_access_token(&winner.access_token).await.is_err());
    }
}

#[tokio::test]
async fn public_client_requires_matching_pkce_verifier() {
    let provider = provider().await;
    let redirect = "http://localhost:5173/cb";

    // No challenge at all is rejected with a redirect.
    let failure = provider
        .authorization()
        .begin(&request("spa", redirect, "openid"), None)
        .await
        .unwrap_err();
    let AuthorizeFailure::Redirect(error) = failure else {
        panic!("expected an error redirect");
    };
    assert!(error.location.contains("error=invalid_request"));

    let verifier = CodeVerifier::generate();
    let mut req = request("spa", redirect, "openid");
    req.code_challenge = Some(CodeChallenge::s256(&verifier).into_inner());
    req.code_challenge_method = Some("S256".into());
    let spa = client(&provider, "spa").await;

    let code = authorize(&provider, &req).await;
    let mut wrong = code_request(&code, redirect);
    wrong.code_verifier = Some(CodeVerifier::generate().as_str().to_string());
    assert!(matches!(
        provider.tokens().exchange_code(&spa, &wrong).await,
        Err(AuthError::PkceVerificationFailed)
    ));

    let code = authorize(&provider, &req).await;
    let mut right = code_request(&code, redirect);
    right.code_verifier = Some(verifier.as_str().to_string());
    let response = provider.tokens().exchange_code(&spa, &right).await.unwrap();
    assert!(!response.access_token.is_empty());
}

#[tokio::test]
async fn code_bound_to_redirect_uri() {
    let provider = provider().await;
    let code = authorize(&provider, &request("foo", REDIRECT_URI, "")).await;

    let result = provider
        .tokens()
        .exchange_code(
            &client(&provider, "foo").await,
            &code_request(&code, "http://localhost:8080/other"),
        )
        .await;
    assert_eq!(result.unwrap_err().oauth_error_code(), "invalid_grant");
}

#[tokio::test]
async fn second_authorization_skips_login_and_consent() {
    let provider = provider().await;
    let authorization = provider.authorization();
    let req = request("foo", REDIRECT_URI, "openid");

    let FlowStep::Login { flow, .. } = authorization.begin(&req, None).await.unwrap() else {
        panic!("expected the login step");
    };
    let outcome = authorization.login(&flow.id, "alice", "wonderland").await.unwrap();
    let session = outcome.session.unwrap();
    authorization.approve(&flow.id).await.unwrap();

    let step = authorization.begin(&req, Some(&session.id)).await.unwrap();
    assert!(matches!(step, FlowStep::Redirect(_)));

    // A wider scope needs consent again.
    let wider = request("foo", REDIRECT_URI, "openid email");
    let step = authorization.begin(&wider, Some(&session.id)).await.unwrap();
    assert!(matches!(step, FlowStep::Consent { .. }));
}

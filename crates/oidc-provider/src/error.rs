//! Authorization server error types.
//!
//! Every failure the provider can report is an [`AuthError`]. Variants are
//! grouped into the five protocol categories (client, request,
//! authentication, grant, signing) plus a server category for storage and
//! configuration failures. Server-category errors never reach the wire with
//! their details; see [`AuthError::public_description`].

use std::fmt;

use crate::token::jwt::SigningError;

/// Generic description used for every server-category error on the wire.
pub const GENERIC_SERVER_ERROR: &str = "The authorization server encountered an unexpected condition";

/// Errors that can occur while authorizing requests and issuing tokens.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    // ---- Client errors ----
    /// The client is not registered.
    #[error("Unknown client: {client_id}")]
    UnknownClient {
        /// The client identifier that was looked up.
        client_id: String,
    },

    /// A client with the same identifier is already registered.
    #[error("Client already registered: {client_id}")]
    DuplicateClient {
        /// The conflicting client identifier.
        client_id: String,
    },

    /// The redirect URI is not registered for the client.
    #[error("Redirect URI is not registered for this client: {redirect_uri}")]
    RedirectMismatch {
        /// The rejected redirect URI.
        redirect_uri: String,
    },

    /// The client registration is malformed.
    #[error("Invalid client metadata: {message}")]
    InvalidClientMetadata {
        /// Description of the problem.
        message: String,
    },

    /// The client is not allowed to use the requested grant or response type.
    #[error("Unauthorized client: {message}")]
    UnauthorizedClient {
        /// Description of what the client is not allowed to do.
        message: String,
    },

    // ---- Request errors ----
    /// The request is missing a parameter or is otherwise malformed.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of the problem.
        message: String,
    },

    /// The response type is not supported.
    #[error("Unsupported response type: {response_type}")]
    UnsupportedResponseType {
        /// The rejected response type.
        response_type: String,
    },

    /// The grant type is not supported.
    #[error("Unsupported grant type: {grant_type}")]
    UnsupportedGrantType {
        /// The rejected grant type.
        grant_type: String,
    },

    /// The requested scope is unknown or exceeds what the client may request.
    #[error("Invalid scope: {message}")]
    InvalidScope {
        /// Description of the problem.
        message: String,
    },

    // ---- Authentication errors ----
    /// Client authentication failed (unknown client, missing or wrong secret).
    #[error("Client authentication failed")]
    InvalidClientCredentials,

    /// The PKCE code verifier does not match the recorded challenge.
    #[error("PKCE verification failed")]
    PkceVerificationFailed,

    /// The end-user credentials were rejected.
    #[error("Invalid username or password")]
    LoginFailed,

    /// Interactive login is needed but `prompt=none` was requested.
    #[error("End-user authentication is required")]
    LoginRequired,

    /// A bearer token presented to a protected endpoint is not acceptable.
    #[error("Invalid access token: {message}")]
    InvalidToken {
        /// Description of why the token was rejected.
        message: String,
    },

    // ---- Grant errors ----
    /// The authorization code does not exist.
    #[error("Authorization code not found")]
    CodeNotFound,

    /// The authorization code has expired.
    #[error("Authorization code expired")]
    CodeExpired,

    /// The authorization code was already redeemed.
    #[error("Authorization code already used")]
    CodeAlreadyUsed,

    /// The grant is invalid for a reason not covered by a dedicated variant.
    #[error("Invalid grant: {message}")]
    InvalidGrant {
        /// Description of the problem.
        message: String,
    },

    /// The refresh token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// The refresh token has been revoked.
    #[error("Token revoked")]
    TokenRevoked,

    /// A rotated refresh token was presented again.
    #[error("Refresh token reuse detected")]
    RefreshTokenReused,

    /// The end-user or the server denied the authorization request.
    #[error("Access denied: {message}")]
    AccessDenied {
        /// Description of the denial.
        message: String,
    },

    /// Consent is needed but `prompt=none` was requested.
    #[error("End-user consent is required")]
    ConsentRequired,

    /// The pending authorization flow is unknown or has expired.
    #[error("Authorization request expired")]
    FlowExpired,

    // ---- Signing errors ----
    /// Token signing or verification failed.
    #[error(transparent)]
    Signing(#[from] SigningError),

    // ---- Server errors ----
    /// The grant store failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },

    /// The provider is misconfigured.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// Unexpected internal failure.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `InvalidClientMetadata` error.
    #[must_use]
    pub fn invalid_client_metadata(message: impl Into<String>) -> Self {
        Self::InvalidClientMetadata {
            message: message.into(),
        }
    }

    /// Creates a new `UnauthorizedClient` error.
    #[must_use]
    pub fn unauthorized_client(message: impl Into<String>) -> Self {
        Self::UnauthorizedClient {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedResponseType` error.
    #[must_use]
    pub fn unsupported_response_type(response_type: impl Into<String>) -> Self {
        Self::UnsupportedResponseType {
            response_type: response_type.into(),
        }
    }

    /// Creates a new `UnsupportedGrantType` error.
    #[must_use]
    pub fn unsupported_grant_type(grant_type: impl Into<String>) -> Self {
        Self::UnsupportedGrantType {
            grant_type: grant_type.into(),
        }
    }

    /// Creates a new `InvalidScope` error.
    #[must_use]
    pub fn invalid_scope(message: impl Into<String>) -> Self {
        Self::InvalidScope {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidGrant` error.
    #[must_use]
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant {
            message: message.into(),
        }
    }

    /// Creates a new `AccessDenied` error.
    #[must_use]
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownClient { .. }
            | Self::DuplicateClient { .. }
            | Self::RedirectMismatch { .. }
            | Self::InvalidClientMetadata { .. }
            | Self::UnauthorizedClient { .. } => ErrorCategory::Client,
            Self::InvalidRequest { .. }
            | Self::UnsupportedResponseType { .. }
            | Self::UnsupportedGrantType { .. }
            | Self::InvalidScope { .. } => ErrorCategory::Request,
            Self::InvalidClientCredentials
            | Self::PkceVerificationFailed
            | Self::LoginFailed
            | Self::LoginRequired
            | Self::InvalidToken { .. } => ErrorCategory::Authentication,
            Self::CodeNotFound
            | Self::CodeExpired
            | Self::CodeAlreadyUsed
            | Self::InvalidGrant { .. }
            | Self::TokenExpired
            | Self::TokenRevoked
            | Self::RefreshTokenReused
            | Self::AccessDenied { .. }
            | Self::ConsentRequired
            | Self::FlowExpired => ErrorCategory::Grant,
            Self::Signing(_) => ErrorCategory::Signing,
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                ErrorCategory::Server
            }
        }
    }

    /// Returns the OAuth 2.0 / OpenID Connect error code for this error.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::UnknownClient { .. } | Self::InvalidClientCredentials => "invalid_client",
            Self::DuplicateClient { .. } | Self::InvalidClientMetadata { .. } => {
                "invalid_client_metadata"
            }
            Self::RedirectMismatch { .. } | Self::InvalidRequest { .. } | Self::FlowExpired => {
                "invalid_request"
            }
            Self::UnauthorizedClient { .. } => "unauthorized_client",
            Self::UnsupportedResponseType { .. } => "unsupported_response_type",
            Self::UnsupportedGrantType { .. } => "unsupported_grant_type",
            Self::InvalidScope { .. } => "invalid_scope",
            Self::PkceVerificationFailed
            | Self::CodeNotFound
            | Self::CodeExpired
            | Self::CodeAlreadyUsed
            | Self::InvalidGrant { .. }
            | Self::TokenExpired
            | Self::TokenRevoked
            | Self::RefreshTokenReused => "invalid_grant",
            Self::LoginFailed | Self::AccessDenied { .. } => "access_denied",
            Self::LoginRequired => "login_required",
            Self::ConsentRequired => "consent_required",
            Self::InvalidToken { .. } => "invalid_token",
            Self::Signing(e) if e.is_validation_error() => "invalid_token",
            Self::Signing(_) | Self::Storage { .. } | Self::Configuration { .. } => "server_error",
            Self::Internal { .. } => "server_error",
        }
    }

    /// Returns `true` if the caller is at fault.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Returns `true` if the server is at fault.
    ///
    /// Signing failures that stem from a presented token (bad signature,
    /// expiry, malformed input) count as caller faults.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        match self {
            Self::Signing(e) => !e.is_validation_error(),
            other => other.category() == ErrorCategory::Server,
        }
    }

    /// Returns the description that is safe to put on the wire.
    ///
    /// Server faults collapse into [`GENERIC_SERVER_ERROR`] so that responses
    /// never reveal which internal step failed.
    #[must_use]
    pub fn public_description(&self) -> String {
        if self.is_server_error() {
            GENERIC_SERVER_ERROR.to_string()
        } else {
            self.to_string()
        }
    }
}

/// Protocol error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Unknown or misconfigured client, bad redirect.
    Client,
    /// Malformed parameters, unsupported grant or response type.
    Request,
    /// Bad client secret, failed PKCE, rejected end-user or bearer credentials.
    Authentication,
    /// Expired, consumed, unknown or revoked codes and tokens; denials.
    Grant,
    /// Key unavailable or token verification failure.
    Signing,
    /// Storage, configuration and internal failures.
    Server,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => write!(f, "client"),
            Self::Request => write!(f, "request"),
            Self::Authentication => write!(f, "authentication"),
            Self::Grant => write!(f, "grant"),
            Self::Signing => write!(f, "signing"),
            Self::Server => write!(f, "server"),
        }
    }
}

//! Token revocation (RFC 7009) request types.

use serde::{Deserialize, Serialize};

use crate::types::TokenKind;

/// Token revocation request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RevocationRequest {
    /// The token to revoke.
    #[serde(default)]
    pub token: Option<String>,

    /// Which kind of token the client believes it is sending.
    #[serde(default)]
    pub token_type_hint: Option<String>,

    /// Client ID (`client_secret_post`).
    #[serde(default)]
    pub client_id: Option<String>,

    /// Client secret (`client_secret_post`).
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// `token_type_hint` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenTypeHint {
    /// The token is an access token.
    AccessToken,
    /// The token is a refresh token.
    RefreshToken,
}

impl TokenTypeHint {
    /// Parses a hint. Unknown hints are ignored, as RFC 7009 allows.
    #[must_use]
    pub fn parse(value: Option<&str>) -> Option<Self> {
        match value? {
            "access_token" => Some(Self::AccessToken),
            "refresh_token" => Some(Self::RefreshToken),
            _ => None,
        }
    }

    /// Token kinds to try, hinted kind first.
    #[must_use]
    pub fn search_order(hint: Option<Self>) -> [TokenKind; 2] {
        match hint {
            Some(Self::AccessToken) => [TokenKind::AccessToken, TokenKind::RefreshToken],
            Some(Self::RefreshToken) | None => [TokenKind::RefreshToken, TokenKind::AccessToken],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_parse() {
        assert_eq!(TokenTypeHint::parse(Some("access_token")), Some(TokenTypeHint::AccessToken));
        assert_eq!(TokenTypeHint::parse(Some("refresh_token")), Some(TokenTypeHint::RefreshToken));
        assert_eq!(TokenTypeHint::parse(Some("id_token")), None);
        assert_eq!(TokenTypeHint::parse(None), None);
    }

    #[test]
    fn test_search_order_prefers_hint() {
        assert_eq!(
            TokenTypeHint::search_order(Some(TokenTypeHint::AccessToken))[0],
            TokenKind::AccessToken
        );
        assert_eq!(TokenTypeHint::search_order(None)[0], TokenKind::RefreshToken);
    }
}

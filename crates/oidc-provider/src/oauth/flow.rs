//! Authorization state machine.
//!
//! ```text
//! REQUESTED -> CLIENT_VALIDATED -> USER_AUTHENTICATED -> CONSENTED -> CODE_ISSUED -> TOKEN_ISSUED
//!                     |                                      |
//!                     +---------- client_credentials ---------+--> TOKEN_ISSUED (implicit)
//!
//! DENIED and EXPIRED are reachable from every non-terminal state.
//! ```
//!
//! A pending interactive request is persisted as an [`AuthorizationFlow`]
//! between the login and consent round trips.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::authorize::ValidatedAuthorizationRequest;
use crate::error::AuthError;

/// State of an authorization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowState {
    /// Parameters received, nothing checked yet.
    Requested,
    /// Client, redirect URI and response type validated.
    ClientValidated,
    /// End-user identified.
    UserAuthenticated,
    /// End-user approved the requested scope.
    Consented,
    /// Authorization code minted.
    CodeIssued,
    /// Tokens minted.
    TokenIssued,
    /// Refused by the end-user or by policy.
    Denied,
    /// Timed out before completion.
    Expired,
}

impl FlowState {
    /// Returns `true` for states with no outgoing transitions.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TokenIssued | Self::Denied | Self::Expired)
    }

    /// Returns `true` if `self -> next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(&self, next: FlowState) -> bool {
        use FlowState::*;

        if self.is_terminal() {
            return false;
        }
        if matches!(next, Denied | Expired) {
            return true;
        }
        matches!(
            (self, next),
            (Requested, ClientValidated)
                | (ClientValidated, UserAuthenticated)
                | (ClientValidated, TokenIssued)
                | (UserAuthenticated, Consented)
                | (Consented, CodeIssued)
                | (Consented, TokenIssued)
                | (CodeIssued, TokenIssued)
        )
    }

    /// Performs `self -> next`.
    ///
    /// # Errors
    /// Returns `Internal` for an illegal transition; callers drive the
    /// machine, so this indicates a bug rather than bad input.
    pub fn advance(self, next: FlowState) -> Result<FlowState, AuthError> {
        if self.can_transition_to(next) {
            tracing::trace!(from = %self, to = %next, "Authorization state transition");
            Ok(next)
        } else {
            Err(AuthError::internal(format!(
                "illegal authorization state transition {self} -> {next}"
            )))
        }
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Requested => "REQUESTED",
            Self::ClientValidated => "CLIENT_VALIDATED",
            Self::UserAuthenticated => "USER_AUTHENTICATED",
            Self::Consented => "CONSENTED",
            Self::CodeIssued => "CODE_ISSUED",
            Self::TokenIssued => "TOKEN_ISSUED",
            Self::Denied => "DENIED",
            Self::Expired => "EXPIRED",
        };
        f.write_str(name)
    }
}

/// A pending interactive authorization request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationFlow {
    /// Opaque flow identifier carried by the login and consent forms.
    pub id: String,
    /// Current state.
    pub state: FlowState,
    /// The validated request.
    pub request: ValidatedAuthorizationRequest,
    /// Authenticated end-user, once known.
    pub subject: Option<String>,
    /// When the end-user authenticated.
    #[serde(with = "time::serde::rfc3339::option")]
    pub auth_time: Option<OffsetDateTime>,
    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Deadline for completing the flow.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl AuthorizationFlow {
    /// Moves the flow to `next`.
    ///
    /// # Errors
    /// Returns `Internal` for an illegal transition.
    pub fn transition(&mut self, next: FlowState) -> Result<(), AuthError> {
        self.state = self.state.advance(next)?;
        Ok(())
    }

    /// Returns `true` once the completion deadline has passed.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }

    /// Records the authenticated end-user.
    ///
    /// # Errors
    /// Returns `Internal` if the flow is not waiting for a login.
    pub fn authenticate(&mut self, subject: String, auth_time: OffsetDateTime) -> Result<(), AuthError> {
        self.transition(FlowState::UserAuthenticated)?;
        self.subject = Some(subject);
        self.auth_time = Some(auth_time);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use FlowState::*;

    const ALL: [FlowState; 8] = [
        Requested,
        ClientValidated,
        UserAuthenticated,
        Consented,
        CodeIssued,
        TokenIssued,
        Denied,
        Expired,
    ];

    #[test]
    fn test_happy_path_is_legal() {
        let mut state = Requested;
        for next in [ClientValidated, UserAuthenticated, Consented, CodeIssued, TokenIssued] {
            state = state.advance(next).unwrap();
        }
        assert_eq!(state, TokenIssued);
    }

    #[test]
    fn test_client_credentials_shortcut() {
        let state = Requested.advance(ClientValidated).unwrap();
        assert_eq!(state.advance(TokenIssued).unwrap(), TokenIssued);
    }

    #[test]
    fn test_cannot_skip_steps() {
        assert!(!Requested.can_transition_to(UserAuthenticated));
        assert!(!ClientValidated.can_transition_to(Consented));
        assert!(!ClientValidated.can_transition_to(CodeIssued));
        assert!(!UserAuthenticated.can_transition_to(CodeIssued));
        assert!(Requested.advance(CodeIssued).is_err());
    }

    #[test]
    fn test_failure_states_reachable_from_every_non_terminal_state() {
        for state in ALL.iter().filter(|s| !s.is_terminal()) {
            assert!(state.can_transition_to(Denied), "{state} -> DENIED");
            assert!(state.can_transition_to(Expired), "{state} -> EXPIRED");
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for terminal in [TokenIssued, Denied, Expired] {
            for next in ALL {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn test_state_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&UserAuthenticated).unwrap(),
            "\"USER_AUTHENTICATED\""
        );
        assert_eq!(UserAuthenticated.to_string(), "USER_AUTHENTICATED");
    }
}

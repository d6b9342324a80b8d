use rand::rngs::OsRng;
use rand::RngCore;

use super::domain::{Application, ApplicationState, PaymentToken};

/// Bytes of entropy behind each payment link token (hex doubles this).
const TOKEN_BYTES: usize = 32;

/// Mints and validates single-use payment-authorization tokens.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenIssuer;

impl TokenIssuer {
    /// Generate a fresh token. Called only from inside the approve
    /// transition; the token is persisted on the application record.
    pub fn mint(&self) -> PaymentToken {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        PaymentToken(hex::encode(bytes))
    }

    /// Check `candidate` against the token stored on `application`.
    ///
    /// Succeeds only while the application is exactly `approved`; a
    /// completed application fails with `NotApproved` even when the
    /// stored token still matches, so consumed links cannot be replayed.
    pub fn validate(&self, application: &Application, candidate: &str) -> Result<(), TokenError> {
        if application.state != ApplicationState::Approved {
            return Err(TokenError::NotApproved {
                state: application.state,
            });
        }

        match &application.payment_link_token {
            Some(token) if token.matches(candidate) => Ok(()),
            _ => Err(TokenError::Mismatch),
        }
    }
}

/// Distinct failure signals so the payment UI can tell an expired link
/// from an already-completed application.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("application not found")]
    ApplicationNotFound,
    #[error("application is '{}', not approved", state.label())]
    NotApproved { state: ApplicationState },
    #[error("payment token does not match")]
    Mismatch,
}

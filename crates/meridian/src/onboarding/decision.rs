use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::domain::{Application, ApplicationId, ApplicationState, Decision};
use super::notify::{NotificationEvent, NotificationSink};
use super::store::{ApplicationPatch, ApplicationStore, StoreError, TokenPatch};
use super::token::TokenIssuer;
use crate::config::PaymentConfig;

/// Enforces the staff half of the application state machine.
///
/// The only transitions here are `pending -> approved` and
/// `pending -> denied`; `approved -> payment_complete` belongs to the
/// payment event processor. Both moves go through the store's
/// compare-and-swap, so a duplicate or racing decision loses the swap
/// and surfaces as [`DecisionError::InvalidTransition`] without
/// mutating anything or re-issuing a token.
pub struct DecisionEngine<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    issuer: TokenIssuer,
    payment: PaymentConfig,
}

impl<S, N> DecisionEngine<S, N>
where
    S: ApplicationStore + 'static,
    N: NotificationSink + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>, payment: PaymentConfig) -> Self {
        Self {
            store,
            notifier,
            issuer: TokenIssuer,
            payment,
        }
    }

    pub fn decide(
        &self,
        id: &ApplicationId,
        decision: Decision,
        notes: Option<String>,
    ) -> Result<Application, DecisionError> {
        // Fetch first so NotFound is reported ahead of any state check.
        let current = self.store.get(id)?.ok_or(DecisionError::NotFound)?;
        if current.state != ApplicationState::Pending {
            return Err(DecisionError::InvalidTransition {
                from: current.state,
            });
        }

        let now = Utc::now();
        let (patch, payment_url) = match decision {
            Decision::Approve => {
                let token = self.issuer.mint();
                let payment_url = self.payment.payment_url(&id.0, &token.0);
                let patch = ApplicationPatch {
                    state: Some(ApplicationState::Approved),
                    token: TokenPatch::Set(token),
                    payment_link_sent_at: Some(now),
                    reviewed_at: Some(now),
                    review_notes: notes,
                    profile_id: None,
                };
                (patch, Some(payment_url))
            }
            Decision::Deny => {
                let patch = ApplicationPatch {
                    state: Some(ApplicationState::Denied),
                    token: TokenPatch::Keep,
                    payment_link_sent_at: None,
                    reviewed_at: Some(now),
                    review_notes: notes,
                    profile_id: None,
                };
                (patch, None)
            }
        };

        let updated = match self
            .store
            .transition(id, ApplicationState::Pending, patch)
        {
            Ok(updated) => updated,
            // A concurrent decision won the swap between our read and write.
            Err(StoreError::StateConflict { actual }) => {
                return Err(DecisionError::InvalidTransition { from: actual });
            }
            Err(other) => return Err(other.into()),
        };

        info!(
            application = %updated.id.0,
            state = updated.state.label(),
            "application decided"
        );

        let event = match payment_url {
            Some(payment_url) => NotificationEvent::Approved {
                summary: updated.summary(),
                payment_url,
            },
            None => NotificationEvent::Denied(updated.summary()),
        };
        if let Err(err) = self.notifier.notify(event) {
            warn!(application = %updated.id.0, error = %err, "decision notification failed");
        }

        Ok(updated)
    }
}

/// Error raised by the decision engine.
#[derive(Debug, thiserror::Error)]
pub enum DecisionError {
    #[error("application not found")]
    NotFound,
    #[error("application already decided (state '{}')", from.label())]
    InvalidTransition { from: ApplicationState },
    #[error(transparent)]
    Store(#[from] StoreError),
}

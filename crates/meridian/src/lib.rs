//! Partner application lifecycle and payment activation for the Meridian
//! music distribution service.
//!
//! The [`onboarding`] module carries the business core: the application
//! store contract, the staff decision state machine, single-use payment
//! tokens, checkout session orchestration, and the idempotent payment
//! event processor. Everything that talks to the outside world (storage,
//! email, chat, identity, the payment provider) is a trait so the core
//! can be exercised in isolation.

pub mod config;
pub mod error;
pub mod onboarding;
pub mod telemetry;

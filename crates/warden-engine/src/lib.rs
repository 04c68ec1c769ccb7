//! Warden Engine - the decision pipeline.
//!
//! [`DecisionEngine::decide`] is the single entry point every proposed
//! action flows through:
//!
//! 1. input filter (policy pre-stage)
//! 2. capability-token authorization
//! 3. rule evaluation, `block` → `ask` → `allow`, permit by default
//! 4. spend-cap enforcement
//! 5. chaos injection
//! 6. consent parking for `ask` verdicts
//!
//! The engine owns no durable state; it layers the policy resolver, token
//! store, spend ledger, input filter, chaos injector, and consent broker.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod chaos;
pub mod consent;
pub mod engine;
pub mod filter;
pub mod ledger;

pub use chaos::{ChaosInjector, ChaosRoll, ChaosStats};
pub use consent::{ConsentBroker, ConsentError, ConsentVerdict, WaitOutcome};
pub use engine::{DecisionEngine, PolicyTestReport};
pub use filter::{InputFilter, Redaction, ScanReport};
pub use ledger::{AgentSpendSummary, SpendLedger};

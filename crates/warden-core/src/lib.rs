//! Warden Core - Foundation types for the agent-governance daemon.
//!
//! This crate provides:
//! - Opaque identifiers for agents, events, and subscriptions
//! - Millisecond-precision timestamps with monotonic assignment
//! - The [`ActionEvent`] record agents submit for review
//! - The [`Decision`] shape the daemon answers with
//! - The anchored `*`-glob matcher every rule and scope check builds on
//! - The authoritative scope taxonomy

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod decision;
pub mod event;
pub mod glob;
pub mod scopes;
pub mod types;

pub use decision::{Decision, DecisionSource, LimitInfo, PolicyMatch, SpendCategory, Timeframe};
pub use event::{ActionDraft, ActionEvent};
pub use glob::glob_match;
pub use scopes::scope_catalog;
pub use types::{AgentId, EventId, MonotonicClock, SubscriptionId, Timestamp, Verdict};

//! Warden Tokens - short-lived scoped capability tokens.
//!
//! A token authorizes exactly the intents its scope globs match. Lifecycle:
//! created → (paused ↔ active)* → revoked or expired. `paused` is
//! reversible, `revoked` is terminal, and expiry is indistinguishable from
//! never-issued to external callers.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod store;
pub mod token;

pub use error::{TokenError, TokenResult};
pub use store::{IssueRequest, TokenStore};
pub use token::{Introspection, Token, TokenStatus};

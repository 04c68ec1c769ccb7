//! Warden Events - fan-out of journal records to live subscribers.
//!
//! Two delivery paths:
//!
//! - [`FanoutBus`] — in-process broadcast to WebSocket subscriptions. Each
//!   subscription has a bounded queue; a subscriber that falls too far
//!   behind is closed and expected to reconnect and resync via the
//!   journal's tail cursor.
//! - [`WebhookDispatcher`] — best-effort HTTP POST to configured webhook
//!   URLs with exponential back-off and optional HMAC signatures.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod bus;
pub mod webhook;

pub use bus::{DEFAULT_SUBSCRIPTION_CAPACITY, EventStream, FanoutBus};
pub use webhook::{WebhookDispatcher, WebhookStore, WebhookTarget, signature};

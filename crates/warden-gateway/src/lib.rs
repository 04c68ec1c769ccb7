//! Warden Gateway - the daemon's HTTP/WS surface.
//!
//! Thin adapter between the wire protocol and the internal subsystems:
//! API-key authentication, request shaping, and the background tasks that
//! keep templates fresh, consent tickets expiring, and webhooks flowing.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod state;

pub use bootstrap::{BootError, build_app_state, spawn_background_tasks};
pub use config::{ConfigIssue, ConfigSeverity, WardenConfig};
pub use state::AppState;

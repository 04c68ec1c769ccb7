//! Shared application state for the HTTP surface.

use std::sync::Arc;

use warden_core::MonotonicClock;
use warden_engine::DecisionEngine;
use warden_events::{FanoutBus, WebhookStore};
use warden_journal::{Journal, JournalRecord};
use warden_policy::{RoleResolver, TemplateStore};
use warden_tokens::TokenStore;

use crate::config::WardenConfig;

/// Everything a request handler can reach. Cheap to clone; all fields are
/// shared references.
#[derive(Clone)]
pub struct AppState {
    /// Daemon configuration.
    pub config: Arc<WardenConfig>,
    /// The decision pipeline.
    pub engine: Arc<DecisionEngine>,
    /// Template store (hot-reloaded).
    pub templates: Arc<TemplateStore>,
    /// Role resolver.
    pub resolver: Arc<RoleResolver>,
    /// Token store.
    pub tokens: Arc<TokenStore>,
    /// The append-only timeline.
    pub journal: Arc<Journal>,
    /// Live fan-out.
    pub bus: Arc<FanoutBus>,
    /// Configured webhook targets.
    pub webhooks: Arc<WebhookStore>,
    /// Daemon-assigned timestamps.
    pub clock: Arc<MonotonicClock>,
    /// SHA-256 digests of the accepted API keys. Empty means dev mode.
    pub api_key_hashes: Arc<Vec<[u8; 32]>>,
}

impl AppState {
    /// Append a record to the journal and fan it out to subscribers and
    /// webhooks. Returns the cursor, or the journal error when the write
    /// failed (in which case nothing was broadcast).
    pub fn record(&self, record: JournalRecord) -> Result<u64, warden_journal::JournalError> {
        let cursor = self.journal.append(record.clone())?;
        self.bus
            .publish(warden_journal::SequencedRecord { cursor, record });
        Ok(cursor)
    }
}

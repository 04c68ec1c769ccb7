//! Subsystem wiring and background-task spawning.
//!
//! `serve` and the test harness share this boot path so both get the full
//! runtime: storage, templates, roles, tokens, the decision engine, the
//! journal, and fan-out.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use warden_core::MonotonicClock;
use warden_engine::{ChaosInjector, ConsentBroker, DecisionEngine, SpendLedger};
use warden_events::{FanoutBus, WebhookDispatcher, WebhookStore};
use warden_journal::{Journal, JournalRecord};
use warden_policy::{RoleResolver, TemplateStore, spawn_template_watcher};
use warden_storage::{KvStore, MemoryKvStore, SledKvStore};
use warden_tokens::TokenStore;

use crate::auth;
use crate::config::{ConfigSeverity, WardenConfig};
use crate::state::AppState;

/// Boot failures, classified for the daemon's exit codes.
#[derive(Debug, Error)]
pub enum BootError {
    /// Bad configuration or unreadable template directory (exit code 2).
    #[error("config error: {0}")]
    Config(String),

    /// The KV store or journal could not be opened (exit code 3).
    #[error("storage error: {0}")]
    Storage(String),
}

/// Validate config, initialize every subsystem, and return a fully wired
/// [`AppState`] plus the webhook delivery queue receiver.
///
/// # Errors
///
/// Returns [`BootError::Config`] for validation errors and an unreadable
/// template directory, [`BootError::Storage`] when durable state cannot be
/// opened.
pub async fn build_app_state(
    config: Arc<WardenConfig>,
) -> Result<
    (
        AppState,
        mpsc::Receiver<Arc<warden_journal::SequencedRecord>>,
    ),
    BootError,
> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => warn!("config: {issue}"),
            ConfigSeverity::Error => error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        return Err(BootError::Config(format!(
            "configuration has {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        )));
    }

    // ── Durable state ────────────────────────────────────────────────
    let kv: Arc<dyn KvStore> = if config.storage.ephemeral {
        info!("ephemeral mode: all state in memory");
        Arc::new(MemoryKvStore::new())
    } else {
        std::fs::create_dir_all(&config.storage.data_dir)
            .map_err(|e| BootError::Storage(format!("cannot create data dir: {e}")))?;
        let store = SledKvStore::open(config.storage.kv_dir())
            .map_err(|e| BootError::Storage(e.to_string()))?;
        Arc::new(store)
    };

    let journal = if config.storage.ephemeral {
        Arc::new(Journal::in_memory())
    } else {
        Arc::new(
            Journal::open(config.storage.journal_dir())
                .map_err(|e| BootError::Storage(e.to_string()))?,
        )
    };
    info!(records = journal.len(), "journal ready");

    // ── Templates ────────────────────────────────────────────────────
    let templates = Arc::new(TemplateStore::new());
    if !config.storage.ephemeral {
        let template_dir = config.storage.template_dir();
        std::fs::create_dir_all(&template_dir)
            .map_err(|e| BootError::Config(format!("template directory unusable: {e}")))?;
        let loaded = templates
            .load_dir(&template_dir)
            .map_err(|e| BootError::Config(format!("template directory unreadable: {e}")))?;
        info!(count = loaded, dir = %template_dir.display(), "templates loaded");
    }

    // ── Roles ────────────────────────────────────────────────────────
    let resolver = Arc::new(RoleResolver::with_store(Arc::clone(&kv)));
    resolver
        .load(&templates)
        .await
        .map_err(|e| BootError::Storage(e.to_string()))?;

    // ── Tokens ───────────────────────────────────────────────────────
    let tokens = Arc::new(
        TokenStore::with_store(Arc::clone(&kv))
            .with_max_duration_secs(config.tokens.max_duration_secs),
    );
    tokens
        .load()
        .await
        .map_err(|e| BootError::Storage(e.to_string()))?;

    // ── Webhooks ─────────────────────────────────────────────────────
    let webhooks = Arc::new(WebhookStore::with_store(Arc::clone(&kv)));
    webhooks
        .load()
        .await
        .map_err(|e| BootError::Storage(e.to_string()))?;

    // ── Decision pipeline ────────────────────────────────────────────
    let consent = Arc::new(ConsentBroker::with_limits(
        Duration::from_secs(config.consent.default_timeout_secs),
        config.consent.max_pending_per_agent,
    ));
    let engine = Arc::new(DecisionEngine::new(
        Arc::clone(&resolver),
        Arc::clone(&tokens),
        Arc::new(SpendLedger::new()),
        Arc::new(ChaosInjector::new()),
        consent,
    ));

    // ── Fan-out ──────────────────────────────────────────────────────
    let (webhook_tx, webhook_rx) = mpsc::channel(config.events.webhook_queue_capacity);
    let bus = Arc::new(
        FanoutBus::with_capacity(config.events.subscription_capacity)
            .with_webhook_queue(webhook_tx),
    );

    let api_key_hashes = Arc::new(auth::hash_keys(&config.server.api_keys));

    Ok((
        AppState {
            config,
            engine,
            templates,
            resolver,
            tokens,
            journal,
            bus,
            webhooks,
            clock: Arc::new(MonotonicClock::new()),
            api_key_hashes,
        },
        webhook_rx,
    ))
}

/// Spawn the daemon's background tasks: template hot reload, consent
/// expiry (journaling each timeout), webhook delivery, and token sweeping.
#[must_use]
pub fn spawn_background_tasks(
    state: &AppState,
    webhook_rx: mpsc::Receiver<Arc<warden_journal::SequencedRecord>>,
) -> Vec<JoinHandle<()>> {
    let mut tasks = Vec::new();

    // Template hot reload (disk mode only).
    if !state.config.storage.ephemeral {
        match spawn_template_watcher(
            Arc::clone(&state.templates),
            &state.config.storage.template_dir(),
        ) {
            Ok(handle) => tasks.push(handle),
            Err(e) => warn!(error = %e, "template watcher unavailable, hot reload disabled"),
        }
    }

    // Consent expiry: every timed-out ticket becomes a journaled
    // block/timeout decision, fanned out like any other.
    {
        let state = state.clone();
        let interval = Duration::from_secs(state.config.consent.sweep_interval_secs.max(1));
        tasks.push(tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                for event_id in state.engine.consent().sweep() {
                    let record = JournalRecord::Decision {
                        id: event_id,
                        ts: state.clock.now(),
                        status: warden_core::Verdict::Block,
                        reason: Some("timeout".to_string()),
                    };
                    if let Err(e) = state.record(record) {
                        warn!(error = %e, "journal append failed for timeout decision");
                    }
                }
            }
        }));
    }

    // Webhook delivery.
    {
        let dispatcher = WebhookDispatcher::new(Arc::clone(&state.webhooks));
        tasks.push(tokio::spawn(dispatcher.run(webhook_rx)));
    }

    // Token expiry sweep.
    {
        let tokens = Arc::clone(&state.tokens);
        tasks.push(tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(3600));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                match tokens.sweep_expired().await {
                    Ok(0) => {},
                    Ok(count) => info!(count, "expired tokens swept"),
                    Err(e) => warn!(error = %e, "token sweep failed"),
                }
            }
        }));
    }

    tasks
}

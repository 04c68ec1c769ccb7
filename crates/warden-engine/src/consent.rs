//! The ask/consent rendezvous.
//!
//! An `ask` verdict parks the event as a ticket keyed by event id. Agents
//! long-poll [`ConsentBroker::wait`]; a human (via the dashboard) settles the
//! ticket through [`ConsentBroker::decide`]. A ticket accepts exactly one
//! verdict; every concurrent waiter sees the same one. A background sweep
//! finalizes overdue tickets as `block`/timeout.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use warden_core::{AgentId, EventId, Timestamp, Verdict};
use warden_tokens::Token;

/// Default ceiling on how long a ticket stays pending: two minutes.
pub const DEFAULT_TICKET_TIMEOUT: Duration = Duration::from_secs(120);

/// Default bound on outstanding tickets per agent.
pub const DEFAULT_MAX_PENDING_PER_AGENT: usize = 32;

/// How long settled tickets stay queryable before the sweep drops them.
const DECIDED_RETENTION: Duration = Duration::from_secs(600);

/// The human's answer to a parked `ask`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentVerdict {
    /// `allow` or `block`; never `ask`.
    pub status: Verdict,
    /// A capability token granted alongside an allow, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<Token>,
    /// Why the verdict happened (e.g. `timeout`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// What a waiter gets back.
#[derive(Debug, Clone)]
pub enum WaitOutcome {
    /// The ticket was settled while we waited (or already was).
    Decided(ConsentVerdict),
    /// The caller's own deadline fired first. The ticket stays pending.
    CallerTimeout,
}

/// Consent errors.
#[derive(Debug, Error)]
pub enum ConsentError {
    /// No ticket exists for this event id.
    #[error("no pending approval for this event")]
    NotFound,

    /// The ticket was already settled with a different verdict.
    #[error("approval already decided")]
    AlreadyDecided,

    /// The agent has too many outstanding tickets.
    #[error("too many pending approvals for agent")]
    Overloaded,

    /// `ask` is not a verdict a human can hand back.
    #[error("consent verdict must be allow or block")]
    InvalidVerdict,
}

struct Ticket {
    agent: AgentId,
    intent: String,
    created_at: Timestamp,
    deadline: DateTime<Utc>,
    settled_at: Option<DateTime<Utc>>,
    sender: watch::Sender<Option<ConsentVerdict>>,
}

impl Ticket {
    fn is_pending(&self) -> bool {
        self.settled_at.is_none()
    }
}

/// Parks `ask` decisions and rendezvouses them with human verdicts.
pub struct ConsentBroker {
    tickets: DashMap<EventId, Ticket>,
    ticket_timeout: Duration,
    max_pending_per_agent: usize,
}

impl ConsentBroker {
    /// Create a broker with the default timeout and per-agent bound.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_TICKET_TIMEOUT, DEFAULT_MAX_PENDING_PER_AGENT)
    }

    /// Create a broker with explicit limits.
    #[must_use]
    pub fn with_limits(ticket_timeout: Duration, max_pending_per_agent: usize) -> Self {
        Self {
            tickets: DashMap::new(),
            ticket_timeout,
            max_pending_per_agent,
        }
    }

    /// The configured ticket timeout.
    #[must_use]
    pub fn ticket_timeout(&self) -> Duration {
        self.ticket_timeout
    }

    /// Park an event awaiting consent. Idempotent per event id.
    ///
    /// # Errors
    ///
    /// Returns [`ConsentError::Overloaded`] when the agent already has the
    /// maximum number of pending tickets.
    pub fn park(
        &self,
        event_id: &EventId,
        agent: &AgentId,
        intent: &str,
    ) -> Result<(), ConsentError> {
        if self.tickets.contains_key(event_id) {
            return Ok(());
        }

        let pending = self.pending_count(agent);
        if pending >= self.max_pending_per_agent {
            warn!(agent = %agent, pending, "ask ticket bound reached");
            return Err(ConsentError::Overloaded);
        }

        let (sender, _) = watch::channel(None);
        let now = Utc::now();
        let timeout = ChronoDuration::from_std(self.ticket_timeout)
            .unwrap_or_else(|_| ChronoDuration::seconds(120));
        self.tickets.insert(
            event_id.clone(),
            Ticket {
                agent: agent.clone(),
                intent: intent.to_string(),
                created_at: Timestamp(now),
                deadline: now + timeout,
                settled_at: None,
                sender,
            },
        );
        debug!(event = %event_id, agent = %agent, "ask ticket parked");
        Ok(())
    }

    /// Wait for a ticket's verdict, bounded by the caller's own deadline.
    ///
    /// Multiple concurrent waiters all receive the same verdict. A caller
    /// timeout does not settle the ticket — the parked `ask` survives until
    /// a human decides it or the ticket deadline fires.
    ///
    /// # Errors
    ///
    /// Returns [`ConsentError::NotFound`] when no ticket exists for the id.
    pub async fn wait(
        &self,
        event_id: &EventId,
        caller_timeout: Option<Duration>,
    ) -> Result<WaitOutcome, ConsentError> {
        let mut receiver = {
            let ticket = self.tickets.get(event_id).ok_or(ConsentError::NotFound)?;
            if let Some(verdict) = ticket.sender.borrow().clone() {
                return Ok(WaitOutcome::Decided(verdict));
            }
            ticket.sender.subscribe()
        };

        let timeout = caller_timeout.unwrap_or(self.ticket_timeout);
        let settled = tokio::time::timeout(timeout, async {
            loop {
                if receiver.changed().await.is_err() {
                    // Sender dropped without a verdict; treat as caller timeout.
                    return None;
                }
                if let Some(verdict) = receiver.borrow().clone() {
                    return Some(verdict);
                }
            }
        })
        .await;

        match settled {
            Ok(Some(verdict)) => Ok(WaitOutcome::Decided(verdict)),
            Ok(None) | Err(_) => Ok(WaitOutcome::CallerTimeout),
        }
    }

    /// Settle a ticket with a human verdict.
    ///
    /// Exactly one verdict per ticket: a repeat with the same status is a
    /// no-op returning the original verdict, a repeat with a different
    /// status is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`ConsentError::NotFound`] for unknown tickets,
    /// [`ConsentError::InvalidVerdict`] for `ask`, and
    /// [`ConsentError::AlreadyDecided`] for a conflicting repeat.
    pub fn decide(
        &self,
        event_id: &EventId,
        status: Verdict,
        token: Option<Token>,
        reason: Option<String>,
    ) -> Result<ConsentVerdict, ConsentError> {
        if status == Verdict::Ask {
            return Err(ConsentError::InvalidVerdict);
        }

        let mut ticket = self.tickets.get_mut(event_id).ok_or(ConsentError::NotFound)?;

        if let Some(existing) = ticket.sender.borrow().clone() {
            if existing.status == status {
                return Ok(existing);
            }
            return Err(ConsentError::AlreadyDecided);
        }

        let verdict = ConsentVerdict {
            status,
            token,
            reason,
        };
        ticket.settled_at = Some(Utc::now());
        ticket.sender.send_replace(Some(verdict.clone()));
        info!(event = %event_id, status = %status, "ask ticket decided");
        Ok(verdict)
    }

    /// Pending tickets for one agent.
    #[must_use]
    pub fn pending_count(&self, agent: &AgentId) -> usize {
        self.tickets
            .iter()
            .filter(|entry| entry.is_pending() && &entry.agent == agent)
            .count()
    }

    /// All tickets, pending and recently settled.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    /// Whether the broker holds no tickets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    /// When a ticket was created, for introspection.
    #[must_use]
    pub fn created_at(&self, event_id: &EventId) -> Option<Timestamp> {
        self.tickets.get(event_id).map(|t| t.created_at)
    }

    /// The agent that parked a ticket, if the ticket exists.
    #[must_use]
    pub fn agent_of(&self, event_id: &EventId) -> Option<AgentId> {
        self.tickets.get(event_id).map(|t| t.agent.clone())
    }

    /// The intent a ticket was parked for, if the ticket exists.
    #[must_use]
    pub fn intent_of(&self, event_id: &EventId) -> Option<String> {
        self.tickets.get(event_id).map(|t| t.intent.clone())
    }

    /// The verdict a ticket settled with, if it has settled.
    #[must_use]
    pub fn verdict_of(&self, event_id: &EventId) -> Option<ConsentVerdict> {
        self.tickets
            .get(event_id)
            .and_then(|t| t.sender.borrow().clone())
    }

    /// One sweep: time out overdue pending tickets, drop stale settled ones.
    ///
    /// Returns the ids of the tickets that were just timed out, so the
    /// caller can journal and broadcast each `block`/timeout decision.
    pub fn sweep(&self) -> Vec<EventId> {
        let now = Utc::now();
        let overdue: Vec<EventId> = self
            .tickets
            .iter()
            .filter(|entry| entry.is_pending() && now >= entry.deadline)
            .map(|entry| entry.key().clone())
            .collect();

        let mut timed_out = Vec::with_capacity(overdue.len());
        for event_id in overdue {
            match self.decide(
                &event_id,
                Verdict::Block,
                None,
                Some("timeout".to_string()),
            ) {
                Ok(_) => timed_out.push(event_id),
                Err(e) => debug!(event = %event_id, error = %e, "sweep race on ticket"),
            }
        }

        let retention = ChronoDuration::from_std(DECIDED_RETENTION)
            .unwrap_or_else(|_| ChronoDuration::seconds(600));
        self.tickets.retain(|_, ticket| {
            ticket
                .settled_at
                .is_none_or(|settled| now - settled < retention)
        });

        if !timed_out.is_empty() {
            info!(count = timed_out.len(), "ask tickets expired");
        }
        timed_out
    }
}

impl Default for ConsentBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConsentBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsentBroker")
            .field("tickets", &self.tickets.len())
            .field("ticket_timeout", &self.ticket_timeout)
            .finish_non_exhaustive()
    }
}

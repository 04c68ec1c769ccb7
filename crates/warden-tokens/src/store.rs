//! The token store.

use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use warden_core::{AgentId, Timestamp};
use warden_storage::KvStore;

use crate::error::{TokenError, TokenResult};
use crate::token::{Introspection, Token, TokenStatus, generate_token_string};

/// KV namespace for persisted tokens.
const NS_TOKENS: &str = "tokens";

/// Default ceiling on token lifetimes: 30 days.
pub const DEFAULT_MAX_DURATION_SECS: u64 = 30 * 24 * 60 * 60;

/// Parameters for issuing a token.
#[derive(Debug, Clone)]
pub struct IssueRequest {
    /// The agent the token is for.
    pub agent: AgentId,
    /// Intent globs the token will authorize.
    pub scopes: Vec<String>,
    /// Requested lifetime in seconds.
    pub duration_secs: u64,
    /// Why the token is being issued.
    pub reason: String,
    /// Who is issuing it, if known.
    pub created_by: Option<String>,
    /// Free-form tags carried on the token.
    pub tags: BTreeMap<String, String>,
}

/// Issues and tracks capability tokens.
///
/// State transitions are linearizable per token: mutations go through the
/// owning map shard, so `authorize` observes either the pre- or the
/// post-transition token, never a torn one.
pub struct TokenStore {
    tokens: DashMap<String, Token>,
    store: Option<Arc<dyn KvStore>>,
    max_duration_secs: u64,
}

impl TokenStore {
    /// Create a store without persistence.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            tokens: DashMap::new(),
            store: None,
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
        }
    }

    /// Create a store that persists tokens through the given KV store.
    #[must_use]
    pub fn with_store(store: Arc<dyn KvStore>) -> Self {
        Self {
            tokens: DashMap::new(),
            store: Some(store),
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
        }
    }

    /// Override the lifetime ceiling.
    #[must_use]
    pub fn with_max_duration_secs(mut self, max_secs: u64) -> Self {
        self.max_duration_secs = max_secs;
        self
    }

    /// Load persisted tokens into the index. Expired tokens are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the KV store cannot be read.
    pub async fn load(&self) -> TokenResult<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };

        let mut restored = 0usize;
        for key in store.list_keys(NS_TOKENS).await? {
            let Some(bytes) = store.get(NS_TOKENS, &key).await? else {
                continue;
            };
            let token: Token =
                serde_json::from_slice(&bytes).map_err(|e| TokenError::Corrupt(e.to_string()))?;
            if token.is_expired() {
                let _ = store.delete(NS_TOKENS, &key).await;
                continue;
            }
            self.tokens.insert(token.token.clone(), token);
            restored = restored.saturating_add(1);
        }
        if restored > 0 {
            info!(count = restored, "tokens restored");
        }
        Ok(restored)
    }

    /// Issue a new token.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::DurationOutOfRange`] when the lifetime is zero
    /// or above the ceiling, [`TokenError::InvalidScope`] for an empty scope
    /// glob, or a storage error if persistence fails.
    pub async fn issue(&self, request: IssueRequest) -> TokenResult<Token> {
        if request.duration_secs == 0 || request.duration_secs > self.max_duration_secs {
            return Err(TokenError::DurationOutOfRange {
                max_secs: self.max_duration_secs,
                requested_secs: request.duration_secs,
            });
        }
        for scope in &request.scopes {
            if scope.is_empty() {
                return Err(TokenError::InvalidScope(scope.clone()));
            }
        }

        let now = Utc::now();
        #[allow(clippy::cast_possible_wrap)]
        let lifetime = Duration::seconds(request.duration_secs as i64);
        let token = Token {
            token: generate_token_string(),
            agent: request.agent,
            scopes: request.scopes,
            issued_at: Timestamp(now),
            expires_at: Timestamp(now + lifetime),
            status: TokenStatus::Active,
            reason: request.reason,
            created_by: request.created_by,
            tags: request.tags,
        };

        self.persist(&token).await?;
        debug!(agent = %token.agent, scopes = ?token.scopes, "token issued");
        self.tokens.insert(token.token.clone(), token.clone());
        Ok(token)
    }

    /// Inspect a presented token string.
    ///
    /// Unknown and expired tokens are indistinguishable: both answer
    /// `{active: false}` with no further detail.
    #[must_use]
    pub fn introspect(&self, token_str: &str) -> Introspection {
        let Some(token) = self.tokens.get(token_str) else {
            return Introspection::inactive();
        };
        if token.is_expired() {
            return Introspection::inactive();
        }
        Introspection {
            active: token.is_active(),
            agent: Some(token.agent.clone()),
            scopes: Some(token.scopes.clone()),
            expires_at: Some(token.expires_at),
            status: Some(token.status),
        }
    }

    /// Pause a token. Idempotent; pausing a revoked token fails.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::NotFound`] for unknown tokens or
    /// [`TokenError::Revoked`] for revoked ones.
    pub async fn pause(&self, token_str: &str) -> TokenResult<Token> {
        self.transition(token_str, TokenStatus::Paused).await
    }

    /// Resume a paused token. Idempotent on active tokens; fails on revoked.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::NotFound`] for unknown tokens or
    /// [`TokenError::Revoked`] for revoked ones.
    pub async fn resume(&self, token_str: &str) -> TokenResult<Token> {
        self.transition(token_str, TokenStatus::Active).await
    }

    /// Revoke a token. Terminal; revoking twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::NotFound`] for unknown tokens.
    pub async fn revoke(&self, token_str: &str) -> TokenResult<Token> {
        let updated = {
            let Some(mut entry) = self.tokens.get_mut(token_str) else {
                return Err(TokenError::NotFound);
            };
            entry.status = TokenStatus::Revoked;
            entry.clone()
        };
        self.persist(&updated).await?;
        info!(agent = %updated.agent, "token revoked");
        Ok(updated)
    }

    async fn transition(&self, token_str: &str, to: TokenStatus) -> TokenResult<Token> {
        let updated = {
            let Some(mut entry) = self.tokens.get_mut(token_str) else {
                return Err(TokenError::NotFound);
            };
            if entry.status == TokenStatus::Revoked {
                return Err(TokenError::Revoked);
            }
            entry.status = to;
            entry.clone()
        };
        self.persist(&updated).await?;
        Ok(updated)
    }

    /// Whether a presented token authorizes an intent right now.
    #[must_use]
    pub fn authorize(&self, token_str: &str, intent: &str) -> bool {
        self.tokens
            .get(token_str)
            .is_some_and(|token| token.authorizes(intent))
    }

    /// All non-expired tokens, newest first.
    #[must_use]
    pub fn list(&self) -> Vec<Token> {
        let mut all: Vec<Token> = self
            .tokens
            .iter()
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.clone())
            .collect();
        all.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        all
    }

    /// Drop expired tokens from the index and the backing store.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    pub async fn sweep_expired(&self) -> TokenResult<usize> {
        let expired: Vec<String> = self
            .tokens
            .iter()
            .filter(|entry| entry.is_expired())
            .map(|entry| entry.token.clone())
            .collect();

        for token_str in &expired {
            self.tokens.remove(token_str);
            if let Some(store) = &self.store {
                store.delete(NS_TOKENS, token_str).await?;
            }
        }
        Ok(expired.len())
    }

    async fn persist(&self, token: &Token) -> TokenResult<()> {
        if let Some(store) = &self.store {
            let bytes =
                serde_json::to_vec(token).map_err(|e| TokenError::Corrupt(e.to_string()))?;
            store.set(NS_TOKENS, &token.token, bytes).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("count", &self.tokens.len())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_storage::MemoryKvStore;

    fn request(agent: &str, scopes: &[&str], duration_secs: u64) -> IssueRequest {
        IssueRequest {
            agent: AgentId::new(agent),
            scopes: scopes.iter().map(|s| (*s).to_string()).collect(),
            duration_secs,
            reason: "test".to_string(),
            created_by: None,
            tags: BTreeMap::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Issue
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_issue_and_authorize() {
        let store = TokenStore::in_memory();
        let token = store
            .issue(request("c", &["calendar.read", "calendar.write", "email.send"], 3600))
            .await
            .unwrap();

        assert!(store.authorize(&token.token, "calendar.write"));
        assert!(store.authorize(&token.token, "email.send"));
        assert!(!store.authorize(&token.token, "slack.post"));
        assert!(!store.authorize("wdn_bogus", "calendar.write"));
    }

    #[tokio::test]
    async fn test_issue_rejects_bad_duration() {
        let store = TokenStore::in_memory();
        assert!(matches!(
            store.issue(request("a", &["*"], 0)).await,
            Err(TokenError::DurationOutOfRange { .. })
        ));
        assert!(matches!(
            store
                .issue(request("a", &["*"], DEFAULT_MAX_DURATION_SECS + 1))
                .await,
            Err(TokenError::DurationOutOfRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_issue_rejects_empty_scope() {
        let store = TokenStore::in_memory();
        assert!(matches!(
            store.issue(request("a", &[""], 60)).await,
            Err(TokenError::InvalidScope(_))
        ));
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_introspect_active() {
        let store = TokenStore::in_memory();
        let token = store.issue(request("a", &["llm.*"], 3600)).await.unwrap();

        let info = store.introspect(&token.token);
        assert!(info.active);
        assert_eq!(info.agent, Some(AgentId::new("a")));
        assert_eq!(info.status, Some(TokenStatus::Active));
    }

    #[tokio::test]
    async fn test_introspect_unknown_reveals_nothing() {
        let store = TokenStore::in_memory();
        let info = store.introspect("wdn_never_issued");
        assert!(!info.active);
        assert!(info.agent.is_none());
        assert!(info.scopes.is_none());
        assert!(info.status.is_none());
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_pause_resume_roundtrip() {
        let store = TokenStore::in_memory();
        let token = store.issue(request("a", &["*"], 3600)).await.unwrap();

        store.pause(&token.token).await.unwrap();
        assert!(!store.authorize(&token.token, "llm.chat"));
        assert_eq!(
            store.introspect(&token.token).status,
            Some(TokenStatus::Paused)
        );

        // Pause is idempotent.
        store.pause(&token.token).await.unwrap();

        store.resume(&token.token).await.unwrap();
        assert!(store.authorize(&token.token, "llm.chat"));
    }

    #[tokio::test]
    async fn test_revoke_is_terminal() {
        let store = TokenStore::in_memory();
        let token = store.issue(request("a", &["*"], 3600)).await.unwrap();

        store.revoke(&token.token).await.unwrap();
        assert!(!store.authorize(&token.token, "llm.chat"));

        // Revoking again is a no-op; resuming fails.
        store.revoke(&token.token).await.unwrap();
        assert!(matches!(
            store.resume(&token.token).await,
            Err(TokenError::Revoked)
        ));
        assert!(matches!(
            store.pause(&token.token).await,
            Err(TokenError::Revoked)
        ));
    }

    #[tokio::test]
    async fn test_unknown_token_transitions_fail() {
        let store = TokenStore::in_memory();
        assert!(matches!(
            store.pause("wdn_missing").await,
            Err(TokenError::NotFound)
        ));
        assert!(matches!(
            store.revoke("wdn_missing").await,
            Err(TokenError::NotFound)
        ));
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_tokens_survive_restart() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());

        let issued = {
            let store = TokenStore::with_store(Arc::clone(&kv));
            store.issue(request("a", &["slack.*"], 3600)).await.unwrap()
        };

        let store = TokenStore::with_store(kv);
        assert_eq!(store.load().await.unwrap(), 1);
        assert!(store.authorize(&issued.token, "slack.post"));
    }

    #[tokio::test]
    async fn test_revocation_survives_restart() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());

        let issued = {
            let store = TokenStore::with_store(Arc::clone(&kv));
            let t = store.issue(request("a", &["*"], 3600)).await.unwrap();
            store.revoke(&t.token).await.unwrap();
            t
        };

        let store = TokenStore::with_store(kv);
        store.load().await.unwrap();
        assert!(!store.authorize(&issued.token, "llm.chat"));
        assert!(matches!(
            store.resume(&issued.token).await,
            Err(TokenError::Revoked)
        ));
    }

    // -----------------------------------------------------------------------
    // Listing & sweep
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_list_newest_first() {
        let store = TokenStore::in_memory();
        store.issue(request("a", &["*"], 3600)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = store.issue(request("b", &["*"], 3600)).await.unwrap();

        let listed = store.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].token, second.token);
    }

    #[tokio::test]
    async fn test_sweep_expired() {
        let store = TokenStore::in_memory().with_max_duration_secs(u64::MAX / 2);
        let token = store.issue(request("a", &["*"], 1)).await.unwrap();

        // Force expiry by rewriting the entry's expiry into the past.
        if let Some(mut t) = store.tokens.get_mut(&token.token) {
            t.expires_at = Timestamp(Utc::now() - Duration::seconds(5));
        }

        assert_eq!(store.sweep_expired().await.unwrap(), 1);
        assert!(store.list().is_empty());
        assert!(!store.introspect(&token.token).active);
    }
}

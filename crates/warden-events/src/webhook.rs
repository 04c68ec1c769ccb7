//! Webhook targets and best-effort delivery.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use warden_journal::SequencedRecord;
use warden_storage::{KvStore, StorageResult};

/// KV namespace for persisted webhook targets.
const NS_WEBHOOKS: &str = "webhooks";

/// Base delay for delivery retries.
const RETRY_BASE: Duration = Duration::from_secs(1);

/// Attempts per delivery before giving up on a record.
const MAX_ATTEMPTS: u32 = 5;

/// A configured webhook endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookTarget {
    /// Where to POST.
    pub url: String,
    /// HMAC-SHA256 secret; deliveries are signed when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

/// Compute the signature header value for a payload: `sha256=<hex>`.
#[must_use]
pub fn signature(secret: &str, payload: &[u8]) -> String {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac accepts any key length"));
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// The configured set of webhook targets, persisted across restarts.
pub struct WebhookStore {
    targets: RwLock<Vec<WebhookTarget>>,
    store: Option<Arc<dyn KvStore>>,
}

impl WebhookStore {
    /// Create a store without persistence.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            targets: RwLock::new(Vec::new()),
            store: None,
        }
    }

    /// Create a store persisting targets through the given KV store.
    #[must_use]
    pub fn with_store(store: Arc<dyn KvStore>) -> Self {
        Self {
            targets: RwLock::new(Vec::new()),
            store: Some(store),
        }
    }

    /// Load persisted targets.
    ///
    /// # Errors
    ///
    /// Returns an error if the KV store cannot be read.
    pub async fn load(&self) -> StorageResult<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let mut loaded = Vec::new();
        for key in store.list_keys(NS_WEBHOOKS).await? {
            if let Some(bytes) = store.get(NS_WEBHOOKS, &key).await? {
                match serde_json::from_slice::<WebhookTarget>(&bytes) {
                    Ok(target) => loaded.push(target),
                    Err(e) => warn!(url = %key, error = %e, "skipping corrupt webhook record"),
                }
            }
        }
        let count = loaded.len();
        *self.targets.write().unwrap_or_else(|e| e.into_inner()) = loaded;
        Ok(count)
    }

    /// Add (or update) a target. Idempotent per URL.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails; the in-memory set is then
    /// unchanged.
    pub async fn add(&self, target: WebhookTarget) -> StorageResult<()> {
        if let Some(store) = &self.store {
            let bytes = serde_json::to_vec(&target)
                .map_err(|e| warden_storage::StorageError::Backend(e.to_string()))?;
            store.set(NS_WEBHOOKS, &target.url, bytes).await?;
        }
        let mut targets = self.targets.write().unwrap_or_else(|e| e.into_inner());
        targets.retain(|t| t.url != target.url);
        targets.push(target);
        Ok(())
    }

    /// Remove a target by URL. Removing a missing URL is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails.
    pub async fn remove(&self, url: &str) -> StorageResult<()> {
        if let Some(store) = &self.store {
            store.delete(NS_WEBHOOKS, url).await?;
        }
        self.targets
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|t| t.url != url);
        Ok(())
    }

    /// The current targets.
    #[must_use]
    pub fn list(&self) -> Vec<WebhookTarget> {
        self.targets
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl std::fmt::Debug for WebhookStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookStore")
            .field("targets", &self.list().len())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

/// Consumes the delivery queue and POSTs records to every target.
///
/// Delivery is best-effort: each attempt backs off exponentially and gives
/// up after [`MAX_ATTEMPTS`]; a persistently failing webhook is logged and
/// stays configured.
pub struct WebhookDispatcher {
    client: reqwest::Client,
    store: Arc<WebhookStore>,
}

impl WebhookDispatcher {
    /// Create a dispatcher over the configured targets.
    #[must_use]
    pub fn new(store: Arc<WebhookStore>) -> Self {
        Self {
            client: reqwest::Client::new(),
            store,
        }
    }

    /// Run the delivery loop until the queue closes.
    pub async fn run(self, mut rx: mpsc::Receiver<Arc<SequencedRecord>>) {
        while let Some(record) = rx.recv().await {
            let targets = self.store.list();
            if targets.is_empty() {
                continue;
            }
            let Ok(payload) = serde_json::to_vec(record.as_ref()) else {
                continue;
            };
            for target in targets {
                self.deliver(&target, &payload).await;
            }
        }
        debug!("webhook queue closed, dispatcher stopping");
    }

    async fn deliver(&self, target: &WebhookTarget, payload: &[u8]) {
        let mut delay = RETRY_BASE;
        for attempt in 1..=MAX_ATTEMPTS {
            let mut request = self
                .client
                .post(&target.url)
                .header("content-type", "application/json")
                .body(payload.to_vec());
            if let Some(secret) = &target.secret {
                request = request.header("x-warden-signature", signature(secret, payload));
            }

            match request.send().await {
                Ok(response) if response.status().is_success() => return,
                Ok(response) => {
                    debug!(url = %target.url, status = %response.status(), attempt, "webhook rejected");
                },
                Err(e) => {
                    debug!(url = %target.url, error = %e, attempt, "webhook unreachable");
                },
            }

            if attempt < MAX_ATTEMPTS {
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
        }
        warn!(url = %target.url, "webhook delivery failed after retries, giving up on record");
    }
}

impl std::fmt::Debug for WebhookDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookDispatcher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_storage::MemoryKvStore;

    #[test]
    fn test_signature_is_stable_and_keyed() {
        let a = signature("secret", b"payload");
        let b = signature("secret", b"payload");
        assert_eq!(a, b);
        assert!(a.starts_with("sha256="));

        assert_ne!(signature("secret", b"payload"), signature("other", b"payload"));
        assert_ne!(signature("secret", b"payload"), signature("secret", b"other"));
    }

    #[tokio::test]
    async fn test_add_remove_list() {
        let store = WebhookStore::in_memory();
        store
            .add(WebhookTarget {
                url: "https://example.com/hook".to_string(),
                secret: None,
            })
            .await
            .unwrap();
        store
            .add(WebhookTarget {
                url: "https://example.com/hook".to_string(),
                secret: Some("s".to_string()),
            })
            .await
            .unwrap();

        // Same URL replaces rather than duplicating.
        let targets = store.list();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].secret.as_deref(), Some("s"));

        store.remove("https://example.com/hook").await.unwrap();
        assert!(store.list().is_empty());
        // Removing again is not an error.
        store.remove("https://example.com/hook").await.unwrap();
    }

    #[tokio::test]
    async fn test_targets_survive_restart() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());

        {
            let store = WebhookStore::with_store(Arc::clone(&kv));
            store
                .add(WebhookTarget {
                    url: "https://example.com/a".to_string(),
                    secret: Some("k".to_string()),
                })
                .await
                .unwrap();
        }

        let store = WebhookStore::with_store(kv);
        assert_eq!(store.load().await.unwrap(), 1);
        assert_eq!(store.list()[0].url, "https://example.com/a");
    }
}

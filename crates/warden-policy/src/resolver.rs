//! The role resolver: binds agents to templates plus overrides.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use warden_core::{AgentId, Timestamp};
use warden_storage::KvStore;

use crate::error::{PolicyError, PolicyResult};
use crate::policy::{ChaosConfig, FilterLevel, ResolvedPolicy, SpendLimits};
use crate::rule::Rule;
use crate::store::TemplateStore;
use crate::template::Template;

/// KV namespace for durable role assignments.
const NS_ROLES: &str = "roles";

/// Per-agent additions layered over a template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleOverrides {
    /// Extra allow rules.
    #[serde(default)]
    pub allow: Vec<String>,
    /// Extra ask rules.
    #[serde(default)]
    pub ask: Vec<String>,
    /// Extra block rules.
    #[serde(default)]
    pub block: Vec<String>,
    /// Replaces the template's limits when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<SpendLimits>,
    /// Replaces the template's chaos config when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chaos: Option<ChaosConfig>,
    /// Replaces the template's filter level when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterLevel>,
}

/// The durable record of one agent's binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleAssignment {
    /// The bound agent.
    pub agent: AgentId,
    /// Template name, if the binding names one.
    pub template: Option<String>,
    /// Per-agent overrides.
    pub overrides: RoleOverrides,
    /// When the binding was applied.
    pub applied_at: Timestamp,
}

/// Resolves and caches per-agent policies.
///
/// Rebinding swaps an `Arc` pointer, so concurrent readers observe either
/// the old or the new policy, never a mix. Assignments persist through the
/// KV store and are re-resolved against freshly loaded templates at startup.
pub struct RoleResolver {
    roles: RwLock<HashMap<AgentId, Arc<ResolvedPolicy>>>,
    store: Option<Arc<dyn KvStore>>,
}

impl RoleResolver {
    /// Create a resolver without persistence (tests, ephemeral runs).
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            roles: RwLock::new(HashMap::new()),
            store: None,
        }
    }

    /// Create a resolver that persists assignments to the given store.
    #[must_use]
    pub fn with_store(store: Arc<dyn KvStore>) -> Self {
        Self {
            roles: RwLock::new(HashMap::new()),
            store: Some(store),
        }
    }

    /// Re-resolve every persisted assignment against the current templates.
    ///
    /// Called once at startup, after the template directory has been read.
    /// An assignment naming a missing template resolves from its overrides
    /// alone, with a warning — the binding is not dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the KV store cannot be read.
    pub async fn load(&self, templates: &TemplateStore) -> PolicyResult<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };

        let mut restored = 0usize;
        for key in store.list_keys(NS_ROLES).await? {
            let Some(bytes) = store.get(NS_ROLES, &key).await? else {
                continue;
            };
            let assignment: RoleAssignment =
                serde_json::from_slice(&bytes).map_err(|e| PolicyError::CorruptAssignment {
                    agent: key.clone(),
                    reason: e.to_string(),
                })?;

            let template = match &assignment.template {
                Some(name) => {
                    let found = templates.get(name);
                    if found.is_none() {
                        warn!(agent = %assignment.agent, template = %name,
                              "assigned template missing at startup, resolving overrides only");
                    }
                    found
                },
                None => None,
            };

            let policy = resolve(
                template.as_deref(),
                assignment.template.clone(),
                &assignment.overrides,
            )?;
            self.roles
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .insert(assignment.agent.clone(), Arc::new(policy));
            restored = restored.saturating_add(1);
        }
        if restored > 0 {
            info!(count = restored, "role assignments restored");
        }
        Ok(restored)
    }

    /// Bind an agent to a template (by value) plus overrides, atomically
    /// replacing any previous binding.
    ///
    /// # Errors
    ///
    /// Returns an error if an override rule fails to parse or persistence
    /// fails. On persistence failure the in-memory binding is not applied.
    pub async fn apply(
        &self,
        agent: &AgentId,
        template: Option<&Template>,
        overrides: RoleOverrides,
    ) -> PolicyResult<Arc<ResolvedPolicy>> {
        let template_name = template.map(|t| t.name.clone());
        let policy = Arc::new(resolve(template, template_name.clone(), &overrides)?);

        if let Some(store) = &self.store {
            let assignment = RoleAssignment {
                agent: agent.clone(),
                template: template_name,
                overrides,
                applied_at: policy.resolved_at,
            };
            let bytes = serde_json::to_vec(&assignment).map_err(|e| {
                PolicyError::CorruptAssignment {
                    agent: agent.to_string(),
                    reason: e.to_string(),
                }
            })?;
            store.set(NS_ROLES, agent.as_str(), bytes).await?;
        }

        self.roles
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(agent.clone(), Arc::clone(&policy));
        Ok(policy)
    }

    /// The resolved policy for an agent, if one is bound.
    #[must_use]
    pub fn get(&self, agent: &AgentId) -> Option<Arc<ResolvedPolicy>> {
        self.roles
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(agent)
            .cloned()
    }

    /// All bindings, sorted by agent id.
    #[must_use]
    pub fn list(&self) -> Vec<(AgentId, Arc<ResolvedPolicy>)> {
        let roles = self.roles.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<_> = roles
            .iter()
            .map(|(agent, policy)| (agent.clone(), Arc::clone(policy)))
            .collect();
        all.sort_by(|(a, _), (b, _)| a.as_str().cmp(b.as_str()));
        all
    }
}

impl std::fmt::Debug for RoleResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.roles.read().map(|r| r.len()).unwrap_or(0);
        f.debug_struct("RoleResolver")
            .field("bound_agents", &count)
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

/// Merge a template and overrides into a flat policy.
///
/// Rule lists are the union of template rules then override rules, with
/// duplicates dropped and order otherwise preserved. `limits`, `chaos`, and
/// `filter` come from the overrides when present, else the template.
fn resolve(
    template: Option<&Template>,
    template_name: Option<String>,
    overrides: &RoleOverrides,
) -> PolicyResult<ResolvedPolicy> {
    let merge = |base: Option<&Vec<String>>, extra: &[String]| -> PolicyResult<(Vec<Rule>, usize)> {
        let mut rules: Vec<Rule> = Vec::new();
        for raw in base.into_iter().flatten() {
            let rule = Rule::parse(raw.clone())?;
            if !rules.contains(&rule) {
                rules.push(rule);
            }
        }
        let template_count = rules.len();
        for raw in extra {
            let rule = Rule::parse(raw.clone())?;
            if !rules.contains(&rule) {
                rules.push(rule);
            }
        }
        Ok((rules, template_count))
    };

    let (allow, allow_count) = merge(template.map(|t| &t.allow), &overrides.allow)?;
    let (ask, ask_count) = merge(template.map(|t| &t.ask), &overrides.ask)?;
    let (block, block_count) = merge(template.map(|t| &t.block), &overrides.block)?;

    Ok(ResolvedPolicy {
        allow,
        ask,
        block,
        limits: overrides
            .limits
            .clone()
            .or_else(|| template.and_then(|t| t.limits.clone())),
        chaos: overrides
            .chaos
            .clone()
            .or_else(|| template.and_then(|t| t.chaos.clone())),
        filter: overrides.filter.or_else(|| template.and_then(|t| t.filter)),
        template: template_name,
        resolved_at: Timestamp::now(),
        template_counts: crate::policy::TemplateCounts {
            allow: allow_count,
            ask: ask_count,
            block: block_count,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_storage::MemoryKvStore;

    fn template(yaml: &str) -> Template {
        crate::template::validate(yaml).parsed.expect("valid template")
    }

    #[tokio::test]
    async fn test_merge_union_dedup_order() {
        let resolver = RoleResolver::in_memory();
        let t = template("name: base\nallow: [llm.chat, calendar.read]\nask: [email.send:*]\n");
        let overrides = RoleOverrides {
            allow: vec!["calendar.read".to_string(), "slack.read".to_string()],
            ..RoleOverrides::default()
        };

        let policy = resolver
            .apply(&AgentId::new("a"), Some(&t), overrides)
            .await
            .unwrap();

        let allow: Vec<_> = policy.allow.iter().map(Rule::signature).collect();
        assert_eq!(allow, vec!["llm.chat", "calendar.read", "slack.read"]);
        assert_eq!(policy.template.as_deref(), Some("base"));
    }

    #[tokio::test]
    async fn test_override_limits_win() {
        let resolver = RoleResolver::in_memory();
        let t = template("name: base\nlimits:\n  llm_daily_usd: 10.0\n");

        let policy = resolver
            .apply(
                &AgentId::new("a"),
                Some(&t),
                RoleOverrides {
                    limits: Some(SpendLimits {
                        llm_daily_usd: Some(1.0),
                        ..SpendLimits::default()
                    }),
                    ..RoleOverrides::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(policy.limits.clone().unwrap().llm_daily_usd, Some(1.0));

        // Without overrides, the template's limits apply.
        let policy = resolver
            .apply(&AgentId::new("b"), Some(&t), RoleOverrides::default())
            .await
            .unwrap();
        assert_eq!(policy.limits.clone().unwrap().llm_daily_usd, Some(10.0));
    }

    #[tokio::test]
    async fn test_rebind_replaces_atomically() {
        let resolver = RoleResolver::in_memory();
        let agent = AgentId::new("a");
        let t1 = template("name: one\nallow: [llm.chat]\n");
        let t2 = template("name: two\nblock: [llm.chat]\n");

        resolver
            .apply(&agent, Some(&t1), RoleOverrides::default())
            .await
            .unwrap();
        let before = resolver.get(&agent).unwrap();

        resolver
            .apply(&agent, Some(&t2), RoleOverrides::default())
            .await
            .unwrap();
        let after = resolver.get(&agent).unwrap();

        assert_eq!(before.template.as_deref(), Some("one"));
        assert_eq!(after.template.as_deref(), Some("two"));
        assert!(after.allow.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_override_rule_rejected() {
        let resolver = RoleResolver::in_memory();
        let result = resolver
            .apply(
                &AgentId::new("a"),
                None,
                RoleOverrides {
                    block: vec![":*".to_string()],
                    ..RoleOverrides::default()
                },
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_assignments_survive_restart() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let templates = TemplateStore::new();

        {
            let resolver = RoleResolver::with_store(Arc::clone(&kv));
            let t = template("name: base\nask: [slack.post:*]\n");
            resolver
                .apply(&AgentId::new("a"), Some(&t), RoleOverrides::default())
                .await
                .unwrap();
        }

        // "Restart": a fresh resolver over the same store. The template is
        // gone from the (empty) template store, so only overrides resolve,
        // but the binding itself survives.
        let resolver = RoleResolver::with_store(kv);
        let restored = resolver.load(&templates).await.unwrap();
        assert_eq!(restored, 1);
        let policy = resolver.get(&AgentId::new("a")).unwrap();
        assert_eq!(policy.template.as_deref(), Some("base"));
        assert!(policy.ask.is_empty());
    }

    #[tokio::test]
    async fn test_list_sorted_by_agent() {
        let resolver = RoleResolver::in_memory();
        for agent in ["zeta", "alpha"] {
            resolver
                .apply(&AgentId::new(agent), None, RoleOverrides::default())
                .await
                .unwrap();
        }
        let agents: Vec<_> = resolver
            .list()
            .into_iter()
            .map(|(a, _)| a.to_string())
            .collect();
        assert_eq!(agents, vec!["alpha", "zeta"]);
    }
}

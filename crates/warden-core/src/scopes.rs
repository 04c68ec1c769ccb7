//! The authoritative scope taxonomy.
//!
//! Token scopes and rule intents draw from this catalog. The catalog is
//! advisory — unknown intents still flow through the policy engine — but
//! `GET /scopes` exposes it so clients can present a consistent picker.

/// Known intent scopes and their descriptions, in display order.
pub const SCOPE_CATALOG: &[(&str, &str)] = &[
    ("llm.chat", "Send a chat completion request to a language model"),
    ("llm.embed", "Compute embeddings with a language model"),
    ("email.send", "Send an email on the operator's behalf"),
    ("email.read", "Read from the operator's mailbox"),
    ("slack.post", "Post a message to a chat channel"),
    ("slack.read", "Read messages from a chat channel"),
    ("http.request", "Perform an outbound HTTP request"),
    ("file.read", "Read a file from the workspace"),
    ("file.write", "Write or modify a file in the workspace"),
    ("exec.run", "Execute a local command"),
    ("calendar.read", "Read calendar entries"),
    ("calendar.write", "Create or modify calendar entries"),
    ("payment.charge", "Initiate a payment"),
];

/// The scope catalog as `(id, description)` pairs.
#[must_use]
pub fn scope_catalog() -> &'static [(&'static str, &'static str)] {
    SCOPE_CATALOG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_ids_are_dotted_and_unique() {
        let mut seen = std::collections::HashSet::new();
        for (id, desc) in scope_catalog() {
            assert!(id.contains('.'), "scope {id} is not dotted");
            assert!(!desc.is_empty());
            assert!(seen.insert(*id), "duplicate scope {id}");
        }
    }
}

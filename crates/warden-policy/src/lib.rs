//! Warden Policy - rules, templates, and role resolution.
//!
//! Three layers, leaf-first:
//!
//! - [`Rule`] — the `intent_glob[:target_glob]` grammar and its matcher
//! - [`TemplateStore`] — named policy templates loaded from a watched
//!   directory of YAML files, with validation and hot reload
//! - [`RoleResolver`] — binds agents to templates plus per-agent overrides,
//!   producing the flat [`ResolvedPolicy`] the decision engine consumes
//!
//! Resolution is copy-on-write: readers take an `Arc` snapshot and are never
//! exposed to a half-merged policy.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod policy;
pub mod resolver;
pub mod rule;
pub mod store;
pub mod template;
pub mod watcher;

pub use error::{PolicyError, PolicyResult};
pub use policy::{ChaosConfig, FilterLevel, ResolvedPolicy, RuleOrigin, SpendLimits, TemplateCounts};
pub use resolver::{RoleAssignment, RoleOverrides, RoleResolver};
pub use rule::{Rule, RuleMatch};
pub use store::TemplateStore;
pub use template::{Template, Validation};
pub use watcher::spawn_template_watcher;

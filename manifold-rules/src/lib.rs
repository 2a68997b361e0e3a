//! Manifest modification rule store and evaluation engine.
//!
//! This crate persists conditional rules keyed by a client-matching
//! attribute (owner, hardware uuid, site, OS version, tag) and, for a
//! requesting client's identity attributes, deterministically resolves the
//! package install/removal directives to merge into that client's software
//! manifest. Administrators mutate rules through an optimistic-versioning
//! store; manifest requests evaluate against immutable snapshots, with
//! block rules always winning over install rules.

mod audit;
mod authz;
mod directive;
mod engine;
mod error;
mod loader;
mod predicate;
mod rule;
mod service;
mod store;

pub use audit::{AuditEvent, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use authz::{authorize_create, authorize_mutation};
pub use directive::{BucketDirectives, DirectiveSet};
pub use engine::{resolve, Evaluator, RetryPolicy, SnapshotSource};
pub use error::RuleError;
pub use loader::{import, load_drafts};
pub use predicate::{matches, ClientContext};
pub use rule::{MatchKind, ModRule, RuleDraft, DEFAULT_INSTALL_TYPE, KNOWN_INSTALL_TYPES};
pub use service::{RuleApiBuilder, RuleServiceConfig, IDENTITY_HEADER, ROLE_HEADER};
pub use store::{Cursor, ListFilter, Page, RuleSnapshot, RuleStore};

// The external session layer's role vocabulary, re-exported so embedders
// use a single set of identity types.
pub use manifold_core::{Actor, Role};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarantine_scenario_resolves_per_client() {
        let store = RuleStore::new();
        store
            .create(RuleDraft::new(MatchKind::Tag, "lab", "Firefox"), "admin")
            .expect("install rule");
        store
            .create(
                RuleDraft::new(MatchKind::Owner, "jdoe", "Firefox").removal(true),
                "admin",
            )
            .expect("remove rule");

        let evaluator = Evaluator::for_store(store);

        // jdoe is in the lab, but the owner block wins.
        let ctx = ClientContext::new().owner("jdoe").tag("lab");
        let directives = evaluator.evaluate(&ctx, "stable").expect("evaluate");
        let bucket = directives.bucket(DEFAULT_INSTALL_TYPE).expect("bucket");
        assert!(bucket.remove.contains("Firefox"));
        assert!(bucket.install.is_empty());

        // asmith only matches the lab install rule.
        let ctx = ClientContext::new().owner("asmith").tag("lab");
        let directives = evaluator.evaluate(&ctx, "stable").expect("evaluate");
        let bucket = directives.bucket(DEFAULT_INSTALL_TYPE).expect("bucket");
        assert!(bucket.install.contains("Firefox"));
        assert!(bucket.remove.is_empty());
    }
}

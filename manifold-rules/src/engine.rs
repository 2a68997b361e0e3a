use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::directive::DirectiveSet;
use crate::error::RuleError;
use crate::predicate::{matches, ClientContext};
use crate::rule::ModRule;
use crate::store::{RuleSnapshot, RuleStore};

/// Source of point-in-time rule snapshots.
///
/// The in-process store never fails; remote backends surface transient
/// trouble as [`RuleError::StoreUnavailable`], which is the one error the
/// retry wrapper will absorb.
pub trait SnapshotSource: Send + Sync {
    fn snapshot(&self) -> Result<RuleSnapshot, RuleError>;
}

impl SnapshotSource for RuleStore {
    fn snapshot(&self) -> Result<RuleSnapshot, RuleError> {
        Ok(RuleStore::snapshot(self))
    }
}

/// Backoff schedule for transient snapshot failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
        }
    }
}

/// Evaluation engine resolving matching rules into manifest directives.
///
/// Each call reads one immutable snapshot, so concurrent mutations are
/// invisible to an in-flight evaluation and no call ever observes a
/// half-applied set of edits.
#[derive(Clone)]
pub struct Evaluator {
    source: Arc<dyn SnapshotSource>,
}

impl Evaluator {
    pub fn new(source: Arc<dyn SnapshotSource>) -> Self {
        Self { source }
    }

    pub fn for_store(store: RuleStore) -> Self {
        Self::new(Arc::new(store))
    }

    /// Computes the directives for one client manifest request.
    ///
    /// Never fails on valid input: no matching rules is an empty set. A
    /// failed snapshot read propagates as [`RuleError::StoreUnavailable`]
    /// rather than yielding a partial or stale result.
    pub fn evaluate(
        &self,
        ctx: &ClientContext,
        manifest: &str,
    ) -> Result<DirectiveSet, RuleError> {
        let snapshot = self.source.snapshot()?;
        let directives = resolve(snapshot.rules(), ctx, manifest);
        debug!(
            manifest,
            rules = snapshot.len(),
            empty = directives.is_empty(),
            "evaluated manifest modifications"
        );
        Ok(directives)
    }

    /// Like [`Evaluator::evaluate`], retrying only `StoreUnavailable` with
    /// capped exponential backoff. Every other outcome surfaces at once.
    pub async fn evaluate_with_retry(
        &self,
        ctx: &ClientContext,
        manifest: &str,
        policy: &RetryPolicy,
    ) -> Result<DirectiveSet, RuleError> {
        let attempts = policy.attempts.max(1);
        let mut delay = policy.initial_delay;

        for attempt in 1..=attempts {
            match self.evaluate(ctx, manifest) {
                Err(RuleError::StoreUnavailable(reason)) if attempt < attempts => {
                    warn!(attempt, %reason, "rule snapshot unavailable, backing off");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(policy.max_delay);
                }
                other => return other,
            }
        }

        unreachable!("loop returns on the final attempt")
    }
}

/// Pure, order-independent fold of a rule set into directives.
///
/// Filters to enabled rules matching the context and the manifest scope,
/// then records one vote per `(bucket, package)`. Remove votes dominate
/// install votes regardless of iteration order.
pub fn resolve(rules: &[ModRule], ctx: &ClientContext, manifest: &str) -> DirectiveSet {
    let mut directives = DirectiveSet::new();

    for rule in rules {
        if !rule.enabled || !rule.applies_to_manifest(manifest) || !matches(rule, ctx) {
            continue;
        }

        debug!(rule = %rule.key, package = %rule.package_name, removal = rule.removal, "rule matched client");
        for bucket in rule.buckets() {
            if rule.removal {
                directives.vote_remove(bucket, &rule.package_name);
            } else {
                directives.vote_install(bucket, &rule.package_name);
            }
        }
    }

    directives
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{MatchKind, RuleDraft, DEFAULT_INSTALL_TYPE};
    use parking_lot::Mutex;

    fn install_rule(kind: MatchKind, target: &str, package: &str) -> ModRule {
        rule_from_draft(RuleDraft::new(kind, target, package))
    }

    fn remove_rule(kind: MatchKind, target: &str, package: &str) -> ModRule {
        rule_from_draft(RuleDraft::new(kind, target, package).removal(true))
    }

    fn rule_from_draft(draft: RuleDraft) -> ModRule {
        let store = RuleStore::new();
        store.create(draft, "tester").expect("valid draft")
    }

    #[test]
    fn block_rule_always_beats_install_rule() {
        let a = install_rule(MatchKind::Tag, "lab", "Firefox");
        let b = remove_rule(MatchKind::Owner, "jdoe", "Firefox");

        let ctx = ClientContext::new().owner("jdoe").tag("lab");
        let directives = resolve(&[a.clone(), b.clone()], &ctx, "stable");
        let bucket = directives.bucket(DEFAULT_INSTALL_TYPE).expect("bucket");
        assert!(bucket.remove.contains("Firefox"));
        assert!(bucket.install.is_empty());

        // Only the install rule matches this client.
        let ctx = ClientContext::new().owner("asmith").tag("lab");
        let directives = resolve(&[a, b], &ctx, "stable");
        let bucket = directives.bucket(DEFAULT_INSTALL_TYPE).expect("bucket");
        assert!(bucket.install.contains("Firefox"));
        assert!(bucket.remove.is_empty());
    }

    #[test]
    fn result_is_independent_of_rule_order() {
        let rules = vec![
            install_rule(MatchKind::Tag, "lab", "Firefox"),
            remove_rule(MatchKind::Owner, "jdoe", "Firefox"),
            install_rule(MatchKind::Site, "hq", "Chrome"),
            remove_rule(MatchKind::Tag, "quarantine", "Chrome"),
            install_rule(MatchKind::Owner, "jdoe", "Munki"),
        ];
        let ctx = ClientContext::new()
            .owner("jdoe")
            .site("hq")
            .tag("lab")
            .tag("quarantine");

        let baseline = resolve(&rules, &ctx, "stable");
        let mut rotated = rules.clone();
        for _ in 0..rules.len() {
            rotated.rotate_left(1);
            assert_eq!(resolve(&rotated, &ctx, "stable"), baseline);
        }
        let mut reversed = rules;
        reversed.reverse();
        assert_eq!(resolve(&reversed, &ctx, "stable"), baseline);
    }

    #[test]
    fn disabled_rules_never_contribute() {
        let mut rule = install_rule(MatchKind::Tag, "lab", "Firefox");
        rule.enabled = false;

        let ctx = ClientContext::new().tag("lab");
        assert!(resolve(&[rule], &ctx, "stable").is_empty());
    }

    #[test]
    fn manifest_scope_limits_application() {
        let scoped = rule_from_draft(
            RuleDraft::new(MatchKind::Tag, "lab", "Firefox").manifest("testing"),
        );
        let ctx = ClientContext::new().tag("lab");

        assert!(resolve(&[scoped.clone()], &ctx, "stable").is_empty());
        assert!(!resolve(&[scoped], &ctx, "testing").is_empty());
    }

    #[test]
    fn install_types_route_votes_to_their_buckets() {
        let rule = rule_from_draft(
            RuleDraft::new(MatchKind::Tag, "lab", "Firefox")
                .install_type("optional_installs")
                .install_type("managed_updates"),
        );
        let ctx = ClientContext::new().tag("lab");

        let directives = resolve(&[rule], &ctx, "stable");
        assert!(directives.bucket(DEFAULT_INSTALL_TYPE).is_none());
        assert!(directives
            .bucket("optional_installs")
            .expect("bucket")
            .install
            .contains("Firefox"));
        assert!(directives
            .bucket("managed_updates")
            .expect("bucket")
            .install
            .contains("Firefox"));
    }

    #[test]
    fn evaluate_reads_a_consistent_snapshot() {
        let store = RuleStore::new();
        store
            .create(RuleDraft::new(MatchKind::Owner, "jdoe", "Firefox"), "admin")
            .expect("create");

        let evaluator = Evaluator::for_store(store.clone());
        let ctx = ClientContext::new().owner("jdoe");
        let directives = evaluator.evaluate(&ctx, "stable").expect("evaluate");
        assert!(!directives.is_empty());

        let rule = store.snapshot().rules()[0].clone();
        store.delete(rule.key, rule.version, "admin").expect("delete");
        let directives = evaluator.evaluate(&ctx, "stable").expect("evaluate");
        assert!(directives.is_empty());
    }

    /// Fails a fixed number of snapshots before recovering.
    struct FlakySource {
        store: RuleStore,
        failures_left: Mutex<u32>,
    }

    impl SnapshotSource for FlakySource {
        fn snapshot(&self) -> Result<RuleSnapshot, RuleError> {
            let mut left = self.failures_left.lock();
            if *left > 0 {
                *left -= 1;
                return Err(RuleError::StoreUnavailable("backend flapping".into()));
            }
            Ok(self.store.snapshot())
        }
    }

    #[tokio::test]
    async fn retry_absorbs_transient_unavailability() {
        let store = RuleStore::new();
        store
            .create(RuleDraft::new(MatchKind::Owner, "jdoe", "Firefox"), "admin")
            .expect("create");

        let evaluator = Evaluator::new(Arc::new(FlakySource {
            store,
            failures_left: Mutex::new(2),
        }));
        let policy = RetryPolicy {
            attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        };

        let ctx = ClientContext::new().owner("jdoe");
        let directives = evaluator
            .evaluate_with_retry(&ctx, "stable", &policy)
            .await
            .expect("recovers within budget");
        assert!(!directives.is_empty());
    }

    #[tokio::test]
    async fn retry_budget_exhaustion_surfaces_unavailable() {
        let evaluator = Evaluator::new(Arc::new(FlakySource {
            store: RuleStore::new(),
            failures_left: Mutex::new(10),
        }));
        let policy = RetryPolicy {
            attempts: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };

        let err = evaluator
            .evaluate_with_retry(&ClientContext::new(), "stable", &policy)
            .await
            .expect_err("budget exhausted");
        assert!(matches!(err, RuleError::StoreUnavailable(_)));
    }
}

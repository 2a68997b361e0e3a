use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditSink, TracingAuditSink};
use crate::error::RuleError;
use crate::rule::{MatchKind, ModRule, RuleDraft};

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 500;

/// Opaque pagination cursor encoding the last-seen `(modified_at, key)`
/// position in the listing order.
///
/// Cursor-positioned listing stays correct under concurrent mutation:
/// inserts and deletes elsewhere in the order never skip or duplicate
/// items already returned, which a numeric offset cannot guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub modified_at: DateTime<Utc>,
    pub key: Uuid,
}

impl Cursor {
    /// Cursor pointing just past the given rule in the listing order.
    pub fn after(rule: &ModRule) -> Self {
        Self {
            modified_at: rule.modified_at,
            key: rule.key,
        }
    }

    /// URL-safe token form handed to callers.
    pub fn encode(&self) -> String {
        let raw = format!(
            "{}|{}",
            self.modified_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
            self.key
        );
        URL_SAFE_NO_PAD.encode(raw.as_bytes())
    }

    pub fn decode(token: &str) -> Result<Self, RuleError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.as_bytes())
            .map_err(|_| RuleError::validation("malformed cursor"))?;
        let raw =
            String::from_utf8(bytes).map_err(|_| RuleError::validation("malformed cursor"))?;
        let (timestamp, key) = raw
            .split_once('|')
            .ok_or_else(|| RuleError::validation("malformed cursor"))?;

        let modified_at = DateTime::parse_from_rfc3339(timestamp)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| RuleError::validation("malformed cursor"))?;
        let key = key
            .parse::<Uuid>()
            .map_err(|_| RuleError::validation("malformed cursor"))?;

        Ok(Self { modified_at, key })
    }

    /// Listing-order position used for the strictly-after comparison.
    fn position(&self) -> (DateTime<Utc>, Uuid) {
        (self.modified_at, self.key)
    }
}

/// Filter and paging parameters for [`RuleStore::list`].
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub kind: Option<MatchKind>,
    pub cursor: Option<Cursor>,
    pub limit: Option<usize>,
}

impl ListFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: MatchKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn cursor(mut self, cursor: Cursor) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One page of rules, newest first, plus the cursor for the next page.
#[derive(Debug, Clone)]
pub struct Page {
    pub rules: Vec<ModRule>,
    pub next: Option<Cursor>,
}

/// Immutable point-in-time view of the store used for one evaluation call.
#[derive(Debug, Clone, Default)]
pub struct RuleSnapshot {
    rules: Vec<ModRule>,
}

impl RuleSnapshot {
    pub fn from_rules(rules: Vec<ModRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ModRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Concurrent in-process rule store with per-rule optimistic versioning.
///
/// The handle is cheap to clone and safe to share across request workers.
/// Mutations hold the write lock for the whole check-stamp-write, so
/// `version` and `modified_at` advance together and no reader ever
/// observes a rule mid-mutation. CAS losers get [`RuleError::Conflict`]
/// and are expected to re-read and retry; the store never retries.
#[derive(Clone)]
pub struct RuleStore {
    inner: Arc<RwLock<HashMap<Uuid, ModRule>>>,
    audit: Arc<dyn AuditSink>,
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleStore {
    /// Creates an empty store auditing to the tracing log.
    pub fn new() -> Self {
        Self::with_audit(Arc::new(TracingAuditSink))
    }

    /// Creates an empty store with the given audit sink.
    pub fn with_audit(audit: Arc<dyn AuditSink>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            audit,
        }
    }

    /// Validates the draft, assigns a fresh key and stores the rule at
    /// version 1. Keys are random and never derived from store state, so a
    /// deleted key is never reassigned.
    pub fn create(&self, draft: RuleDraft, created_by: &str) -> Result<ModRule, RuleError> {
        draft.validate()?;

        let rule = ModRule {
            key: Uuid::new_v4(),
            kind: draft.kind,
            target: draft.target.trim().to_string(),
            package_name: draft.package_name.trim().to_string(),
            package_display_name: draft.display_name(),
            removal: draft.removal,
            install_types: draft.install_types,
            manifest_scope: draft.manifest_scope,
            enabled: draft.enabled,
            created_by: created_by.to_string(),
            modified_at: Utc::now(),
            version: 1,
        };

        let mut inner = self.inner.write();
        inner.insert(rule.key, rule.clone());
        self.audit.record(AuditEvent::created(created_by, rule.clone()));
        drop(inner);

        debug!(rule = %rule.key, package = %rule.package_name, "rule stored");
        Ok(rule)
    }

    pub fn get(&self, key: Uuid) -> Result<ModRule, RuleError> {
        self.inner
            .read()
            .get(&key)
            .cloned()
            .ok_or(RuleError::NotFound(key))
    }

    /// Lists rules ordered by `(modified_at desc, key desc)` from the
    /// cursor position onward. The final page carries no next cursor.
    pub fn list(&self, filter: ListFilter) -> Result<Page, RuleError> {
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        let mut rules: Vec<ModRule> = {
            let inner = self.inner.read();
            inner
                .values()
                .filter(|rule| filter.kind.map_or(true, |kind| rule.kind == kind))
                .cloned()
                .collect()
        };

        rules.sort_by(|a, b| {
            b.modified_at
                .cmp(&a.modified_at)
                .then(b.key.cmp(&a.key))
        });

        if let Some(cursor) = filter.cursor {
            let position = cursor.position();
            rules.retain(|rule| (rule.modified_at, rule.key) < position);
        }

        let next = if rules.len() > limit {
            rules.truncate(limit);
            rules.last().map(Cursor::after)
        } else {
            None
        };

        Ok(Page { rules, next })
    }

    /// Toggles `enabled` if `expected_version` still matches, bumping the
    /// version and timestamp together.
    pub fn set_enabled(
        &self,
        key: Uuid,
        enabled: bool,
        expected_version: u32,
        actor: &str,
    ) -> Result<ModRule, RuleError> {
        let mut inner = self.inner.write();
        let rule = inner.get_mut(&key).ok_or(RuleError::NotFound(key))?;

        if rule.version != expected_version {
            return Err(RuleError::Conflict {
                expected: expected_version,
                actual: rule.version,
            });
        }

        let before = rule.clone();
        rule.enabled = enabled;
        rule.version += 1;
        rule.modified_at = Utc::now();
        let after = rule.clone();
        self.audit
            .record(AuditEvent::toggled(actor, before, after.clone()));
        drop(inner);

        debug!(rule = %key, enabled, version = after.version, "rule toggled");
        Ok(after)
    }

    /// Removes the rule if `expected_version` still matches. Hard delete;
    /// the final state is captured in the audit record.
    pub fn delete(
        &self,
        key: Uuid,
        expected_version: u32,
        actor: &str,
    ) -> Result<ModRule, RuleError> {
        let mut inner = self.inner.write();
        let rule = inner.get(&key).ok_or(RuleError::NotFound(key))?;

        if rule.version != expected_version {
            return Err(RuleError::Conflict {
                expected: expected_version,
                actual: rule.version,
            });
        }

        let removed = inner.remove(&key).ok_or(RuleError::NotFound(key))?;
        self.audit.record(AuditEvent::deleted(actor, removed.clone()));
        drop(inner);

        debug!(rule = %key, package = %removed.package_name, "rule deleted");
        Ok(removed)
    }

    /// Immutable point-in-time copy of every rule, for one evaluation.
    pub fn snapshot(&self) -> RuleSnapshot {
        let inner = self.inner.read();
        RuleSnapshot::from_rules(inner.values().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

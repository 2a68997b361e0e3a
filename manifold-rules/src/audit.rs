use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::rule::ModRule;

/// Immutable record of one accepted store mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    Created {
        actor: String,
        at: DateTime<Utc>,
        rule: ModRule,
    },
    Toggled {
        actor: String,
        at: DateTime<Utc>,
        before: ModRule,
        after: ModRule,
    },
    Deleted {
        actor: String,
        at: DateTime<Utc>,
        rule: ModRule,
    },
}

impl AuditEvent {
    pub fn created(actor: impl Into<String>, rule: ModRule) -> Self {
        AuditEvent::Created {
            actor: actor.into(),
            at: Utc::now(),
            rule,
        }
    }

    pub fn toggled(actor: impl Into<String>, before: ModRule, after: ModRule) -> Self {
        AuditEvent::Toggled {
            actor: actor.into(),
            at: Utc::now(),
            before,
            after,
        }
    }

    pub fn deleted(actor: impl Into<String>, rule: ModRule) -> Self {
        AuditEvent::Deleted {
            actor: actor.into(),
            at: Utc::now(),
            rule,
        }
    }
}

/// Destination for audit records.
///
/// Recording happens inside the store's mutation path, so implementations
/// must not call back into the store.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Sink that emits audit records as structured log events.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        match &event {
            AuditEvent::Created { actor, rule, .. } => {
                info!(actor = %actor, rule = %rule.key, package = %rule.package_name, "rule created");
            }
            AuditEvent::Toggled { actor, after, .. } => {
                info!(actor = %actor, rule = %after.key, enabled = after.enabled, version = after.version, "rule toggled");
            }
            AuditEvent::Deleted { actor, rule, .. } => {
                info!(actor = %actor, rule = %rule.key, package = %rule.package_name, "rule deleted");
            }
        }
    }
}

/// In-memory sink for test inspection.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}

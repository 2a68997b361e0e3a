use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::rule::{MatchKind, ModRule};

/// Identity attributes of the client requesting a manifest.
///
/// Ephemeral and caller-supplied; never persisted. Empty strings mean the
/// attribute is unknown for this client.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientContext {
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub site: String,
    #[serde(default)]
    pub os_version: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl ClientContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = uuid.into();
        self
    }

    pub fn site(mut self, site: impl Into<String>) -> Self {
        self.site = site.into();
        self
    }

    pub fn os_version(mut self, os_version: impl Into<String>) -> Self {
        self.os_version = os_version.into();
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }
}

/// Whether the rule's target matches the client's attributes.
///
/// Pure predicate: the `enabled` flag is deliberately not consulted here,
/// the evaluation engine enforces it.
pub fn matches(rule: &ModRule, ctx: &ClientContext) -> bool {
    match rule.kind {
        MatchKind::Owner => ctx.owner == rule.target,
        MatchKind::Uuid => ctx.uuid == rule.target,
        MatchKind::Site => ctx.site == rule.target,
        MatchKind::OsVersion => ctx.os_version == rule.target,
        MatchKind::Tag => ctx.tags.contains(&rule.target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn rule(kind: MatchKind, target: &str) -> ModRule {
        ModRule {
            key: Uuid::new_v4(),
            kind,
            target: target.to_string(),
            package_name: "Firefox".into(),
            package_display_name: "Firefox".into(),
            removal: false,
            install_types: Default::default(),
            manifest_scope: Default::default(),
            enabled: true,
            created_by: "jdoe".into(),
            modified_at: Utc::now(),
            version: 1,
        }
    }

    #[test]
    fn owner_match_is_exact_and_case_sensitive() {
        let rule = rule(MatchKind::Owner, "jdoe");
        assert!(matches(&rule, &ClientContext::new().owner("jdoe")));
        assert!(!matches(&rule, &ClientContext::new().owner("JDoe")));
        assert!(!matches(&rule, &ClientContext::new()));
    }

    #[test]
    fn tag_match_is_set_membership() {
        let rule = rule(MatchKind::Tag, "qa");
        let ctx = ClientContext::new().tag("lab").tag("qa");
        assert!(matches(&rule, &ctx));
        assert!(!matches(&rule, &ClientContext::new().tag("lab")));
    }

    #[test]
    fn os_version_matches_single_value() {
        let rule = rule(MatchKind::OsVersion, "14.4.1");
        assert!(matches(&rule, &ClientContext::new().os_version("14.4.1")));
        assert!(!matches(&rule, &ClientContext::new().os_version("14.4")));
    }

    #[test]
    fn disabled_flag_is_not_the_predicates_concern() {
        let mut rule = rule(MatchKind::Site, "hq");
        rule.enabled = false;
        assert!(matches(&rule, &ClientContext::new().site("hq")));
    }
}

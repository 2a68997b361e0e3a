use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RuleError;

/// Manifest bucket a directive lands in when a rule names none explicitly.
pub const DEFAULT_INSTALL_TYPE: &str = "managed_installs";

/// Install-type buckets understood by the manifest format.
pub const KNOWN_INSTALL_TYPES: &[&str] = &[
    "managed_installs",
    "managed_uninstalls",
    "managed_updates",
    "optional_installs",
];

/// Client attribute a rule matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Owner,
    Uuid,
    Site,
    OsVersion,
    Tag,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Owner => "owner",
            MatchKind::Uuid => "uuid",
            MatchKind::Site => "site",
            MatchKind::OsVersion => "os_version",
            MatchKind::Tag => "tag",
        }
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchKind {
    type Err = RuleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "owner" => Ok(MatchKind::Owner),
            "uuid" => Ok(MatchKind::Uuid),
            "site" => Ok(MatchKind::Site),
            "os_version" => Ok(MatchKind::OsVersion),
            "tag" => Ok(MatchKind::Tag),
            other => Err(RuleError::validation(format!(
                "unknown match kind: {}",
                other
            ))),
        }
    }
}

/// Persisted manifest modification rule.
///
/// `key`, `version` and `modified_at` are store-managed: the key is assigned
/// once at creation and never reused, and version/timestamp advance together
/// on every accepted mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModRule {
    pub key: Uuid,
    pub kind: MatchKind,
    pub target: String,
    pub package_name: String,
    pub package_display_name: String,
    /// `true` blocks/removes the package, `false` installs it.
    pub removal: bool,
    /// Buckets the directive applies to; empty means the default bucket.
    #[serde(default)]
    pub install_types: BTreeSet<String>,
    /// Manifests the rule applies to; empty means all manifests.
    #[serde(default)]
    pub manifest_scope: BTreeSet<String>,
    pub enabled: bool,
    pub created_by: String,
    pub modified_at: DateTime<Utc>,
    pub version: u32,
}

impl ModRule {
    /// Buckets this rule votes in, falling back to the default bucket.
    pub fn buckets(&self) -> Vec<&str> {
        if self.install_types.is_empty() {
            vec![DEFAULT_INSTALL_TYPE]
        } else {
            self.install_types.iter().map(String::as_str).collect()
        }
    }

    /// Whether the rule applies to the named manifest.
    pub fn applies_to_manifest(&self, manifest: &str) -> bool {
        self.manifest_scope.is_empty() || self.manifest_scope.contains(manifest)
    }
}

/// Caller-supplied fields for creating a rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleDraft {
    pub kind: MatchKind,
    pub target: String,
    pub package_name: String,
    #[serde(default)]
    pub package_display_name: String,
    #[serde(default)]
    pub removal: bool,
    #[serde(default)]
    pub install_types: BTreeSet<String>,
    #[serde(default)]
    pub manifest_scope: BTreeSet<String>,
    #[serde(default = "RuleDraft::default_enabled")]
    pub enabled: bool,
}

impl RuleDraft {
    pub fn default_enabled() -> bool {
        true
    }

    pub fn new(kind: MatchKind, target: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            package_name: package.into(),
            package_display_name: String::new(),
            removal: false,
            install_types: BTreeSet::new(),
            manifest_scope: BTreeSet::new(),
            enabled: true,
        }
    }

    pub fn removal(mut self, removal: bool) -> Self {
        self.removal = removal;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn install_type(mut self, bucket: impl Into<String>) -> Self {
        self.install_types.insert(bucket.into());
        self
    }

    pub fn manifest(mut self, manifest: impl Into<String>) -> Self {
        self.manifest_scope.insert(manifest.into());
        self
    }

    /// Checks the field invariants shared by create and import.
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.target.trim().is_empty() {
            return Err(RuleError::validation("target must not be empty"));
        }
        if self.package_name.trim().is_empty() {
            return Err(RuleError::validation("package name must not be empty"));
        }
        for bucket in &self.install_types {
            if !KNOWN_INSTALL_TYPES.contains(&bucket.as_str()) {
                return Err(RuleError::validation(format!(
                    "unknown install type: {}",
                    bucket
                )));
            }
        }
        for manifest in &self.manifest_scope {
            if manifest.trim().is_empty() {
                return Err(RuleError::validation("manifest name must not be empty"));
            }
        }
        Ok(())
    }

    /// Display name, defaulting to the package name when blank.
    pub fn display_name(&self) -> String {
        if self.package_display_name.trim().is_empty() {
            self.package_name.clone()
        } else {
            self.package_display_name.clone()
        }
    }
}

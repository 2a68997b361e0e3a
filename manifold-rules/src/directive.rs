use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Resolved install/remove outcome for one install-type bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketDirectives {
    #[serde(default)]
    pub install: BTreeSet<String>,
    #[serde(default)]
    pub remove: BTreeSet<String>,
}

impl BucketDirectives {
    pub fn is_empty(&self) -> bool {
        self.install.is_empty() && self.remove.is_empty()
    }
}

/// Final evaluation result: install-type bucket mapped to directives.
///
/// Votes are folded with a remove-wins policy: once any rule votes to
/// remove a package from a bucket, no install vote can bring it back. The
/// fold is a set union, so the result does not depend on vote order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirectiveSet {
    buckets: BTreeMap<String, BucketDirectives>,
}

impl DirectiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an install vote. Ignored when the package is already
    /// marked for removal in this bucket.
    pub fn vote_install(&mut self, bucket: &str, package: &str) {
        let entry = self.buckets.entry(bucket.to_string()).or_default();
        if !entry.remove.contains(package) {
            entry.install.insert(package.to_string());
        }
    }

    /// Records a remove vote, evicting any standing install vote.
    pub fn vote_remove(&mut self, bucket: &str, package: &str) {
        let entry = self.buckets.entry(bucket.to_string()).or_default();
        entry.install.remove(package);
        entry.remove.insert(package.to_string());
    }

    pub fn bucket(&self, name: &str) -> Option<&BucketDirectives> {
        self.buckets.get(name)
    }

    pub fn buckets(&self) -> impl Iterator<Item = (&str, &BucketDirectives)> {
        self.buckets.iter().map(|(name, d)| (name.as_str(), d))
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(BucketDirectives::is_empty)
    }
}

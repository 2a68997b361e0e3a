//! Authorization gate consulted before store mutations.
//!
//! The gate is a contract over `(role, requested fields)`, independent of
//! any presentation layer: Contributors get default scoping forced onto
//! their drafts, Administrators pass through, and mutating another admin's
//! rule requires the Administrator role.

use manifold_core::Actor;

use crate::error::RuleError;
use crate::rule::{ModRule, RuleDraft};

/// Masks the draft down to the fields the caller's role may set.
///
/// Contributors may choose the match kind, target, package and direction;
/// their `install_types` and `manifest_scope` are forced to the defaults
/// (default bucket, all manifests). Administrators set everything.
pub fn authorize_create(actor: &Actor, mut draft: RuleDraft) -> Result<RuleDraft, RuleError> {
    if !actor.is_admin() {
        draft.install_types.clear();
        draft.manifest_scope.clear();
    }
    Ok(draft)
}

/// Checks that the caller may toggle or delete the given rule.
///
/// Owners mutate their own rules at either role; anyone else's rule
/// requires Administrator.
pub fn authorize_mutation(actor: &Actor, rule: &ModRule) -> Result<(), RuleError> {
    if actor.is_admin() || actor.identity == rule.created_by {
        Ok(())
    } else {
        Err(RuleError::permission(format!(
            "rule {} belongs to {} and {} is not an administrator",
            rule.key, rule.created_by, actor.identity
        )))
    }
}

//! Caller identity supplied by the external session layer.
//!
//! Authentication itself happens outside this system. Services receive an
//! already-authenticated `(identity, role)` pair and carry it as an
//! [`Actor`] when invoking the rule store.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Administrative role attached to an authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// May create rules with default install-type and manifest scoping.
    Contributor,
    /// May set scoping fields explicitly and mutate other admins' rules.
    Administrator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Contributor => "contributor",
            Role::Administrator => "administrator",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Administrator)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "contributor" => Ok(Role::Contributor),
            "administrator" | "admin" => Ok(Role::Administrator),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Authenticated caller as seen by the rule store and the service layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub identity: String,
    pub role: Role,
}

impl Actor {
    pub fn new(identity: impl Into<String>, role: Role) -> Self {
        Self {
            identity: identity.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_roles_case_insensitively() {
        assert_eq!(Role::from_str("Contributor").unwrap(), Role::Contributor);
        assert_eq!(Role::from_str("ADMIN").unwrap(), Role::Administrator);
        assert_eq!(
            Role::from_str("administrator").unwrap(),
            Role::Administrator
        );
        assert!(Role::from_str("auditor").is_err());
    }

    #[test]
    fn actor_reports_admin_role() {
        assert!(Actor::new("jdoe", Role::Administrator).is_admin());
        assert!(!Actor::new("jdoe", Role::Contributor).is_admin());
    }
}

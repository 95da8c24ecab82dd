//! Back-office roles carried in access tokens.

use serde::{Deserialize, Serialize};

use crate::constants::{ROLE_ADMIN, ROLE_OPERATOR};

/// Role enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Operator,
    Admin,
}

impl Role {
    /// Check if this role has admin privileges
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    /// Check if this role can access a required role
    pub fn can_access(&self, required: &Role) -> bool {
        match self {
            Role::Admin => true,
            Role::Operator => matches!(required, Role::Operator),
        }
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        match s {
            ROLE_ADMIN => Role::Admin,
            _ => Role::Operator,
        }
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        Role::from(s.as_str())
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "{}", ROLE_ADMIN),
            Role::Operator => write!(f, "{}", ROLE_OPERATOR),
        }
    }
}

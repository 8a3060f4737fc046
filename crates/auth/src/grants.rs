use serde::{Deserialize, Serialize};

use boardcp_core::RoleId;

use crate::PermissionId;

/// Stored grant: a role either allows (`true`) or denies (`false`) a permission.
///
/// At most one grant exists per `(role_id, permission_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RolePermission {
    pub role_id: RoleId,
    pub permission_id: PermissionId,
    pub value: bool,
}

/// Value vocabulary of the permission editor form.
///
/// `Deny` and `Revoke` are distinct on screen but both store `false`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormValue {
    Allow,
    Deny,
    Revoke,
}

impl FormValue {
    /// Parse a submitted literal. Anything but the three exact literals is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "allow" => Some(Self::Allow),
            "deny" => Some(Self::Deny),
            "revoke" => Some(Self::Revoke),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::Revoke => "revoke",
        }
    }

    pub fn stored_value(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

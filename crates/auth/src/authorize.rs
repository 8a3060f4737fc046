use std::collections::{BTreeSet, HashSet};

use thiserror::Error;

use boardcp_core::{BoardUri, RoleId};

use crate::permissions::{BOARD_CONFIG, SITE_CONFIG};
use crate::{PermissionId, Role, RolePermission};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("scope mismatch: permissions resolved for {resolved}, decision needs {required}")]
    ScopeMismatch { resolved: Scope, required: Scope },

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(PermissionId),
}

/// Where a permission decision is made.
///
/// A principal's roles take part in a scope when they are site-wide, or when
/// they belong to the board of a `Board` scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Site,
    Board(BoardUri),
}

impl Scope {
    /// Scope whose capabilities govern editing `role`'s permissions.
    pub fn governing(role: &Role) -> Self {
        match &role.board_uri {
            Some(board) => Self::Board(board.clone()),
            None => Self::Site,
        }
    }

    fn includes(&self, role: &Role) -> bool {
        match self {
            Self::Site => role.is_site_wide(),
            Self::Board(board) => role.applies_to(board),
        }
    }
}

impl core::fmt::Display for Scope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Site => f.write_str("site"),
            Self::Board(board) => write!(f, "board '{board}'"),
        }
    }
}

/// Capabilities a principal holds within one scope.
///
/// A permission is held when at least one in-scope role allows it and no
/// in-scope role stores an explicit deny for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionSet {
    scope: Scope,
    allowed: HashSet<PermissionId>,
    denied: HashSet<PermissionId>,
}

impl PermissionSet {
    pub fn empty(scope: Scope) -> Self {
        Self {
            scope,
            allowed: HashSet::new(),
            denied: HashSet::new(),
        }
    }

    /// Resolve from the principal's roles and the grants stored for them.
    ///
    /// Roles outside `scope` and grants of roles not in `principal_roles` are
    /// ignored.
    pub fn resolve(scope: Scope, principal_roles: &[Role], grants: &[RolePermission]) -> Self {
        let in_scope: HashSet<RoleId> = principal_roles
            .iter()
            .filter(|role| scope.includes(role))
            .map(|role| role.role_id)
            .collect();

        let mut set = Self::empty(scope);
        for grant in grants.iter().filter(|g| in_scope.contains(&g.role_id)) {
            if grant.value {
                set.allowed.insert(grant.permission_id.clone());
            } else {
                set.denied.insert(grant.permission_id.clone());
            }
        }
        set
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn holds(&self, permission: &PermissionId) -> bool {
        self.allowed.contains(permission) && !self.denied.contains(permission)
    }

    /// Held permissions, sorted.
    pub fn held(&self) -> BTreeSet<&PermissionId> {
        self.allowed
            .iter()
            .filter(|p| !self.denied.contains(*p))
            .collect()
    }
}

/// Require `permission` in an already resolved set.
pub fn require(perms: &PermissionSet, permission: &PermissionId) -> Result<(), AuthzError> {
    if perms.holds(permission) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(permission.clone()))
    }
}

/// "Can the acting user configure this board?"
///
/// `board_perms` must be resolved for the board's scope.
pub fn can_edit_config(board: &BoardUri, board_perms: &PermissionSet) -> Result<(), AuthzError> {
    let required = Scope::Board(board.clone());
    if board_perms.scope() != &required {
        return Err(AuthzError::ScopeMismatch {
            resolved: board_perms.scope().clone(),
            required,
        });
    }
    require(board_perms, &BOARD_CONFIG)
}

/// "Can the acting user set this role's permissions?"
///
/// Board roles need `board.config` on their board; site-wide roles need
/// `site.config`. `perms` must be resolved for [`Scope::governing`] of `role`.
pub fn can_set_permissions(role: &Role, perms: &PermissionSet) -> Result<(), AuthzError> {
    let required = Scope::governing(role);
    if perms.scope() != &required {
        return Err(AuthzError::ScopeMismatch {
            resolved: perms.scope().clone(),
            required,
        });
    }

    match required {
        Scope::Board(_) => require(perms, &BOARD_CONFIG),
        Scope::Site => require(perms, &SITE_CONFIG),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::Caste;

    fn board(uri: &str) -> BoardUri {
        BoardUri::parse(uri).unwrap()
    }

    fn role(board_uri: Option<&str>, caste: &str) -> Role {
        Role {
            role_id: RoleId::new(),
            board_uri: board_uri.map(board),
            caste: Caste::parse(caste).unwrap(),
            name: caste.to_string(),
            capcode: None,
            weight: 0,
        }
    }

    fn grant(role: &Role, id: &'static str, value: bool) -> RolePermission {
        RolePermission {
            role_id: role.role_id,
            permission_id: PermissionId::parse(id).unwrap(),
            value,
        }
    }

    #[test]
    fn explicit_deny_wins_over_allow() {
        let global = role(None, "mod");
        let local = role(Some("b"), "restricted");
        let grants = vec![
            grant(&global, "post.delete", true),
            grant(&local, "post.delete", false),
            grant(&global, "board.config", true),
        ];

        let perms = PermissionSet::resolve(Scope::Board(board("b")), &[global, local], &grants);

        assert!(!perms.holds(&PermissionId::parse("post.delete").unwrap()));
        assert!(perms.holds(&BOARD_CONFIG));
    }

    #[test]
    fn roles_of_other_boards_do_not_count() {
        let other = role(Some("tech"), "owner");
        let grants = vec![grant(&other, "board.config", true)];

        let perms = PermissionSet::resolve(Scope::Board(board("b")), &[other], &grants);

        assert!(perms.held().is_empty());
        assert_eq!(
            can_edit_config(&board("b"), &perms),
            Err(AuthzError::Forbidden(BOARD_CONFIG))
        );
    }

    #[test]
    fn grants_of_foreign_roles_are_ignored() {
        let mine = role(None, "user");
        let not_mine = role(None, "admin");
        let grants = vec![grant(&not_mine, "site.config", true)];

        let perms = PermissionSet::resolve(Scope::Site, &[mine], &grants);

        assert!(!perms.holds(&SITE_CONFIG));
    }

    #[test]
    fn site_scope_only_counts_site_wide_roles() {
        let local = role(Some("b"), "owner");
        let grants = vec![grant(&local, "site.config", true)];

        let perms = PermissionSet::resolve(Scope::Site, &[local], &grants);

        assert!(!perms.holds(&SITE_CONFIG));
    }

    #[test]
    fn set_permissions_on_board_role_requires_board_config() {
        let owner = role(Some("b"), "owner");
        let target = role(Some("b"), "janitor");
        let grants = vec![grant(&owner, "board.config", true)];

        let perms = PermissionSet::resolve(Scope::governing(&target), &[owner], &grants);

        assert_eq!(can_set_permissions(&target, &perms), Ok(()));
    }

    #[test]
    fn set_permissions_on_site_role_requires_site_config() {
        let owner = role(None, "owner");
        let target = role(None, "janitor");
        let grants = vec![grant(&owner, "board.config", true)];

        let perms = PermissionSet::resolve(Scope::governing(&target), &[owner], &grants);

        assert_eq!(
            can_set_permissions(&target, &perms),
            Err(AuthzError::Forbidden(SITE_CONFIG))
        );
    }

    #[test]
    fn decisions_reject_sets_resolved_for_another_scope() {
        let target = role(Some("b"), "janitor");
        let perms = PermissionSet::empty(Scope::Board(board("tech")));

        assert!(matches!(
            can_set_permissions(&target, &perms),
            Err(AuthzError::ScopeMismatch { .. })
        ));
        assert!(matches!(
            can_edit_config(&board("b"), &perms),
            Err(AuthzError::ScopeMismatch { .. })
        ));
    }
}

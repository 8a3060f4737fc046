//! Store-backed permission resolution.

use tracing::debug;

use boardcp_auth::{PermissionSet, Principal, Scope};
use boardcp_core::RoleId;

use crate::store::{GrantStore, RoleStore, StoreError};

/// Resolve what `principal` may do within `scope`.
///
/// Role ids carried by the principal that no longer exist are ignored.
pub async fn resolve_permissions<S>(
    store: &S,
    principal: &Principal,
    scope: Scope,
) -> Result<PermissionSet, StoreError>
where
    S: RoleStore + GrantStore + ?Sized,
{
    if principal.roles.is_empty() {
        return Ok(PermissionSet::empty(scope));
    }

    let roles = store.roles_by_ids(&principal.roles).await?;
    let role_ids: Vec<RoleId> = roles.iter().map(|r| r.role_id).collect();
    let grants = store.grants_for_roles(&role_ids).await?;

    let set = PermissionSet::resolve(scope, &roles, &grants);
    debug!(
        user_id = %principal.user_id,
        scope = %set.scope(),
        held = set.held().len(),
        "resolved permissions"
    );
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    use boardcp_auth::{Caste, Permission, PermissionId, Role, RolePermission};
    use boardcp_core::{BoardUri, UserId};

    use crate::store::{Board, InMemoryStore};

    fn pid(raw: &'static str) -> PermissionId {
        PermissionId::parse(raw).unwrap()
    }

    fn role(board: Option<&str>, caste: &str) -> Role {
        Role {
            role_id: RoleId::new(),
            board_uri: board.map(|b| BoardUri::parse(b).unwrap()),
            caste: Caste::parse(caste).unwrap(),
            name: caste.to_string(),
            capcode: None,
            weight: 0,
        }
    }

    async fn fixture() -> (InMemoryStore, Role, Role, Role) {
        let store = InMemoryStore::new();
        for uri in ["b", "tech"] {
            store
                .insert_board(Board { board_uri: BoardUri::parse(uri).unwrap(), title: uri.into() })
                .unwrap();
        }
        store.insert_group("board", 1).unwrap();
        store.insert_permission(Permission::new(pid("board.config"), "board")).unwrap();
        store.insert_permission(Permission::new(pid("post.delete"), "board")).unwrap();

        let global = role(None, "global");
        let b_owner = role(Some("b"), "owner");
        let tech_owner = role(Some("tech"), "owner");
        for r in [&global, &b_owner, &tech_owner] {
            store.insert_role(r).await.unwrap();
        }
        store
            .put_grant(RolePermission { role_id: global.role_id, permission_id: pid("post.delete"), value: true })
            .unwrap();
        store
            .put_grant(RolePermission { role_id: b_owner.role_id, permission_id: pid("board.config"), value: true })
            .unwrap();
        store
            .put_grant(RolePermission { role_id: tech_owner.role_id, permission_id: pid("board.config"), value: true })
            .unwrap();
        store
            .put_grant(RolePermission { role_id: tech_owner.role_id, permission_id: pid("post.delete"), value: false })
            .unwrap();
        (store, global, b_owner, tech_owner)
    }

    #[tokio::test]
    async fn only_in_scope_roles_count() {
        let (store, global, b_owner, tech_owner) = fixture().await;
        let principal = Principal::new(
            UserId::new(),
            vec![global.role_id, b_owner.role_id, tech_owner.role_id],
        );

        let on_b = resolve_permissions(&store, &principal, Scope::Board(BoardUri::parse("b").unwrap()))
            .await
            .unwrap();
        assert!(on_b.holds(&pid("board.config")));
        assert!(on_b.holds(&pid("post.delete")));

        // The tech owner's explicit deny shadows the site-wide allow on tech only.
        let on_tech = resolve_permissions(&store, &principal, Scope::Board(BoardUri::parse("tech").unwrap()))
            .await
            .unwrap();
        assert!(on_tech.holds(&pid("board.config")));
        assert!(!on_tech.holds(&pid("post.delete")));

        let site = resolve_permissions(&store, &principal, Scope::Site).await.unwrap();
        assert!(!site.holds(&pid("board.config")));
        assert!(site.holds(&pid("post.delete")));
    }

    #[tokio::test]
    async fn unknown_roles_resolve_to_nothing() {
        let (store, ..) = fixture().await;
        let principal = Principal::new(UserId::new(), vec![RoleId::new()]);

        let set = resolve_permissions(&store, &principal, Scope::Site).await.unwrap();

        assert!(set.held().is_empty());
    }
}

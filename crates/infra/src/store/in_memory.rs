use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use boardcp_auth::{Caste, Permission, PermissionGroup, PermissionId, Principal, Role, RolePermission};
use boardcp_core::{BoardUri, Entity, RoleId};

use super::{
    Board, BoardStore, GrantStore, PermissionCatalog, RoleStore, StoreError, ensure_grants_belong_to,
};
use crate::seed::SeedStore;

#[derive(Debug, Default)]
struct State {
    boards: BTreeMap<BoardUri, Board>,
    roles: HashMap<RoleId, Role>,
    groups: BTreeMap<String, i32>,
    permissions: BTreeMap<PermissionId, Permission>,
    grants: HashMap<(RoleId, PermissionId), bool>,
}

impl State {
    fn caste_taken(&self, scope: Option<&BoardUri>, caste: &Caste) -> bool {
        self.roles
            .values()
            .any(|r| r.board_uri.as_ref() == scope && &r.caste == caste)
    }
}

/// In-memory store for tests/dev.
///
/// One lock guards every table, so `replace_grants` is atomic with respect to
/// all readers.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
    }

    pub fn insert_board(&self, board: Board) -> Result<(), StoreError> {
        self.write()?.boards.insert(board.id().clone(), board);
        Ok(())
    }

    pub fn insert_group(&self, group_id: impl Into<String>, display_order: i32) -> Result<(), StoreError> {
        self.write()?.groups.insert(group_id.into(), display_order);
        Ok(())
    }

    /// Add a catalog permission; its group must exist.
    pub fn insert_permission(&self, permission: Permission) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if !state.groups.contains_key(&permission.group_id) {
            return Err(StoreError::NotFound(format!(
                "permission group '{}'",
                permission.group_id
            )));
        }
        state
            .permissions
            .insert(permission.permission_id.clone(), permission);
        Ok(())
    }

    /// Upsert a single grant outside the permission editor (seeding).
    pub fn put_grant(&self, grant: RolePermission) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if !state.roles.contains_key(&grant.role_id) {
            return Err(StoreError::NotFound(format!("role {}", grant.role_id)));
        }
        state
            .grants
            .insert((grant.role_id, grant.permission_id), grant.value);
        Ok(())
    }
}

#[async_trait::async_trait]
impl BoardStore for InMemoryStore {
    async fn find_board(&self, board_uri: &BoardUri) -> Result<Option<Board>, StoreError> {
        Ok(self.read()?.boards.get(board_uri).cloned())
    }
}

#[async_trait::async_trait]
impl RoleStore for InMemoryStore {
    async fn find_role(&self, role_id: RoleId) -> Result<Option<Role>, StoreError> {
        Ok(self.read()?.roles.get(&role_id).cloned())
    }

    async fn roles_by_ids(&self, role_ids: &[RoleId]) -> Result<Vec<Role>, StoreError> {
        let state = self.read()?;
        Ok(role_ids
            .iter()
            .filter_map(|id| state.roles.get(id).cloned())
            .collect())
    }

    async fn parent_candidates(
        &self,
        board_uri: &BoardUri,
        principal: &Principal,
    ) -> Result<Vec<Role>, StoreError> {
        let state = self.read()?;

        let Some(ceiling) = principal
            .roles
            .iter()
            .filter_map(|id| state.roles.get(id))
            .filter(|r| r.applies_to(board_uri))
            .map(|r| r.weight)
            .max()
        else {
            return Ok(Vec::new());
        };

        let mut roles: Vec<Role> = state
            .roles
            .values()
            .filter(|r| r.applies_to(board_uri) && r.weight <= ceiling)
            .cloned()
            .collect();
        roles.sort_by(|a, b| b.weight.cmp(&a.weight).then_with(|| a.caste.cmp(&b.caste)));
        Ok(roles)
    }

    async fn caste_exists(&self, board_uri: &BoardUri, caste: &Caste) -> Result<bool, StoreError> {
        Ok(self.read()?.caste_taken(Some(board_uri), caste))
    }

    async fn insert_role(&self, role: &Role) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.caste_taken(role.board_uri.as_ref(), &role.caste) {
            return Err(StoreError::Conflict(format!("caste '{}' already exists", role.caste)));
        }
        if let Some(board) = &role.board_uri {
            if !state.boards.contains_key(board) {
                return Err(StoreError::NotFound(format!("board '{board}'")));
            }
        }
        state.roles.insert(*role.id(), role.clone());
        Ok(())
    }
}

#[async_trait::async_trait]
impl PermissionCatalog for InMemoryStore {
    async fn permissions(&self) -> Result<Vec<Permission>, StoreError> {
        Ok(self.read()?.permissions.values().cloned().collect())
    }

    async fn permission_groups(&self) -> Result<Vec<PermissionGroup>, StoreError> {
        let state = self.read()?;
        let mut groups: Vec<PermissionGroup> = state
            .groups
            .iter()
            .map(|(group_id, display_order)| PermissionGroup {
                group_id: group_id.clone(),
                display_order: *display_order,
                permissions: state
                    .permissions
                    .values()
                    .filter(|p| &p.group_id == group_id)
                    .cloned()
                    .collect(),
            })
            .collect();
        PermissionGroup::sort_for_display(&mut groups);
        Ok(groups)
    }
}

#[async_trait::async_trait]
impl GrantStore for InMemoryStore {
    async fn grants_for_roles(&self, role_ids: &[RoleId]) -> Result<Vec<RolePermission>, StoreError> {
        let state = self.read()?;
        let mut grants: Vec<RolePermission> = state
            .grants
            .iter()
            .filter(|((role_id, _), _)| role_ids.contains(role_id))
            .map(|((role_id, permission_id), value)| RolePermission {
                role_id: *role_id,
                permission_id: permission_id.clone(),
                value: *value,
            })
            .collect();
        grants.sort_by(|a, b| {
            a.role_id
                .cmp(&b.role_id)
                .then_with(|| a.permission_id.cmp(&b.permission_id))
        });
        Ok(grants)
    }

    async fn replace_grants(
        &self,
        role_id: RoleId,
        clear: &[PermissionId],
        attach: &[RolePermission],
    ) -> Result<(), StoreError> {
        ensure_grants_belong_to(role_id, attach)?;

        let mut state = self.write()?;
        if !state.roles.contains_key(&role_id) {
            return Err(StoreError::NotFound(format!("role {role_id}")));
        }
        if let Some(unknown) = attach
            .iter()
            .find(|g| !state.permissions.contains_key(&g.permission_id))
        {
            return Err(StoreError::NotFound(format!("permission '{}'", unknown.permission_id)));
        }

        for permission_id in clear {
            state.grants.remove(&(role_id, permission_id.clone()));
        }
        for grant in attach {
            state
                .grants
                .insert((role_id, grant.permission_id.clone()), grant.value);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SeedStore for InMemoryStore {
    async fn upsert_board(&self, board: &Board) -> Result<(), StoreError> {
        self.insert_board(board.clone())
    }

    async fn upsert_group(&self, group_id: &str, display_order: i32) -> Result<(), StoreError> {
        self.insert_group(group_id, display_order)
    }

    async fn upsert_permission(&self, permission: &Permission) -> Result<(), StoreError> {
        self.insert_permission(permission.clone())
    }

    async fn site_role(&self, caste: &Caste) -> Result<Option<Role>, StoreError> {
        Ok(self
            .read()?
            .roles
            .values()
            .find(|r| r.is_site_wide() && &r.caste == caste)
            .cloned())
    }

    async fn seed_grant(&self, grant: &RolePermission) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if !state.roles.contains_key(&grant.role_id) {
            return Err(StoreError::NotFound(format!("role {}", grant.role_id)));
        }
        state
            .grants
            .entry((grant.role_id, grant.permission_id.clone()))
            .or_insert(grant.value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use boardcp_auth::Capcode;

    fn board(uri: &str) -> BoardUri {
        BoardUri::parse(uri).unwrap()
    }

    fn pid(raw: &'static str) -> PermissionId {
        PermissionId::parse(raw).unwrap()
    }

    fn store() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .insert_board(Board { board_uri: board("b"), title: "Random".into() })
            .unwrap();
        store
            .insert_board(Board { board_uri: board("tech"), title: "Technology".into() })
            .unwrap();
        store.insert_group("board", 10).unwrap();
        store.insert_group("post", 20).unwrap();
        for (id, group) in [("board.config", "board"), ("post.delete", "post"), ("post.edit", "post")] {
            store.insert_permission(Permission::new(pid(id), group)).unwrap();
        }
        store
    }

    fn role(board_uri: Option<&str>, caste: &str, weight: i32) -> Role {
        Role {
            role_id: RoleId::new(),
            board_uri: board_uri.map(board),
            caste: Caste::parse(caste).unwrap(),
            name: caste.to_uppercase(),
            capcode: Capcode::parse_optional(caste).unwrap(),
            weight,
        }
    }

    #[tokio::test]
    async fn caste_is_unique_per_board_only() {
        let store = store();
        store.insert_role(&role(Some("b"), "janitor", 0)).await.unwrap();

        let dup = store.insert_role(&role(Some("b"), "janitor", 0)).await;
        assert!(matches!(dup, Err(StoreError::Conflict(_))));

        store.insert_role(&role(Some("tech"), "janitor", 0)).await.unwrap();
        assert!(store.caste_exists(&board("b"), &Caste::parse("JANITOR").unwrap()).await.unwrap());
        assert!(!store.caste_exists(&board("b"), &Caste::parse("owner").unwrap()).await.unwrap());
    }

    #[tokio::test]
    async fn insert_role_requires_known_board() {
        let store = store();
        let res = store.insert_role(&role(Some("nope"), "janitor", 0)).await;
        assert!(matches!(res, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn parent_candidates_respect_scope_and_weight() {
        let store = store();
        let admin = role(None, "admin", 100);
        let owner = role(Some("b"), "owner", 50);
        let janitor = role(Some("b"), "janitor", 10);
        let other = role(Some("tech"), "owner", 50);
        for r in [&admin, &owner, &janitor, &other] {
            store.insert_role(r).await.unwrap();
        }

        let as_owner = Principal::new(boardcp_core::UserId::new(), vec![owner.role_id]);
        let roles = store.parent_candidates(&board("b"), &as_owner).await.unwrap();
        let castes: Vec<_> = roles.iter().map(|r| r.caste.as_str()).collect();
        assert_eq!(castes, vec!["owner", "janitor"]);

        let as_admin = Principal::new(boardcp_core::UserId::new(), vec![admin.role_id]);
        let roles = store.parent_candidates(&board("b"), &as_admin).await.unwrap();
        assert_eq!(roles.len(), 3);
        assert_eq!(roles[0].role_id, admin.role_id);

        let outsider = Principal::new(boardcp_core::UserId::new(), vec![other.role_id]);
        assert!(store.parent_candidates(&board("b"), &outsider).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn groups_are_ordered_with_their_permissions() {
        let store = store();
        store.insert_group("aaa", 30).unwrap();

        let groups = store.permission_groups().await.unwrap();

        let ids: Vec<_> = groups.iter().map(|g| g.group_id.as_str()).collect();
        assert_eq!(ids, vec!["board", "post", "aaa"]);
        assert_eq!(groups[1].permissions.len(), 2);
        assert!(groups[2].permissions.is_empty());
    }

    #[tokio::test]
    async fn replace_grants_clears_then_attaches() {
        let store = store();
        let janitor = role(Some("b"), "janitor", 0);
        store.insert_role(&janitor).await.unwrap();
        for (id, value) in [("board.config", true), ("post.delete", true), ("post.edit", true)] {
            store
                .put_grant(RolePermission { role_id: janitor.role_id, permission_id: pid(id), value })
                .unwrap();
        }

        store
            .replace_grants(
                janitor.role_id,
                &[pid("post.delete"), pid("post.edit")],
                &[RolePermission { role_id: janitor.role_id, permission_id: pid("post.delete"), value: false }],
            )
            .await
            .unwrap();

        let grants = store.grants_for_roles(&[janitor.role_id]).await.unwrap();
        let view: Vec<_> = grants.iter().map(|g| (g.permission_id.as_str(), g.value)).collect();
        assert_eq!(view, vec![("board.config", true), ("post.delete", false)]);
    }

    #[tokio::test]
    async fn failed_replace_leaves_grants_untouched() {
        let store = store();
        let janitor = role(Some("b"), "janitor", 0);
        store.insert_role(&janitor).await.unwrap();
        store
            .put_grant(RolePermission { role_id: janitor.role_id, permission_id: pid("post.delete"), value: true })
            .unwrap();

        let res = store
            .replace_grants(
                janitor.role_id,
                &[pid("post.delete")],
                &[RolePermission {
                    role_id: janitor.role_id,
                    permission_id: pid("user.ban"),
                    value: true,
                }],
            )
            .await;

        assert!(matches!(res, Err(StoreError::NotFound(_))));
        let grants = store.grants_for_roles(&[janitor.role_id]).await.unwrap();
        assert_eq!(grants.len(), 1);
        assert!(grants[0].value);
    }

    #[tokio::test]
    async fn replace_rejects_grants_of_another_role() {
        let store = store();
        let janitor = role(Some("b"), "janitor", 0);
        store.insert_role(&janitor).await.unwrap();

        let res = store
            .replace_grants(
                janitor.role_id,
                &[],
                &[RolePermission { role_id: RoleId::new(), permission_id: pid("post.delete"), value: true }],
            )
            .await;

        assert!(matches!(res, Err(StoreError::Backend(_))));
    }
}

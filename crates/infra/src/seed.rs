//! Default permission catalog and bootstrap data.
//!
//! Installing is idempotent: re-running against a populated store only fills
//! in what is missing.

use tracing::info;

use boardcp_auth::{Capcode, Caste, Permission, PermissionId, Role, RolePermission};
use boardcp_core::{DomainError, RoleId};

use crate::store::{Board, RoleStore, StoreError};

pub struct CatalogGroup {
    pub group_id: &'static str,
    pub display_order: i32,
    pub permissions: &'static [&'static str],
}

pub const DEFAULT_CATALOG: &[CatalogGroup] = &[
    CatalogGroup {
        group_id: "board",
        display_order: 10,
        permissions: &["board.assets", "board.config", "board.reports"],
    },
    CatalogGroup {
        group_id: "post",
        display_order: 20,
        permissions: &["post.delete", "post.edit", "post.lock", "post.sticky"],
    },
    CatalogGroup {
        group_id: "user",
        display_order: 30,
        permissions: &["user.ban", "user.roles", "user.unban"],
    },
    CatalogGroup {
        group_id: "site",
        display_order: 40,
        permissions: &["site.boards", "site.config"],
    },
];

/// Caste of the bootstrap site-wide administrator role.
pub const SITE_ADMIN_CASTE: &str = "admin";
pub const SITE_ADMIN_WEIGHT: i32 = 100;

/// Write access needed to bootstrap a store.
#[async_trait::async_trait]
pub trait SeedStore: RoleStore {
    async fn upsert_board(&self, board: &Board) -> Result<(), StoreError>;

    async fn upsert_group(&self, group_id: &str, display_order: i32) -> Result<(), StoreError>;

    async fn upsert_permission(&self, permission: &Permission) -> Result<(), StoreError>;

    /// Site-wide role with `caste`, if any.
    async fn site_role(&self, caste: &Caste) -> Result<Option<Role>, StoreError>;

    /// Store `grant` unless the pair already has a value; existing values are kept.
    async fn seed_grant(&self, grant: &RolePermission) -> Result<(), StoreError>;
}

fn invalid_seed(err: DomainError) -> StoreError {
    StoreError::Backend(format!("invalid seed data: {err}"))
}

pub fn default_permissions() -> Result<Vec<Permission>, StoreError> {
    DEFAULT_CATALOG
        .iter()
        .flat_map(|group| group.permissions.iter().map(move |p| (group.group_id, *p)))
        .map(|(group_id, raw)| {
            PermissionId::parse(raw)
                .map(|id| Permission::new(id, group_id))
                .map_err(invalid_seed)
        })
        .collect()
}

pub async fn install_catalog<S: SeedStore + ?Sized>(store: &S) -> Result<usize, StoreError> {
    for group in DEFAULT_CATALOG {
        store.upsert_group(group.group_id, group.display_order).await?;
    }
    let permissions = default_permissions()?;
    for permission in &permissions {
        store.upsert_permission(permission).await?;
    }
    Ok(permissions.len())
}

pub async fn install_boards<S: SeedStore + ?Sized>(store: &S, boards: &[Board]) -> Result<(), StoreError> {
    for board in boards {
        store.upsert_board(board).await?;
    }
    Ok(())
}

/// Ensure the site administrator role exists and allows every permission it has
/// no stored value for. Grants edited since the last run are left alone.
pub async fn install_site_admin<S: SeedStore + ?Sized>(store: &S) -> Result<RoleId, StoreError> {
    let caste = Caste::parse(SITE_ADMIN_CASTE).map_err(invalid_seed)?;

    let role = match store.site_role(&caste).await? {
        Some(existing) => existing,
        None => {
            let role = Role {
                role_id: RoleId::new(),
                board_uri: None,
                caste,
                name: "Administrator".to_string(),
                capcode: Capcode::parse_optional("Admin").map_err(invalid_seed)?,
                weight: SITE_ADMIN_WEIGHT,
            };
            store.insert_role(&role).await?;
            role
        }
    };

    for permission in default_permissions()? {
        store
            .seed_grant(&RolePermission {
                role_id: role.role_id,
                permission_id: permission.permission_id,
                value: true,
            })
            .await?;
    }
    Ok(role.role_id)
}

/// Catalog, boards and site administrator; returns the administrator role id.
pub async fn install_defaults<S: SeedStore + ?Sized>(store: &S, boards: &[Board]) -> Result<RoleId, StoreError> {
    let permissions = install_catalog(store).await?;
    install_boards(store, boards).await?;
    let admin = install_site_admin(store).await?;
    info!(permissions, boards = boards.len(), admin_role = %admin, "seed data installed");
    Ok(admin)
}

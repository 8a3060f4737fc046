//! Persistence seam of the control panel.
//!
//! The controller-facing operations only see these traits; `InMemoryStore`
//! backs dev/tests and `PostgresStore` backs deployments.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use boardcp_auth::{Caste, Permission, PermissionGroup, PermissionId, Principal, Role, RolePermission};
use boardcp_core::{BoardUri, Entity, RoleId};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

/// A board as seen by the control panel (route binding only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub board_uri: BoardUri,
    pub title: String,
}

impl Entity for Board {
    type Id = BoardUri;

    fn id(&self) -> &Self::Id {
        &self.board_uri
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint was violated (e.g. caste already taken).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

#[async_trait::async_trait]
pub trait BoardStore: Send + Sync {
    async fn find_board(&self, board_uri: &BoardUri) -> Result<Option<Board>, StoreError>;
}

#[async_trait::async_trait]
pub trait RoleStore: Send + Sync {
    async fn find_role(&self, role_id: RoleId) -> Result<Option<Role>, StoreError>;

    /// Roles among `role_ids` that exist; unknown ids are skipped.
    async fn roles_by_ids(&self, role_ids: &[RoleId]) -> Result<Vec<Role>, StoreError>;

    /// Roles `principal` may use as a parent on `board_uri`.
    ///
    /// Site-wide and board roles whose weight does not exceed the principal's
    /// heaviest role in the board's scope, heaviest first, then by caste.
    async fn parent_candidates(
        &self,
        board_uri: &BoardUri,
        principal: &Principal,
    ) -> Result<Vec<Role>, StoreError>;

    async fn caste_exists(&self, board_uri: &BoardUri, caste: &Caste) -> Result<bool, StoreError>;

    /// Persist a new role; `StoreError::Conflict` if its caste is taken in its scope.
    async fn insert_role(&self, role: &Role) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
pub trait PermissionCatalog: Send + Sync {
    /// Every catalog permission, ordered by id.
    async fn permissions(&self) -> Result<Vec<Permission>, StoreError>;

    /// Groups with their permissions, ordered by `display_order` ascending.
    async fn permission_groups(&self) -> Result<Vec<PermissionGroup>, StoreError>;
}

#[async_trait::async_trait]
pub trait GrantStore: Send + Sync {
    async fn grants_for_roles(&self, role_ids: &[RoleId]) -> Result<Vec<RolePermission>, StoreError>;

    /// Atomically detach `role_id`'s grants for `clear`, then attach `attach`.
    ///
    /// Either both steps apply or neither does. Every grant in `attach` must
    /// belong to `role_id`.
    async fn replace_grants(
        &self,
        role_id: RoleId,
        clear: &[PermissionId],
        attach: &[RolePermission],
    ) -> Result<(), StoreError>;
}

/// Everything the control panel needs from persistence.
pub trait ControlPanelStore: BoardStore + RoleStore + PermissionCatalog + GrantStore {}

impl<T> ControlPanelStore for T where T: BoardStore + RoleStore + PermissionCatalog + GrantStore {}

pub(crate) fn ensure_grants_belong_to(role_id: RoleId, attach: &[RolePermission]) -> Result<(), StoreError> {
    match attach.iter().find(|g| g.role_id != role_id) {
        Some(stray) => Err(StoreError::Backend(format!(
            "grant for role {} passed to replace_grants of role {}",
            stray.role_id, role_id
        ))),
        None => Ok(()),
    }
}

//! Infrastructure layer: persistence adapters, catalog seeding and the
//! store-backed permission resolution used by the control panel.

pub mod gate;
pub mod seed;
pub mod store;

pub use gate::resolve_permissions;
pub use store::{
    Board, BoardStore, ControlPanelStore, GrantStore, InMemoryStore, PermissionCatalog,
    PostgresStore, RoleStore, StoreError,
};

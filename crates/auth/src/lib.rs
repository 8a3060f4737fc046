//! `boardcp-auth`: roles, permissions and the authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage: it holds the
//! role/permission model, the permission editor's reconciliation planner and
//! the pure capability checks the control panel runs before mutating anything.

pub mod authorize;
pub mod claims;
pub mod form_key;
pub mod grants;
pub mod permissions;
pub mod principal;
pub mod reconcile;
pub mod roles;

pub use authorize::{AuthzError, PermissionSet, Scope, can_edit_config, can_set_permissions, require};
pub use claims::{Hs256JwtValidator, JwtClaims, JwtValidator, TokenValidationError, validate_claims};
pub use grants::{FormValue, RolePermission};
pub use permissions::{Permission, PermissionGroup, PermissionId};
pub use principal::Principal;
pub use reconcile::{GrantPlan, plan_grant_update};
pub use roles::{Capcode, Caste, Role};

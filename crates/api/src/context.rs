use boardcp_auth::Principal;
use boardcp_core::{RoleId, UserId};

/// Principal context for a request (authenticated user + role ids).
///
/// Inserted by the auth middleware; present on every protected route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id
    }

    pub fn roles(&self) -> &[RoleId] {
        &self.principal.roles
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }
}

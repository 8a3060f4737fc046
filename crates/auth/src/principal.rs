use serde::{Deserialize, Serialize};

use boardcp_core::{RoleId, UserId};

/// The acting user of a request.
///
/// Passed explicitly into every control-panel operation; the roles come from
/// the verified token, their grants are looked up at decision time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub roles: Vec<RoleId>,
}

impl Principal {
    pub fn new(user_id: UserId, roles: Vec<RoleId>) -> Self {
        Self { user_id, roles }
    }
}

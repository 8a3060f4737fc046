use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use boardcp_auth::PermissionId;
use boardcp_core::{BoardUri, RoleId, UserId};

use crate::{Event, EventBus, InMemoryEventBus};

/// A role's grants were replaced through the permission editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermissionsModified {
    pub event_id: Uuid,
    pub role_id: RoleId,
    /// Board of the role; `None` for site-wide roles.
    pub board_uri: Option<BoardUri>,
    pub modified_by: UserId,
    pub cleared: Vec<PermissionId>,
    pub allowed: Vec<PermissionId>,
    pub denied: Vec<PermissionId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoleEvent {
    PermissionsModified(RolePermissionsModified),
}

impl RoleEvent {
    pub fn role_id(&self) -> RoleId {
        match self {
            RoleEvent::PermissionsModified(e) => e.role_id,
        }
    }
}

impl Event for RoleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RoleEvent::PermissionsModified(_) => "role.permissions_modified",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RoleEvent::PermissionsModified(e) => e.occurred_at,
        }
    }
}

/// Outbound notification port for role changes.
///
/// Called after the change is committed. Fire-and-forget: implementations
/// must not fail the caller.
pub trait RoleEventSink: Send + Sync {
    fn emit(&self, event: RoleEvent);
}

impl RoleEventSink for InMemoryEventBus<RoleEvent> {
    fn emit(&self, event: RoleEvent) {
        let event_type = event.event_type();
        let role_id = event.role_id();
        if let Err(e) = self.publish(event) {
            tracing::warn!(%role_id, event_type, error = ?e, "role event publish failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RoleEvent {
        RoleEvent::PermissionsModified(RolePermissionsModified {
            event_id: Uuid::now_v7(),
            role_id: RoleId::new(),
            board_uri: Some(BoardUri::parse("b").unwrap()),
            modified_by: UserId::new(),
            cleared: vec![PermissionId::parse("post.delete").unwrap()],
            allowed: vec![],
            denied: vec![PermissionId::parse("post.delete").unwrap()],
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn sink_publishes_to_subscribers() {
        let bus = InMemoryEventBus::<RoleEvent>::new();
        let sub = bus.subscribe();
        let event = sample();

        RoleEventSink::emit(&bus, event.clone());

        assert_eq!(sub.recv().unwrap(), event);
    }

    #[test]
    fn serialized_form_is_tagged() {
        let json = serde_json::to_value(sample()).unwrap();

        assert_eq!(json["type"], "permissions_modified");
        assert_eq!(json["board_uri"], "b");
        assert_eq!(json["cleared"][0], "post.delete");
    }
}

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use boardcp_core::DomainError;

/// Permission identifier.
///
/// A dotted path of lowercase ASCII alphanumeric segments (e.g. `board.config`,
/// `post.delete`). Underscores are not allowed: the permission editor transports
/// ids with `.` replaced by `_`, see [`crate::form_key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionId(Cow<'static, str>);

/// Configure a board (settings, roles).
pub const BOARD_CONFIG: PermissionId = PermissionId(Cow::Borrowed("board.config"));

/// Configure the site (site-wide roles and settings).
pub const SITE_CONFIG: PermissionId = PermissionId(Cow::Borrowed("site.config"));

impl PermissionId {
    pub fn parse(raw: impl Into<Cow<'static, str>>) -> Result<Self, DomainError> {
        let raw = raw.into();
        if !is_valid_path(&raw) {
            return Err(DomainError::invalid_id(format!(
                "PermissionId: '{raw}' must be dot-separated lowercase alphanumeric segments"
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_valid_path(raw: &str) -> bool {
    !raw.is_empty()
        && raw.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        })
}

impl core::fmt::Display for PermissionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PermissionId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<PermissionId> for String {
    fn from(value: PermissionId) -> Self {
        value.0.into_owned()
    }
}

/// Catalog entry for a grantable capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub permission_id: PermissionId,
    pub group_id: String,
}

impl Permission {
    pub fn new(permission_id: PermissionId, group_id: impl Into<String>) -> Self {
        Self {
            permission_id,
            group_id: group_id.into(),
        }
    }
}

/// Display grouping of permissions for the permission editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGroup {
    pub group_id: String,
    pub display_order: i32,
    pub permissions: Vec<Permission>,
}

impl PermissionGroup {
    /// Sort groups by `display_order` ascending (ties by `group_id`) and the
    /// permissions inside each group by id.
    pub fn sort_for_display(groups: &mut [PermissionGroup]) {
        groups.sort_by(|a, b| {
            a.display_order
                .cmp(&b.display_order)
                .then_with(|| a.group_id.cmp(&b.group_id))
        });
        for group in groups.iter_mut() {
            group
                .permissions
                .sort_by(|a, b| a.permission_id.cmp(&b.permission_id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_dotted_paths() {
        assert_eq!(PermissionId::parse("board.config").unwrap(), BOARD_CONFIG);
        assert!(PermissionId::parse("post").is_ok());
        assert!(PermissionId::parse("board.reports.view2").is_ok());
    }

    #[test]
    fn parse_rejects_underscores_and_empty_segments() {
        assert!(PermissionId::parse("user_ban").is_err());
        assert!(PermissionId::parse("board..config").is_err());
        assert!(PermissionId::parse(".board").is_err());
        assert!(PermissionId::parse("").is_err());
        assert!(PermissionId::parse("Board.config").is_err());
    }

    #[test]
    fn well_known_ids_are_valid() {
        for id in [BOARD_CONFIG, SITE_CONFIG] {
            assert!(PermissionId::parse(id.as_str().to_string()).is_ok());
        }
    }

    #[test]
    fn groups_sort_by_display_order_then_id() {
        let perm = |id: &'static str, group: &str| Permission::new(PermissionId::parse(id).unwrap(), group);
        let mut groups = vec![
            PermissionGroup {
                group_id: "post".into(),
                display_order: 20,
                permissions: vec![perm("post.edit", "post"), perm("post.delete", "post")],
            },
            PermissionGroup {
                group_id: "board".into(),
                display_order: 10,
                permissions: vec![perm("board.config", "board")],
            },
        ];

        PermissionGroup::sort_for_display(&mut groups);

        assert_eq!(groups[0].group_id, "board");
        assert_eq!(groups[1].permissions[0].permission_id.as_str(), "post.delete");
    }
}

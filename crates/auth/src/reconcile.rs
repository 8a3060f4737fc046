//! Permission editor reconciliation.
//!
//! Turns a submitted permission form into a grant replacement plan for one role.
//! The plan is pure data; the store applies it atomically.

use boardcp_core::RoleId;

use crate::{FormValue, Permission, PermissionId, PermissionSet, RolePermission, form_key};

/// Grant replacement for one role.
///
/// Applying it removes the role's grants for every id in `clear`, then inserts
/// `attach`. Every attached permission is also in `clear`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantPlan {
    pub clear: Vec<PermissionId>,
    pub attach: Vec<RolePermission>,
    /// Catalog permissions present in the form that the editor may not touch.
    pub beyond_ceiling: Vec<PermissionId>,
    /// Held permissions submitted with a value other than allow/deny/revoke.
    pub unrecognized: Vec<PermissionId>,
}

/// Build the grant plan for `role_id`.
///
/// `submitted` holds `(form_key, value)` pairs in submission order. For each
/// catalog permission the editor holds, the permission is cleared and the
/// first submitted entry whose key decodes to its id decides the new grant.
/// Permissions the editor does not hold are left out of the plan entirely.
pub fn plan_grant_update(
    role_id: RoleId,
    catalog: &[Permission],
    editor: &PermissionSet,
    submitted: &[(String, String)],
) -> GrantPlan {
    let decoded: Vec<(String, &str)> = submitted
        .iter()
        .map(|(key, value)| (form_key::decode(key), value.as_str()))
        .collect();

    let mut plan = GrantPlan::default();

    for permission in catalog {
        let id = &permission.permission_id;
        let entry = decoded.iter().find(|(key, _)| key == id.as_str());

        if !editor.holds(id) {
            if entry.is_some() {
                plan.beyond_ceiling.push(id.clone());
            }
            continue;
        }

        plan.clear.push(id.clone());

        let Some((_, raw)) = entry else {
            continue;
        };
        match FormValue::parse(raw) {
            Some(value) => plan.attach.push(RolePermission {
                role_id,
                permission_id: id.clone(),
                value: value.stored_value(),
            }),
            None => plan.unrecognized.push(id.clone()),
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use crate::authorize::Scope;
    use crate::{Caste, Role};
    use boardcp_core::BoardUri;

    const CATALOG: [&str; 5] = [
        "board.config",
        "post.delete",
        "user.ban",
        "board.reports",
        "site.config",
    ];

    fn id(raw: &'static str) -> PermissionId {
        PermissionId::parse(raw).unwrap()
    }

    fn catalog() -> Vec<Permission> {
        CATALOG
            .iter()
            .map(|raw| Permission::new(id(*raw), raw.split('.').next().unwrap_or_default()))
            .collect()
    }

    /// Resolve a set holding exactly `held` on board `b`.
    fn editor_holding(held: &[&'static str]) -> PermissionSet {
        let role = Role::new_for_board(
            BoardUri::parse("b").unwrap(),
            Caste::parse("owner").unwrap(),
            "Owner",
            None,
        );
        let grants: Vec<_> = held
            .iter()
            .map(|raw| RolePermission {
                role_id: role.role_id,
                permission_id: id(*raw),
                value: true,
            })
            .collect();
        PermissionSet::resolve(Scope::Board(BoardUri::parse("b").unwrap()), &[role], &grants)
    }

    fn form(entries: &[(&str, &str)]) -> Vec<(String, String)> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn worked_example() {
        let role_id = RoleId::new();
        let editor = editor_holding(&["board.config", "post.delete"]);
        let submitted = form(&[
            ("board_config", "allow"),
            ("post_delete", "deny"),
            ("user_ban", "allow"),
        ]);

        let plan = plan_grant_update(role_id, &catalog(), &editor, &submitted);

        assert_eq!(plan.clear, vec![id("board.config"), id("post.delete")]);
        assert_eq!(
            plan.attach,
            vec![
                RolePermission { role_id, permission_id: id("board.config"), value: true },
                RolePermission { role_id, permission_id: id("post.delete"), value: false },
            ]
        );
        assert_eq!(plan.beyond_ceiling, vec![id("user.ban")]);
        assert!(plan.unrecognized.is_empty());
    }

    #[test]
    fn held_but_absent_is_cleared_without_attach() {
        let editor = editor_holding(&["board.config", "board.reports"]);
        let submitted = form(&[("board_config", "revoke")]);

        let plan = plan_grant_update(RoleId::new(), &catalog(), &editor, &submitted);

        assert_eq!(plan.clear, vec![id("board.config"), id("board.reports")]);
        assert_eq!(plan.attach.len(), 1);
        assert!(!plan.attach[0].value);
    }

    #[test]
    fn unrecognized_value_clears_and_is_reported() {
        let editor = editor_holding(&["post.delete"]);
        let submitted = form(&[("post_delete", "inherit")]);

        let plan = plan_grant_update(RoleId::new(), &catalog(), &editor, &submitted);

        assert_eq!(plan.clear, vec![id("post.delete")]);
        assert!(plan.attach.is_empty());
        assert_eq!(plan.unrecognized, vec![id("post.delete")]);
    }

    #[test]
    fn first_submitted_entry_wins() {
        let editor = editor_holding(&["post.delete"]);
        let submitted = form(&[("post_delete", "deny"), ("post_delete", "allow")]);

        let plan = plan_grant_update(RoleId::new(), &catalog(), &editor, &submitted);

        assert_eq!(plan.attach.len(), 1);
        assert!(!plan.attach[0].value);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let editor = editor_holding(&["board.config"]);
        let submitted = form(&[("board_nonexistent", "allow"), ("", "allow")]);

        let plan = plan_grant_update(RoleId::new(), &catalog(), &editor, &submitted);

        assert_eq!(plan.clear, vec![id("board.config")]);
        assert!(plan.attach.is_empty());
        assert!(plan.beyond_ceiling.is_empty());
    }

    #[test]
    fn editor_without_permissions_plans_nothing() {
        let editor = editor_holding(&[]);
        let submitted = form(&[("board_config", "allow"), ("site_config", "allow")]);

        let plan = plan_grant_update(RoleId::new(), &catalog(), &editor, &submitted);

        assert!(plan.clear.is_empty());
        assert!(plan.attach.is_empty());
        assert_eq!(plan.beyond_ceiling, vec![id("board.config"), id("site.config")]);
    }

    fn value_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("allow".to_string()),
            Just("deny".to_string()),
            Just("revoke".to_string()),
            "[a-z]{0,6}",
        ]
    }

    proptest! {
        #[test]
        fn plan_never_exceeds_the_ceiling(
            held_mask in proptest::collection::vec(any::<bool>(), CATALOG.len()),
            values in proptest::collection::vec(value_strategy(), CATALOG.len()),
        ) {
            let held: Vec<&'static str> = CATALOG
                .iter()
                .zip(&held_mask)
                .filter(|(_, h)| **h)
                .map(|(p, _)| *p)
                .collect();
            let editor = editor_holding(&held);
            let submitted: Vec<(String, String)> = CATALOG
                .iter()
                .zip(&values)
                .map(|(p, v)| (p.replace('.', "_"), v.clone()))
                .collect();

            let plan = plan_grant_update(RoleId::new(), &catalog(), &editor, &submitted);

            for cleared in &plan.clear {
                prop_assert!(editor.holds(cleared));
            }
            for attached in &plan.attach {
                prop_assert!(plan.clear.contains(&attached.permission_id));
            }
            for (raw, value) in CATALOG.iter().zip(&values) {
                let pid = id(*raw);
                let grant = plan.attach.iter().find(|g| g.permission_id == pid);
                if editor.holds(&pid) {
                    prop_assert_eq!(grant.map(|g| g.value).unwrap_or(false), value == "allow");
                } else {
                    prop_assert!(grant.is_none());
                }
            }
        }
    }
}

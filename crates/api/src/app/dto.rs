use std::collections::BTreeMap;

use serde::Serialize;

use boardcp_auth::{Capcode, Caste, PermissionGroup, PermissionSet, Role, RolePermission, form_key};
use boardcp_core::BoardUri;
use boardcp_infra::Board;

pub const ROLE_INDEX_VIEW: &str = "panel.board.roles.edit";
pub const PERMISSION_EDITOR_VIEW: &str = "panel.roles.permissions.edit";
pub const ROLES_TAB: &str = "roles";

pub const ROLE_NAME_MAX_LEN: usize = 255;

/// Field name used by HTML forms to emulate verbs other than GET/POST.
pub const METHOD_FIELD: &str = "_method";

// -------------------------
// Request forms
// -------------------------

/// Value of the first entry named `name`.
pub fn field<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

/// Whether a POST body asks to be treated as PATCH.
pub fn emulates_patch(pairs: &[(String, String)]) -> bool {
    field(pairs, METHOD_FIELD).is_some_and(|m| m.eq_ignore_ascii_case("PATCH"))
}

/// `permission[<key>]=<value>` entries as `(key, value)`, in submission order.
pub fn permission_entries(pairs: &[(String, String)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .filter_map(|(key, value)| {
            let inner = key.strip_prefix("permission[")?.strip_suffix(']')?;
            Some((inner.to_string(), value.clone()))
        })
        .collect()
}

/// Field -> messages, serialized as the `errors` object of a 422 body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }
}

/// The role creation form (`roleCaste`, `roleName`, `roleCapcode`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CreateRoleForm {
    #[serde(rename = "roleCaste")]
    pub caste: Option<String>,
    #[serde(rename = "roleName")]
    pub name: Option<String>,
    #[serde(rename = "roleCapcode")]
    pub capcode: Option<String>,
}

/// A creation form that passed field validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleDraft {
    pub caste: Caste,
    pub name: String,
    pub capcode: Option<Capcode>,
}

impl CreateRoleForm {
    pub const CASTE: &'static str = "roleCaste";
    pub const NAME: &'static str = "roleName";
    pub const CAPCODE: &'static str = "roleCapcode";

    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        Self {
            caste: field(pairs, Self::CASTE).map(str::to_string),
            name: field(pairs, Self::NAME).map(str::to_string),
            capcode: field(pairs, Self::CAPCODE).map(str::to_string),
        }
    }

    /// The caste alone, so uniqueness can be checked even when other fields fail.
    ///
    /// The value is checked as submitted; surrounding whitespace is rejected.
    pub fn validate_caste(&self, errors: &mut FieldErrors) -> Option<Caste> {
        let raw = self.caste.as_deref().unwrap_or_default();
        if raw.trim().is_empty() {
            errors.add(Self::CASTE, "The role caste field is required.");
            return None;
        }
        if raw.len() > Caste::MAX_LEN {
            errors.add(
                Self::CASTE,
                format!("The role caste may not be greater than {} characters.", Caste::MAX_LEN),
            );
            return None;
        }
        match Caste::parse(raw) {
            Ok(caste) => Some(caste),
            Err(_) => {
                errors.add(Self::CASTE, "The role caste may only contain letters and numbers.");
                None
            }
        }
    }

    /// Validate every field, collecting all errors.
    pub fn validate(&self) -> Result<RoleDraft, FieldErrors> {
        let mut errors = FieldErrors::default();
        let caste = self.validate_caste(&mut errors);

        let name = self.name.as_deref().map(str::trim).unwrap_or_default();
        if name.is_empty() {
            errors.add(Self::NAME, "The role name field is required.");
        } else if name.chars().count() > ROLE_NAME_MAX_LEN {
            errors.add(
                Self::NAME,
                format!("The role name may not be greater than {ROLE_NAME_MAX_LEN} characters."),
            );
        }

        let capcode = match Capcode::parse_optional(self.capcode.as_deref().unwrap_or_default()) {
            Ok(capcode) => capcode,
            Err(_) => {
                errors.add(
                    Self::CAPCODE,
                    format!("The role capcode may not be greater than {} characters.", Capcode::MAX_LEN),
                );
                None
            }
        };

        match caste {
            Some(caste) if errors.is_empty() => Ok(RoleDraft {
                caste,
                name: name.to_string(),
                capcode,
            }),
            _ => Err(errors),
        }
    }
}

// -------------------------
// View models
// -------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardView {
    pub board_uri: BoardUri,
    pub title: String,
}

impl From<&Board> for BoardView {
    fn from(board: &Board) -> Self {
        Self {
            board_uri: board.board_uri.clone(),
            title: board.title.clone(),
        }
    }
}

/// Links of the board's control panel tabs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardNav {
    pub roles: String,
    pub create_role: String,
}

impl BoardNav {
    pub fn for_board(board_uri: &BoardUri) -> Self {
        let roles = format!("/cp/boards/{board_uri}/roles");
        Self {
            create_role: roles.clone(),
            roles,
        }
    }
}

/// One entry of the parent-role select.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleChoice {
    pub label: String,
    pub value: String,
}

impl From<&Role> for RoleChoice {
    fn from(role: &Role) -> Self {
        Self {
            label: role.display_name().to_string(),
            value: role.caste.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleIndexView {
    pub view: &'static str,
    pub board: BoardView,
    pub choices: Vec<RoleChoice>,
    pub tab: &'static str,
    pub nav: BoardNav,
}

impl RoleIndexView {
    pub fn new(board: &Board, roles: &[Role]) -> Self {
        Self {
            view: ROLE_INDEX_VIEW,
            board: board.into(),
            choices: roles.iter().map(RoleChoice::from).collect(),
            tab: ROLES_TAB,
            nav: BoardNav::for_board(&board.board_uri),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionView {
    pub permission_id: String,
    pub form_key: String,
    /// Stored grant of the edited role; `None` when there is none.
    pub value: Option<bool>,
    /// Whether the acting user may change this permission.
    pub editable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionGroupView {
    pub group_id: String,
    pub display_order: i32,
    pub permissions: Vec<PermissionView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionEditorView {
    pub view: &'static str,
    pub board: BoardView,
    pub role: Role,
    pub groups: Vec<PermissionGroupView>,
    pub tab: &'static str,
    pub nav: BoardNav,
}

impl PermissionEditorView {
    /// `groups` must already be in display order; `grants` belong to `role`.
    pub fn new(
        board: &Board,
        role: &Role,
        groups: &[PermissionGroup],
        grants: &[RolePermission],
        editor: &PermissionSet,
    ) -> Self {
        let groups = groups
            .iter()
            .map(|group| PermissionGroupView {
                group_id: group.group_id.clone(),
                display_order: group.display_order,
                permissions: group
                    .permissions
                    .iter()
                    .map(|p| PermissionView {
                        permission_id: p.permission_id.to_string(),
                        form_key: form_key::encode(&p.permission_id),
                        value: grants
                            .iter()
                            .find(|g| g.role_id == role.role_id && g.permission_id == p.permission_id)
                            .map(|g| g.value),
                        editable: editor.holds(&p.permission_id),
                    })
                    .collect(),
            })
            .collect();

        Self {
            view: PERMISSION_EDITOR_VIEW,
            board: board.into(),
            role: role.clone(),
            groups,
            tab: ROLES_TAB,
            nav: BoardNav::for_board(&board.board_uri),
        }
    }
}

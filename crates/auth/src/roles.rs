use serde::{Deserialize, Serialize};

use boardcp_core::{BoardUri, DomainError, Entity, RoleId};

/// Machine-readable slug identifying a role within a board.
///
/// Always stored lowercased; unique per board scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Caste(String);

impl Caste {
    pub const MAX_LEN: usize = 32;

    /// Parse a caste, lowercasing it. Only ASCII letters and digits are accepted.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        if raw.is_empty() {
            return Err(DomainError::validation("caste must not be empty"));
        }
        if raw.len() > Self::MAX_LEN {
            return Err(DomainError::validation(format!(
                "caste must be at most {} characters",
                Self::MAX_LEN
            )));
        }
        if !raw.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(DomainError::validation(
                "caste may only contain letters and numbers",
            ));
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Caste {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Caste {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Caste> for String {
    fn from(value: Caste) -> Self {
        value.0
    }
}

/// Public label shown on posts made under a role (e.g. "Board Volunteer").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Capcode(String);

impl Capcode {
    pub const MAX_LEN: usize = 32;

    /// Blank input means "no capcode".
    pub fn parse_optional(raw: &str) -> Result<Option<Self>, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        if trimmed.chars().count() > Self::MAX_LEN {
            return Err(DomainError::validation(format!(
                "capcode must be at most {} characters",
                Self::MAX_LEN
            )));
        }
        Ok(Some(Self(trimmed.to_string())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Capcode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_optional(&value)?.ok_or_else(|| DomainError::validation("capcode must not be blank"))
    }
}

impl From<Capcode> for String {
    fn from(value: Capcode) -> Self {
        value.0
    }
}

/// A named permission tier.
///
/// `board_uri == None` marks a site-wide role; otherwise the role belongs to
/// that board. `weight` ranks roles for the parent-candidate hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub role_id: RoleId,
    pub board_uri: Option<BoardUri>,
    pub caste: Caste,
    pub name: String,
    pub capcode: Option<Capcode>,
    pub weight: i32,
}

impl Role {
    /// Weight given to roles created through the control panel.
    pub const DEFAULT_WEIGHT: i32 = 0;

    pub fn new_for_board(
        board_uri: BoardUri,
        caste: Caste,
        name: impl Into<String>,
        capcode: Option<Capcode>,
    ) -> Self {
        Self {
            role_id: RoleId::new(),
            board_uri: Some(board_uri),
            caste,
            name: name.into(),
            capcode,
            weight: Self::DEFAULT_WEIGHT,
        }
    }

    pub fn display_name(&self) -> &str {
        &self.name
    }

    pub fn is_site_wide(&self) -> bool {
        self.board_uri.is_none()
    }

    /// Whether this role takes part in the given board's scope.
    pub fn applies_to(&self, board: &BoardUri) -> bool {
        match &self.board_uri {
            None => true,
            Some(b) => b == board,
        }
    }
}

impl Entity for Role {
    type Id = RoleId;

    fn id(&self) -> &Self::Id {
        &self.role_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caste_is_lowercased() {
        assert_eq!(Caste::parse("JanItor2").unwrap().as_str(), "janitor2");
    }

    #[test]
    fn caste_rejects_non_alphanumeric() {
        assert!(Caste::parse("jan-itor").is_err());
        assert!(Caste::parse("jan itor").is_err());
        assert!(Caste::parse("jänitor").is_err());
        assert!(Caste::parse("").is_err());
        assert!(Caste::parse(&"a".repeat(33)).is_err());
    }

    #[test]
    fn blank_capcode_is_none() {
        assert_eq!(Capcode::parse_optional("   ").unwrap(), None);
        assert_eq!(
            Capcode::parse_optional(" Volunteer ").unwrap().unwrap().as_str(),
            "Volunteer"
        );
        assert!(Capcode::parse_optional(&"x".repeat(33)).is_err());
    }

    #[test]
    fn role_scope() {
        let b = BoardUri::parse("b").unwrap();
        let tech = BoardUri::parse("tech").unwrap();
        let board_role = Role::new_for_board(b.clone(), Caste::parse("janitor").unwrap(), "Janitor", None);

        assert!(board_role.applies_to(&b));
        assert!(!board_role.applies_to(&tech));
        assert_eq!(board_role.weight, Role::DEFAULT_WEIGHT);

        let site = Role {
            board_uri: None,
            ..board_role
        };
        assert!(site.is_site_wide());
        assert!(site.applies_to(&tech));
    }
}

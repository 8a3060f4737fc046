//! Form-field key codec for permission ids.
//!
//! HTML form field names such as `permission[board.config]` do not survive
//! every form encoder, so the editor transports ids with each `.` replaced by
//! `_` (`permission[board_config]`).
//!
//! | id character | form key character |
//! |---|---|
//! | `.` | `_` |
//! | `[a-z0-9]` | unchanged |
//!
//! [`PermissionId`] never contains `_`, which makes the mapping a bijection over
//! valid ids: `decode(&encode(id)) == id.as_str()`.

use crate::PermissionId;

const ID_SEPARATOR: char = '.';
const FORM_SEPARATOR: char = '_';

/// Encode a permission id for use as a form field key.
pub fn encode(id: &PermissionId) -> String {
    id.as_str().replace(ID_SEPARATOR, &FORM_SEPARATOR.to_string())
}

/// Decode a submitted form key back to a permission id string.
///
/// The result is not validated; callers compare it against catalog ids.
pub fn decode(key: &str) -> String {
    key.replace(FORM_SEPARATOR, &ID_SEPARATOR.to_string())
}

//! `boardcp-core`: identifiers and the error model shared by every crate.
//!
//! Pure domain primitives; no infrastructure concerns.

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::DomainError;
pub use id::{BoardUri, RoleId, UserId};

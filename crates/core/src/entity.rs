//! Identity of persisted records.

/// Something stored and looked up by a stable identifier.
///
/// Stores key their tables by `id()`, so a role keeps its identity while its
/// grants are replaced.
pub trait Entity {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;
}

//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Reference data (products, customers, warehouses) is identified by id and
/// looked up by it; two records with the same id are the same thing even if a
/// display name changed in between.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

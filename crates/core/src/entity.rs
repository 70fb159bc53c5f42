//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Entities are referenced from other records by identifier only, never by
/// back-pointer: an invoice stores the `CatalogUnitId` of each line, not the
/// catalog unit itself.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

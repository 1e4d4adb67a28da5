//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Group members are entities: two members with the same weight and balance are
/// still different people.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + Ord + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

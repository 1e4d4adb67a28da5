//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. To "modify"
/// one, build a new one. `Money` and `Currency` are value objects; splits and
/// simplified transfers are derived values built on top of them.
///
/// ```ignore
/// let a = Money::from_minor(2_000);
/// let b = Money::from_minor(2_000);
/// assert_eq!(a, b);
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**: two exchange rates
/// of `5.50` are the same rate, regardless of where they came from. To "change"
/// one, build a new one.
///
/// Rates, percentages, dimensions and invoice numbers are value objects;
/// catalog units and invoices are entities (see [`crate::Entity`]).
///
/// ```ignore
/// #[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// struct RiskRate(Decimal);
///
/// impl ValueObject for RiskRate {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

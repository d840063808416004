//! Value object trait: equality by value, not identity.

/// Marker trait for immutable domain values compared by their attributes.
///
/// `Amount` and `FiscalYear` are value objects: two instances with the same
/// attributes are interchangeable. Entities (`Invoice`, `Payment`) carry
/// identity instead.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

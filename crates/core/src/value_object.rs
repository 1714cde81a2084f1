//! Value object marker.
//!
//! Value objects carry no identity: two period windows with the same pattern and
//! bounds are the same window, two due-date rules with the same parameters resolve
//! the same dates. Implementors are immutable and compared by value.

/// Marker trait for immutable, compare-by-value domain values.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

//! Entity trait: records that keep their identity while their attributes change.

/// Anything the engine persists and later looks up by id (work orders, periods,
/// task instances, invoices).
pub trait Entity {
    /// Strongly-typed identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the identifier.
    fn id(&self) -> Self::Id;
}

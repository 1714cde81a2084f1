use chrono::NaiveDate;

/// A domain-agnostic event.
///
/// Events are immutable facts with a stable type name and schema version.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "schedule.period.materialized").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// Business day the event happened on (the engine's `today`).
    fn occurred_on(&self) -> NaiveDate;
}

use cadence_core::Money;

/// First positive price among the period override, the work order amount and
/// the service default. Zero or negative values count as unset.
pub fn resolve_price(
    period_override: Option<Money>,
    work_order_amount: Option<Money>,
    service_default: Option<Money>,
) -> Option<Money> {
    [period_override, work_order_amount, service_default]
        .into_iter()
        .flatten()
        .find(|price| price.is_positive())
}

use crate::domain::error::SipsimError;
use crate::domain::lot::UNIT_TOLERANCE;
use crate::domain::price::MarketView;
use crate::domain::strategy::{Allocation, Order};
use crate::domain::transaction::Holdings;

/// Orders that move `holdings` to `weights`.
///
/// Only instruments named in `weights` are valued and traded. A difference
/// worth less than the unit-rounding tolerance or `min_order_amount` is
/// skipped, so holdings already on target produce no orders. Sells come
/// before buys.
pub fn target_orders(
    holdings: &Holdings,
    market: MarketView<'_>,
    weights: &Allocation,
    min_order_amount: f64,
) -> Result<Vec<Order>, SipsimError> {
    let mut priced = Vec::with_capacity(weights.len());
    let mut total_value = 0.0;
    for (instrument, &weight) in weights {
        let price = market.price(instrument)?;
        let held = holdings.get(instrument).copied().unwrap_or(0.0);
        total_value += held * price;
        priced.push((instrument, weight, held, price));
    }

    let mut orders: Vec<Order> = priced
        .into_iter()
        .filter_map(|(instrument, weight, held, price)| {
            let diff = total_value * weight - held * price;
            let below_tolerance = diff.abs() / price < UNIT_TOLERANCE;
            (!below_tolerance && diff.abs() >= min_order_amount)
                .then(|| Order::new(instrument.clone(), diff))
        })
        .collect();
    orders.sort_by(|a, b| a.amount.total_cmp(&b.amount));
    Ok(orders)
}

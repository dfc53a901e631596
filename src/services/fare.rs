use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FareBreakdown {
    pub seat_total: Decimal,
    pub meal_total: Decimal,
    pub total_amount: Decimal,
}

/// Sums seat and meal prices at currency precision. Order of inputs does not matter.
pub fn compute<S, M>(seat_prices: S, meal_prices: M) -> FareBreakdown
where
    S: IntoIterator<Item = Decimal>,
    M: IntoIterator<Item = Decimal>,
{
    let seat_total = seat_prices.into_iter().sum::<Decimal>().round_dp(2);
    let meal_total = meal_prices.into_iter().sum::<Decimal>().round_dp(2);

    FareBreakdown {
        seat_total,
        meal_total,
        total_amount: (seat_total + meal_total).round_dp(2),
    }
}

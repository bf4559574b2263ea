use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::credits::Credits;
use crate::error::CatalogError;

const MILLIS_PER_SECOND: i64 = 1_000;

/// How the actual price of a completed call is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CostModel {
    /// Every call costs exactly this amount.
    Fixed(Credits),
    /// `duration_ms * (baseline / 1000)`: the baseline is the price of one
    /// second of downstream latency.
    DurationProportional { baseline: Credits },
}

impl CostModel {
    pub fn actual_cost(&self, elapsed: Duration) -> Credits {
        match self {
            CostModel::Fixed(price) => *price,
            CostModel::DurationProportional { baseline } => {
                duration_proportional_cost(*baseline, elapsed)
            }
        }
    }
}

/// Pricing resolved for a single call before it is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Estimate {
    pub estimated: Credits,
    pub model: CostModel,
}

impl Estimate {
    pub fn actual_cost(&self, elapsed: Duration) -> Credits {
        self.model.actual_cost(elapsed)
    }
}

/// Source of per-call pricing for a proxied API.
pub trait CostEstimator {
    /// Fails with [`CatalogError::NotFound`] unless `api_id` names a known,
    /// enabled API.
    fn estimate(&self, api_id: &str) -> Result<Estimate, CatalogError>;
}

/// `duration_ms * baseline / 1000`. A call too fast to register any cost
/// is billed at the baseline.
pub fn duration_proportional_cost(baseline: Credits, elapsed: Duration) -> Credits {
    let micros = i64::try_from(elapsed.as_micros()).unwrap_or(i64::MAX);
    let duration_ms = Decimal::new(micros, 3);
    let per_ms = baseline.as_decimal() / Decimal::from(MILLIS_PER_SECOND);
    duration_ms
        .checked_mul(per_ms)
        .map(Credits::new)
        .filter(|cost| !cost.is_zero())
        .unwrap_or(baseline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn fifty_milliseconds_of_a_ten_thousandth() {
        let baseline = Credits::new(dec!(0.0001));
        let actual = duration_proportional_cost(baseline, Duration::from_millis(50));
        assert_eq!(actual, Credits::new(dec!(0.000005)));
    }

    #[test]
    fn zero_duration_bills_the_baseline() {
        let baseline = Credits::new(dec!(0.0001));
        assert_eq!(duration_proportional_cost(baseline, Duration::ZERO), baseline);
    }

    #[test]
    fn sub_millisecond_precision_is_kept() {
        let baseline = Credits::new(dec!(0.001));
        let actual = duration_proportional_cost(baseline, Duration::from_micros(1_500));
        assert_eq!(actual, Credits::new(dec!(0.0000015)));
    }

    #[test]
    fn slow_calls_can_exceed_the_estimate() {
        let baseline = Credits::new(dec!(0.0001));
        let actual = duration_proportional_cost(baseline, Duration::from_millis(2_500));
        assert_eq!(actual, Credits::new(dec!(0.00025)));
        assert!(actual > baseline);
    }

    #[test]
    fn fixed_model_ignores_latency() {
        let model = CostModel::Fixed(Credits::new(dec!(0.02)));
        assert_eq!(
            model.actual_cost(Duration::from_secs(9)),
            Credits::new(dec!(0.02))
        );
    }
}

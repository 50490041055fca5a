//! Flat taker fee.

use chainmatch_types::{AccountId, EngineConfig, constants};
use rust_decimal::{Decimal, RoundingStrategy};

/// Flat fee charged to the taker on the amount it receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeSchedule {
    /// Fraction of the received amount (0.001 = 10 bps).
    pub rate: Decimal,
    /// Recipient of every fee.
    pub fee_account: AccountId,
}

impl FeeSchedule {
    #[must_use]
    pub fn new(rate: Decimal, fee_account: AccountId) -> Self {
        Self { rate, fee_account }
    }

    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.taker_fee_rate(), config.fee_account)
    }

    /// A schedule that never charges anything.
    #[must_use]
    pub fn zero(fee_account: AccountId) -> Self {
        Self::new(Decimal::ZERO, fee_account)
    }

    /// Fee owed on `received`, rounded toward zero so the fee never exceeds
    /// the exact product.
    #[must_use]
    pub fn fee_on(&self, received: Decimal) -> Decimal {
        if self.rate.is_zero() {
            return Decimal::ZERO;
        }
        (received * self.rate)
            .round_dp_with_strategy(constants::FEE_PRECISION, RoundingStrategy::ToZero)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(bps: u32) -> FeeSchedule {
        let config = EngineConfig {
            taker_fee_bps: bps,
            ..EngineConfig::default()
        };
        FeeSchedule::from_config(&config)
    }

    #[test]
    fn ten_bps_of_three_hundred() {
        assert_eq!(schedule(10).fee_on(Decimal::new(300, 0)), Decimal::new(3, 1));
    }

    #[test]
    fn zero_rate_charges_nothing() {
        assert_eq!(schedule(0).fee_on(Decimal::new(300, 0)), Decimal::ZERO);
    }

    #[test]
    fn fee_rounds_toward_zero() {
        // 0.000000015 * 0.001 would need 12 places; it truncates to 0.
        let fee = schedule(10).fee_on(Decimal::new(15, 9));
        assert_eq!(fee, Decimal::ZERO);
        // 1.23456789 * 0.0025 = 0.003086419725 -> 0.00308641
        let fee = schedule(25).fee_on(Decimal::new(123_456_789, 8));
        assert_eq!(fee, Decimal::new(308_641, 8));
    }

    #[test]
    fn fee_never_exceeds_received() {
        let s = schedule(10_000);
        assert_eq!(s.fee_on(Decimal::new(7, 0)), Decimal::new(7, 0));
    }
}

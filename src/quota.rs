use snafu::ensure;

use crate::errors::{InvalidQuotaSnafu, Result};

/// Strategy computing the vote threshold a candidate must reach to be
/// elected, from the live total weight and the seats remaining.
///
/// Implementations must return a positive value whenever the total weight is
/// positive and at least one seat remains, and fail with
/// [`VotingError::InvalidQuota`](crate::VotingError::InvalidQuota) when asked
/// for a threshold with no seats.
pub trait QuotaRule {
    fn threshold(&self, total_weight: f64, seats: usize) -> Result<f64>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Droop quota: `floor(total / (seats + 1)) + 1`.
///
/// The floor applies to the current total weight, which may be fractional
/// after surplus transfers.
pub struct DroopQuota;

impl QuotaRule for DroopQuota {
    fn threshold(&self, total_weight: f64, seats: usize) -> Result<f64> {
        ensure!(seats >= 1, InvalidQuotaSnafu { seats });
        Ok((total_weight / (seats as f64 + 1.0)).floor() + 1.0)
    }

    fn name(&self) -> &'static str {
        "droop"
    }
}

/// Hare quota: `total / seats`, with no floor or increment.
pub struct HareQuota;

impl QuotaRule for HareQuota {
    fn threshold(&self, total_weight: f64, seats: usize) -> Result<f64> {
        ensure!(seats >= 1, InvalidQuotaSnafu { seats });
        Ok(total_weight / seats as f64)
    }

    fn name(&self) -> &'static str {
        "hare"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VotingError;

    #[test]
    fn droop_single_seat_majority() {
        assert_eq!(DroopQuota.threshold(7.0, 1).unwrap(), 4.0);
        assert_eq!(DroopQuota.threshold(100.0, 1).unwrap(), 51.0);
    }

    #[test]
    fn droop_floors_fractional_totals() {
        assert_eq!(DroopQuota.threshold(7.5, 2).unwrap(), 3.0);
    }

    #[test]
    fn hare_is_exact_division() {
        assert_eq!(HareQuota.threshold(7.0, 2).unwrap(), 3.5);
    }

    #[test]
    fn zero_seats_is_rejected() {
        assert_eq!(
            DroopQuota.threshold(7.0, 0).unwrap_err(),
            VotingError::InvalidQuota { seats: 0 }
        );
        assert!(HareQuota.threshold(7.0, 0).is_err());
    }

    #[test]
    fn positive_whenever_votes_exist() {
        assert!(DroopQuota.threshold(0.5, 3).unwrap() > 0.0);
        assert!(HareQuota.threshold(0.5, 3).unwrap() > 0.0);
    }
}

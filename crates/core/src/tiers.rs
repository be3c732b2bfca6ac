//! Tier reference data and the tier resolver.
//!
//! A [`TierTable`] is the validated, read-only tier list a run works against. It can only be
//! built from a non-empty list sorted strictly descending by baseline, which makes
//! [`resolve_tier`] total.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::tier::{MembershipTier, TierId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TierTableError {
    #[error("no membership tiers are configured")]
    Empty,
    #[error("stored tier data is malformed: {0}")]
    Malformed(String),
    #[error("tier `{name}` has a negative baseline ({baseline})")]
    NegativeBaseline { name: String, baseline: Decimal },
    #[error("tiers are not sorted descending by baseline: `{previous}` ({previous_baseline}) precedes `{next}` ({next_baseline})")]
    NotDescending {
        previous: String,
        previous_baseline: Decimal,
        next: String,
        next_baseline: Decimal,
    },
    #[error("tiers `{first}` and `{second}` share baseline {baseline}")]
    DuplicateBaseline { first: String, second: String, baseline: Decimal },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TierTable {
    tiers: Vec<MembershipTier>,
}

impl TierTable {
    /// Validates a tier list that is expected to already be sorted descending by baseline.
    pub fn new(tiers: Vec<MembershipTier>) -> Result<Self, TierTableError> {
        if tiers.is_empty() {
            return Err(TierTableError::Empty);
        }

        if let Some(tier) = tiers.iter().find(|tier| tier.baseline.is_sign_negative()) {
            return Err(TierTableError::NegativeBaseline {
                name: tier.name.clone(),
                baseline: tier.baseline,
            });
        }

        for pair in tiers.windows(2) {
            let (previous, next) = (&pair[0], &pair[1]);
            if previous.baseline == next.baseline {
                return Err(TierTableError::DuplicateBaseline {
                    first: previous.name.clone(),
                    second: next.name.clone(),
                    baseline: previous.baseline,
                });
            }
            if previous.baseline < next.baseline {
                return Err(TierTableError::NotDescending {
                    previous: previous.name.clone(),
                    previous_baseline: previous.baseline,
                    next: next.name.clone(),
                    next_baseline: next.baseline,
                });
            }
        }

        Ok(Self { tiers })
    }

    pub fn tiers(&self) -> &[MembershipTier] {
        &self.tiers
    }

    /// The lowest-baseline tier, assigned when nothing else qualifies.
    pub fn floor(&self) -> &MembershipTier {
        // Non-empty by construction.
        &self.tiers[self.tiers.len() - 1]
    }

    /// Whether the floor tier follows the zero-baseline convention.
    pub fn has_zero_floor(&self) -> bool {
        self.floor().baseline.is_zero()
    }

    pub fn get(&self, id: TierId) -> Option<&MembershipTier> {
        self.tiers.iter().find(|tier| tier.id == id)
    }
}

/// Returns the highest-baseline tier whose baseline does not exceed `amount`, falling back to
/// the floor tier.
pub fn resolve_tier(amount: Decimal, table: &TierTable) -> TierId {
    table
        .tiers()
        .iter()
        .find(|tier| tier.baseline <= amount)
        .unwrap_or_else(|| table.floor())
        .id
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{resolve_tier, TierTable, TierTableError};
    use crate::domain::tier::{MembershipTier, TierId};

    fn tier(id: i64, name: &str, baseline: i64) -> MembershipTier {
        MembershipTier {
            id: TierId(id),
            name: name.to_string(),
            baseline: Decimal::from(baseline),
            discount_rate: Decimal::ZERO,
        }
    }

    fn standard_table() -> TierTable {
        TierTable::new(vec![
            tier(4, "DIAMOND", 10_000_000),
            tier(3, "GOLD", 1_000_000),
            tier(2, "SILVER", 100_000),
            tier(1, "BRONZE", 0),
        ])
        .expect("standard tiers are valid")
    }

    #[test]
    fn amount_equal_to_baseline_selects_that_tier() {
        assert_eq!(resolve_tier(Decimal::from(1_000_000), &standard_table()), TierId(3));
        assert_eq!(resolve_tier(Decimal::from(100_000), &standard_table()), TierId(2));
    }

    #[test]
    fn amount_between_baselines_selects_lower_tier() {
        assert_eq!(resolve_tier(Decimal::from(50_000), &standard_table()), TierId(1));
        assert_eq!(resolve_tier(Decimal::new(99_999_99, 2), &standard_table()), TierId(1));
    }

    #[test]
    fn amount_above_top_baseline_selects_top_tier() {
        assert_eq!(resolve_tier(Decimal::from(10_000_001), &standard_table()), TierId(4));
    }

    #[test]
    fn falls_back_to_floor_when_nothing_qualifies() {
        let table = TierTable::new(vec![tier(2, "GOLD", 1_000), tier(1, "SILVER", 500)])
            .expect("valid tiers");

        assert!(!table.has_zero_floor());
        assert_eq!(resolve_tier(Decimal::from(10), &table), TierId(1));
    }

    #[test]
    fn resolving_is_deterministic() {
        let table = standard_table();
        let amount = Decimal::new(123_456_789, 2);

        let first = resolve_tier(amount, &table);
        let second = resolve_tier(amount, &table);
        assert_eq!(first, second);
    }

    #[test]
    fn every_amount_maps_to_greatest_qualifying_baseline() {
        let table = standard_table();
        for amount in [0, 1, 99_999, 100_000, 100_001, 999_999, 5_000_000, 10_000_000, 99_000_000] {
            let amount = Decimal::from(amount);
            let resolved = table.get(resolve_tier(amount, &table)).expect("known tier");
            let best = table
                .tiers()
                .iter()
                .filter(|tier| tier.baseline <= amount)
                .map(|tier| tier.baseline)
                .max()
                .expect("zero floor qualifies");
            assert_eq!(resolved.baseline, best, "amount {amount}");
        }
    }

    #[test]
    fn empty_tier_list_is_rejected() {
        assert_eq!(TierTable::new(Vec::new()), Err(TierTableError::Empty));
    }

    #[test]
    fn ascending_tier_list_is_rejected() {
        let error = TierTable::new(vec![tier(1, "BRONZE", 0), tier(2, "GOLD", 1_000)])
            .expect_err("ascending order is invalid");
        assert!(matches!(error, TierTableError::NotDescending { .. }));
    }

    #[test]
    fn duplicate_and_negative_baselines_are_rejected() {
        let duplicate = TierTable::new(vec![tier(2, "GOLD", 100), tier(1, "ALSO_GOLD", 100)]);
        assert!(matches!(duplicate, Err(TierTableError::DuplicateBaseline { .. })));

        let negative = TierTable::new(vec![tier(1, "DEBT", -1)]);
        assert!(matches!(negative, Err(TierTableError::NegativeBaseline { .. })));
    }
}

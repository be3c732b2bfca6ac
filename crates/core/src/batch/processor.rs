use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::customer::{Customer, CustomerId};
use crate::domain::run::TierAssignment;
use crate::tiers::{resolve_tier, TierTable};

/// Record-level problems. The offending customer is skipped, the run continues.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("customer {customer_id} has a negative monthly purchase amount ({amount})")]
    NegativeAmount { customer_id: CustomerId, amount: Decimal },
}

pub struct TierAssignmentProcessor<'a> {
    tiers: &'a TierTable,
}

impl<'a> TierAssignmentProcessor<'a> {
    pub fn new(tiers: &'a TierTable) -> Self {
        Self { tiers }
    }

    pub fn process(&self, customer: &Customer) -> Result<TierAssignment, RecordError> {
        let amount = customer.monthly_purchase_amount;
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(RecordError::NegativeAmount { customer_id: customer.id, amount });
        }

        Ok(TierAssignment { customer_id: customer.id, tier_id: resolve_tier(amount, self.tiers) })
    }
}

use std::sync::Arc;

use tracing::{debug, info};

use super::domain::UserId;
use super::repository::{CaseStudyStore, CreditDebit, CreditGrant, RepositoryError};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient credits (required {required}, available {available})")]
    InsufficientCredits { required: u32, available: u64 },
    #[error("credit amount must be a positive integer, got {0}")]
    InvalidAmount(i64),
    #[error("granting {amount} credits would overflow the balance of {balance}")]
    BalanceOverflow { amount: u64, balance: u64 },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Per-student credit balance. The store's atomic debit is the only gate for new requests.
pub struct CreditLedger<S> {
    store: Arc<S>,
}

impl<S> CreditLedger<S>
where
    S: CaseStudyStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn balance(&self, student: &UserId) -> Result<u64, LedgerError> {
        let user = self
            .store
            .user(student)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(user.credit_balance)
    }

    /// Remove `amount` credits, failing without any write when the balance is too small.
    pub fn debit(&self, student: &UserId, amount: u32) -> Result<u64, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(0));
        }

        match self.store.debit_credits(student, amount)? {
            CreditDebit::Applied { balance } => {
                debug!(student = %student, amount, balance, "credits debited");
                Ok(balance)
            }
            CreditDebit::Insufficient { balance } => Err(LedgerError::InsufficientCredits {
                required: amount,
                available: balance,
            }),
        }
    }

    /// Add credits. Any positive amount is accepted; a sum past `u64::MAX` is refused
    /// without a write.
    pub fn credit(&self, student: &UserId, amount: i64) -> Result<u64, LedgerError> {
        let amount = u64::try_from(amount)
            .ok()
            .filter(|amount| *amount > 0)
            .ok_or(LedgerError::InvalidAmount(amount))?;

        match self.store.add_credits(student, amount)? {
            CreditGrant::Applied { balance } => {
                info!(student = %student, amount, balance, "credits granted");
                Ok(balance)
            }
            CreditGrant::Overflow { balance } => {
                Err(LedgerError::BalanceOverflow { amount, balance })
            }
        }
    }
}

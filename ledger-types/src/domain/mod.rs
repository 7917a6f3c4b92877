//! Domain models for the ledger.

pub mod account;
pub mod event;
pub mod money;
pub mod transaction;

use chrono::{DateTime, SubsecRound, Utc};

pub use account::{Account, AccountContext, AccountId, AccountKey, AccountType, UserId};
pub use event::{DomainEvent, event_types};
pub use money::{Currency, Money};
pub use transaction::{BalanceEffect, Transaction, TransactionId, TransactionType};

/// Current time at microsecond precision, the finest both stores keep.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

//! Domain events.
//!
//! Events are immutable facts describing a completed aggregate state change.
//! Aggregates append them while mutating; the use case drains them after a
//! successful commit and hands them to the event bus. They are never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::{AccountId, UserId};
use super::money::{Currency, Money};
use super::transaction::{TransactionId, TransactionType};

/// Event type keys used for bus subscriptions.
pub mod event_types {
    pub const ACCOUNT_CREATED: &str = "AccountCreated";
    pub const ACCOUNT_BALANCE_UPDATED: &str = "AccountBalanceUpdated";
    pub const ACCOUNT_RENAMED: &str = "AccountRenamed";
    pub const ACCOUNT_ACTIVATED: &str = "AccountActivated";
    pub const ACCOUNT_DEACTIVATED: &str = "AccountDeactivated";
    pub const TRANSACTION_CREATED: &str = "TransactionCreated";
    pub const TRANSACTION_UPDATED: &str = "TransactionUpdated";
    pub const TRANSACTION_DELETED: &str = "TransactionDeleted";

    /// Every event type this crate emits.
    pub const ALL: [&str; 8] = [
        ACCOUNT_CREATED,
        ACCOUNT_BALANCE_UPDATED,
        ACCOUNT_RENAMED,
        ACCOUNT_ACTIVATED,
        ACCOUNT_DEACTIVATED,
        TRANSACTION_CREATED,
        TRANSACTION_UPDATED,
        TRANSACTION_DELETED,
    ];
}

pub const ACCOUNT_AGGREGATE: &str = "Account";
pub const TRANSACTION_AGGREGATE: &str = "Transaction";

/// A fact emitted by an aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    AccountCreated {
        account_id: AccountId,
        user_id: UserId,
        currency: Currency,
        occurred_at: DateTime<Utc>,
    },

    /// Balance changed through a credit or a debit.
    AccountBalanceUpdated {
        account_id: AccountId,
        user_id: UserId,
        previous: Money,
        current: Money,
        occurred_at: DateTime<Utc>,
    },

    AccountRenamed {
        account_id: AccountId,
        user_id: UserId,
        name: String,
        occurred_at: DateTime<Utc>,
    },

    AccountActivated {
        account_id: AccountId,
        user_id: UserId,
        occurred_at: DateTime<Utc>,
    },

    AccountDeactivated {
        account_id: AccountId,
        user_id: UserId,
        occurred_at: DateTime<Utc>,
    },

    TransactionCreated {
        transaction_id: TransactionId,
        account_id: AccountId,
        transaction_type: TransactionType,
        amount: Money,
        occurred_at: DateTime<Utc>,
    },

    TransactionUpdated {
        transaction_id: TransactionId,
        account_id: AccountId,
        previous_type: TransactionType,
        previous_amount: Money,
        transaction_type: TransactionType,
        amount: Money,
        occurred_at: DateTime<Utc>,
    },

    TransactionDeleted {
        transaction_id: TransactionId,
        account_id: AccountId,
        transaction_type: TransactionType,
        amount: Money,
        occurred_at: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::AccountCreated { .. } => event_types::ACCOUNT_CREATED,
            DomainEvent::AccountBalanceUpdated { .. } => event_types::ACCOUNT_BALANCE_UPDATED,
            DomainEvent::AccountRenamed { .. } => event_types::ACCOUNT_RENAMED,
            DomainEvent::AccountActivated { .. } => event_types::ACCOUNT_ACTIVATED,
            DomainEvent::AccountDeactivated { .. } => event_types::ACCOUNT_DEACTIVATED,
            DomainEvent::TransactionCreated { .. } => event_types::TRANSACTION_CREATED,
            DomainEvent::TransactionUpdated { .. } => event_types::TRANSACTION_UPDATED,
            DomainEvent::TransactionDeleted { .. } => event_types::TRANSACTION_DELETED,
        }
    }

    /// ID of the aggregate that emitted the event.
    pub fn aggregate_id(&self) -> Uuid {
        match self {
            DomainEvent::AccountCreated { account_id, .. }
            | DomainEvent::AccountBalanceUpdated { account_id, .. }
            | DomainEvent::AccountRenamed { account_id, .. }
            | DomainEvent::AccountActivated { account_id, .. }
            | DomainEvent::AccountDeactivated { account_id, .. } => account_id.into_uuid(),
            DomainEvent::TransactionCreated { transaction_id, .. }
            | DomainEvent::TransactionUpdated { transaction_id, .. }
            | DomainEvent::TransactionDeleted { transaction_id, .. } => {
                transaction_id.into_uuid()
            }
        }
    }

    pub fn aggregate_type(&self) -> &'static str {
        match self {
            DomainEvent::AccountCreated { .. }
            | DomainEvent::AccountBalanceUpdated { .. }
            | DomainEvent::AccountRenamed { .. }
            | DomainEvent::AccountActivated { .. }
            | DomainEvent::AccountDeactivated { .. } => ACCOUNT_AGGREGATE,
            DomainEvent::TransactionCreated { .. }
            | DomainEvent::TransactionUpdated { .. }
            | DomainEvent::TransactionDeleted { .. } => TRANSACTION_AGGREGATE,
        }
    }

    /// The account whose balance or state the event concerns.
    pub fn account_id(&self) -> AccountId {
        match self {
            DomainEvent::AccountCreated { account_id, .. }
            | DomainEvent::AccountBalanceUpdated { account_id, .. }
            | DomainEvent::AccountRenamed { account_id, .. }
            | DomainEvent::AccountActivated { account_id, .. }
            | DomainEvent::AccountDeactivated { account_id, .. }
            | DomainEvent::TransactionCreated { account_id, .. }
            | DomainEvent::TransactionUpdated { account_id, .. }
            | DomainEvent::TransactionDeleted { account_id, .. } => *account_id,
        }
    }

    /// Owner of the account, when the event carries it.
    ///
    /// Transaction events do not; subscribers resolve the owner themselves.
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            DomainEvent::AccountCreated { user_id, .. }
            | DomainEvent::AccountBalanceUpdated { user_id, .. }
            | DomainEvent::AccountRenamed { user_id, .. }
            | DomainEvent::AccountActivated { user_id, .. }
            | DomainEvent::AccountDeactivated { user_id, .. } => Some(*user_id),
            DomainEvent::TransactionCreated { .. }
            | DomainEvent::TransactionUpdated { .. }
            | DomainEvent::TransactionDeleted { .. } => None,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::AccountCreated { occurred_at, .. }
            | DomainEvent::AccountBalanceUpdated { occurred_at, .. }
            | DomainEvent::AccountRenamed { occurred_at, .. }
            | DomainEvent::AccountActivated { occurred_at, .. }
            | DomainEvent::AccountDeactivated { occurred_at, .. }
            | DomainEvent::TransactionCreated { occurred_at, .. }
            | DomainEvent::TransactionUpdated { occurred_at, .. }
            | DomainEvent::TransactionDeleted { occurred_at, .. } => *occurred_at,
        }
    }
}

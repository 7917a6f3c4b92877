//! Transaction (ledger entry) aggregate.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::{Account, AccountId};
use super::event::DomainEvent;
use super::money::Money;
use crate::error::DomainError;

const MAX_DESCRIPTION_LEN: usize = 255;

/// Unique identifier for a Transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Creates a new random TransactionId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a TransactionId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns the UUID value.
    pub fn into_uuid(self) -> Uuid {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TransactionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The direction of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// Money coming into the account
    Income,
    /// Money leaving the account
    Expense,
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::Income => write!(f, "INCOME"),
            TransactionType::Expense => write!(f, "EXPENSE"),
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INCOME" => Ok(TransactionType::Income),
            "EXPENSE" => Ok(TransactionType::Expense),
            other => Err(DomainError::ValidationError(format!(
                "Unknown transaction type: {}",
                other
            ))),
        }
    }
}

/// What a ledger entry does to its account's balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceEffect {
    Credit(Money),
    Debit(Money),
}

impl BalanceEffect {
    pub fn inverse(self) -> Self {
        match self {
            BalanceEffect::Credit(amount) => BalanceEffect::Debit(amount),
            BalanceEffect::Debit(amount) => BalanceEffect::Credit(amount),
        }
    }

    pub fn is_credit(&self) -> bool {
        matches!(self, BalanceEffect::Credit(_))
    }
}

/// A recorded income or expense against one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    id: TransactionId,
    account_id: AccountId,
    transaction_type: TransactionType,
    amount: Money,
    description: String,
    occurred_on: NaiveDate,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    /// Soft-delete marker
    deleted_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl Transaction {
    /// Records a new entry against `account`.
    ///
    /// The amount must be positive and in the account's currency. The caller
    /// applies [`Transaction::effect`] to the account in the same unit of work.
    pub fn record(
        account: &Account,
        transaction_type: TransactionType,
        amount: Money,
        description: String,
        occurred_on: NaiveDate,
    ) -> Result<Self, DomainError> {
        validate_amount(account, amount)?;
        let description = validate_description(description)?;
        let now = super::now();
        let id = TransactionId::new();

        Ok(Self {
            id,
            account_id: account.id(),
            transaction_type,
            amount,
            description,
            occurred_on,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            events: vec![DomainEvent::TransactionCreated {
                transaction_id: id,
                account_id: account.id(),
                transaction_type,
                amount,
                occurred_at: now,
            }],
        })
    }

    /// Reconstructs a transaction from database fields.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: TransactionId,
        account_id: AccountId,
        transaction_type: TransactionType,
        amount: Money,
        description: String,
        occurred_on: NaiveDate,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        deleted_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            account_id,
            transaction_type,
            amount,
            description,
            occurred_on,
            created_at,
            updated_at,
            deleted_at,
            events: Vec::new(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.transaction_type
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn occurred_on(&self) -> NaiveDate {
        self.occurred_on
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// The balance change this entry currently stands for.
    pub fn effect(&self) -> BalanceEffect {
        match self.transaction_type {
            TransactionType::Income => BalanceEffect::Credit(self.amount),
            TransactionType::Expense => BalanceEffect::Debit(self.amount),
        }
    }

    pub fn pending_events(&self) -> &[DomainEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }

    /// Replaces type, amount, description and date.
    ///
    /// Returns the effect that was in force before the revision so the caller
    /// can reverse it on the account.
    pub fn revise(
        &mut self,
        account: &Account,
        transaction_type: TransactionType,
        amount: Money,
        description: String,
        occurred_on: NaiveDate,
    ) -> Result<BalanceEffect, DomainError> {
        self.ensure_live()?;
        if account.id() != self.account_id {
            return Err(DomainError::ValidationError(
                "Transaction belongs to a different account".into(),
            ));
        }
        validate_amount(account, amount)?;
        let description = validate_description(description)?;

        let previous_effect = self.effect();
        let previous_type = self.transaction_type;
        let previous_amount = self.amount;

        self.transaction_type = transaction_type;
        self.amount = amount;
        self.description = description;
        self.occurred_on = occurred_on;
        self.updated_at = super::now();
        self.events.push(DomainEvent::TransactionUpdated {
            transaction_id: self.id,
            account_id: self.account_id,
            previous_type,
            previous_amount,
            transaction_type,
            amount,
            occurred_at: self.updated_at,
        });

        Ok(previous_effect)
    }

    /// Soft-deletes the entry and returns the effect to reverse.
    pub fn mark_deleted(&mut self) -> Result<BalanceEffect, DomainError> {
        self.ensure_live()?;
        let now = super::now();
        self.deleted_at = Some(now);
        self.updated_at = now;
        self.events.push(DomainEvent::TransactionDeleted {
            transaction_id: self.id,
            account_id: self.account_id,
            transaction_type: self.transaction_type,
            amount: self.amount,
            occurred_at: now,
        });
        Ok(self.effect())
    }

    fn ensure_live(&self) -> Result<(), DomainError> {
        if self.is_deleted() {
            return Err(DomainError::TransactionDeleted(self.id));
        }
        Ok(())
    }
}

fn validate_amount(account: &Account, amount: Money) -> Result<(), DomainError> {
    if amount.is_zero() {
        return Err(DomainError::ValidationError(
            "Amount must be positive".into(),
        ));
    }
    if amount.currency() != account.currency() {
        return Err(DomainError::CurrencyMismatch {
            expected: account.currency(),
            got: amount.currency(),
        });
    }
    Ok(())
}

fn validate_description(description: String) -> Result<String, DomainError> {
    let trimmed = description.trim();
    if trimmed.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(DomainError::ValidationError(format!(
            "Description cannot exceed {} characters",
            MAX_DESCRIPTION_LEN
        )));
    }
    Ok(trimmed.to_string())
}

//! Account aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::DomainEvent;
use super::money::{Currency, Money};
use super::transaction::BalanceEffect;
use crate::error::DomainError;

const MAX_NAME_LEN: usize = 100;

/// Unique identifier for an Account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Creates a new random AccountId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an AccountId from an existing UUID.
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

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AccountId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Identifier of the user that owns accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn into_uuid(self) -> Uuid {
        self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Kind of account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    Bank,
    Wallet,
    Investment,
    CreditCard,
}

impl AsRef<str> for AccountType {
    fn as_ref(&self) -> &str {
        match self {
            Self::Bank => "BANK",
            Self::Wallet => "WALLET",
            Self::Investment => "INVESTMENT",
            Self::CreditCard => "CREDIT_CARD",
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

impl std::str::FromStr for AccountType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "BANK" => Ok(Self::Bank),
            "WALLET" => Ok(Self::Wallet),
            "INVESTMENT" => Ok(Self::Investment),
            "CREDIT_CARD" => Ok(Self::CreditCard),
            other => Err(DomainError::ValidationError(format!(
                "Unknown account type: {}",
                other
            ))),
        }
    }
}

/// Whether an account belongs to the personal or the business ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountContext {
    Personal,
    Business,
}

impl AsRef<str> for AccountContext {
    fn as_ref(&self) -> &str {
        match self {
            Self::Personal => "PERSONAL",
            Self::Business => "BUSINESS",
        }
    }
}

impl std::fmt::Display for AccountContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

impl std::str::FromStr for AccountContext {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PERSONAL" => Ok(Self::Personal),
            "BUSINESS" => Ok(Self::Business),
            other => Err(DomainError::ValidationError(format!(
                "Unknown account context: {}",
                other
            ))),
        }
    }
}

/// Identity pair addressing every cached projection of one account.
///
/// The single-entity cache key is derived from `account_id`, list queries
/// live under the owner's `user_id` namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountKey {
    pub account_id: AccountId,
    pub user_id: UserId,
}

/// A financial account that holds a balance.
///
/// State only changes through the methods below; each successful mutation
/// appends exactly one [`DomainEvent`] that the caller drains with
/// [`Account::take_events`] after the write is committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    id: AccountId,
    user_id: UserId,
    name: String,
    account_type: AccountType,
    /// Current balance; its currency is fixed at creation
    balance: Money,
    context: AccountContext,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl Account {
    /// Opens a new active account.
    ///
    /// # Validation
    /// - Name cannot be blank or longer than 100 characters
    pub fn open(
        user_id: UserId,
        name: String,
        account_type: AccountType,
        context: AccountContext,
        opening_balance: Money,
    ) -> Result<Self, DomainError> {
        let name = validate_name(name)?;
        let now = super::now();
        let id = AccountId::new();

        Ok(Self {
            id,
            user_id,
            name,
            account_type,
            balance: opening_balance,
            context,
            is_active: true,
            created_at: now,
            updated_at: now,
            events: vec![DomainEvent::AccountCreated {
                account_id: id,
                user_id,
                currency: opening_balance.currency(),
                occurred_at: now,
            }],
        })
    }

    /// Creates an account with all fields specified (for database reconstruction).
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: AccountId,
        user_id: UserId,
        name: String,
        account_type: AccountType,
        balance: Money,
        context: AccountContext,
        is_active: bool,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            name,
            account_type,
            balance,
            context,
            is_active,
            created_at,
            updated_at,
            events: Vec::new(),
        }
    }

    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn key(&self) -> AccountKey {
        AccountKey {
            account_id: self.id,
            user_id: self.user_id,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn account_type(&self) -> AccountType {
        self.account_type
    }

    pub fn balance(&self) -> Money {
        self.balance
    }

    /// Returns the currency of this account.
    pub fn currency(&self) -> Currency {
        self.balance.currency()
    }

    pub fn context(&self) -> AccountContext {
        self.context
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Events appended since the last drain.
    pub fn pending_events(&self) -> &[DomainEvent] {
        &self.events
    }

    /// Drains the pending events.
    pub fn take_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }

    /// Credits (adds) money to the account.
    pub fn credit(&mut self, amount: Money) -> Result<(), DomainError> {
        self.ensure_active()?;
        let balance = self.balance.checked_add(amount)?;
        self.record_balance(balance);
        Ok(())
    }

    /// Debits (subtracts) money from the account.
    pub fn debit(&mut self, amount: Money) -> Result<(), DomainError> {
        self.ensure_active()?;
        let balance = self.balance.checked_sub(amount)?;
        self.record_balance(balance);
        Ok(())
    }

    /// Applies a transaction's balance effect.
    pub fn apply(&mut self, effect: BalanceEffect) -> Result<(), DomainError> {
        match effect {
            BalanceEffect::Credit(amount) => self.credit(amount),
            BalanceEffect::Debit(amount) => self.debit(amount),
        }
    }

    /// Applies several effects as one change, credits first.
    ///
    /// Ordering credits ahead of debits means a revision is only rejected
    /// when its final balance would be negative, not when an intermediate
    /// one would. On error the account is left untouched.
    pub fn apply_all(&mut self, effects: &[BalanceEffect]) -> Result<(), DomainError> {
        let (credits, debits): (Vec<BalanceEffect>, Vec<BalanceEffect>) =
            effects.iter().copied().partition(BalanceEffect::is_credit);

        let snapshot = (self.balance, self.updated_at, self.events.len());
        for effect in credits.into_iter().chain(debits) {
            if let Err(e) = self.apply(effect) {
                self.balance = snapshot.0;
                self.updated_at = snapshot.1;
                self.events.truncate(snapshot.2);
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn update_name(&mut self, name: String) -> Result<(), DomainError> {
        self.ensure_active()?;
        let name = validate_name(name)?;
        self.name = name;
        self.touch();
        self.events.push(DomainEvent::AccountRenamed {
            account_id: self.id,
            user_id: self.user_id,
            name: self.name.clone(),
            occurred_at: self.updated_at,
        });
        Ok(())
    }

    /// Reactivates the account. Activating an active account changes nothing.
    pub fn activate(&mut self) -> Result<(), DomainError> {
        if self.is_active {
            return Ok(());
        }
        self.is_active = true;
        self.touch();
        self.events.push(DomainEvent::AccountActivated {
            account_id: self.id,
            user_id: self.user_id,
            occurred_at: self.updated_at,
        });
        Ok(())
    }

    pub fn deactivate(&mut self) -> Result<(), DomainError> {
        self.ensure_active()?;
        self.is_active = false;
        self.touch();
        self.events.push(DomainEvent::AccountDeactivated {
            account_id: self.id,
            user_id: self.user_id,
            occurred_at: self.updated_at,
        });
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), DomainError> {
        if !self.is_active {
            return Err(DomainError::InactiveAccount(self.id));
        }
        Ok(())
    }

    fn record_balance(&mut self, balance: Money) {
        let previous = self.balance;
        self.balance = balance;
        self.touch();
        self.events.push(DomainEvent::AccountBalanceUpdated {
            account_id: self.id,
            user_id: self.user_id,
            previous,
            current: balance,
            occurred_at: self.updated_at,
        });
    }

    fn touch(&mut self) {
        self.updated_at = super::now();
    }
}

fn validate_name(name: String) -> Result<String, DomainError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(DomainError::ValidationError(
            "Account name cannot be empty".into(),
        ));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(DomainError::ValidationError(format!(
            "Account name cannot exceed {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(trimmed.to_string())
}

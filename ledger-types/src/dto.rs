//! Data Transfer Objects (DTOs) for use-case requests.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{AccountContext, AccountId, AccountType, Currency, TransactionType, UserId};

// ─────────────────────────────────────────────────────────────────────────────
// Account DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to open a new account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    /// Owner of the account
    pub user_id: UserId,
    /// Display name
    pub name: String,
    pub account_type: AccountType,
    #[serde(default = "default_context")]
    pub context: AccountContext,
    #[serde(default = "default_currency")]
    pub currency: Currency,
    /// Opening balance in smallest currency unit
    #[serde(default)]
    pub opening_balance: i64,
}

fn default_context() -> AccountContext {
    AccountContext::Personal
}

fn default_currency() -> Currency {
    Currency::BRL
}

// ─────────────────────────────────────────────────────────────────────────────
// Transaction DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to record an income or expense.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTransactionRequest {
    /// Account the entry is booked against
    pub account_id: AccountId,
    pub transaction_type: TransactionType,
    /// Amount in smallest currency unit
    pub amount: i64,
    /// Must match the account's currency
    pub currency: Currency,
    #[serde(default)]
    pub description: String,
    pub occurred_on: NaiveDate,
}

/// Request to revise an existing entry. The account cannot change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTransactionRequest {
    pub transaction_type: TransactionType,
    /// Amount in smallest currency unit
    pub amount: i64,
    pub currency: Currency,
    #[serde(default)]
    pub description: String,
    pub occurred_on: NaiveDate,
}

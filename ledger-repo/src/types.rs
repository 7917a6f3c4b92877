//! Database row types and their conversion into domain aggregates.

use ledger_types::RepoError;

// ─────────────────────────────────────────────────────────────────────────────
// Parsing helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Parses a persisted enum column through the domain type's `FromStr`.
pub fn parse_column<T>(column: &str, value: &str) -> Result<T, RepoError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| RepoError::Database(format!("Invalid {} column '{}': {}", column, value, e)))
}

pub fn db_err(e: impl std::fmt::Display) -> RepoError {
    RepoError::Database(e.to_string())
}

/// Maps a failed account delete, turning foreign-key refusals into conflicts.
#[cfg(any(feature = "postgres", feature = "sqlite"))]
pub fn delete_err(e: sqlx::Error) -> RepoError {
    match e.as_database_error() {
        Some(db) if db.is_foreign_key_violation() => {
            RepoError::Conflict("Account still has transactions".into())
        }
        _ => db_err(e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite rows (TEXT ids and RFC 3339 timestamps)
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "sqlite")]
pub mod sqlite {
    use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
    use sqlx::FromRow;

    use ledger_types::{
        Account, AccountId, Money, RepoError, Transaction, TransactionId, UserId,
    };

    use super::{db_err, parse_column};

    /// Fixed-width timestamp format so TEXT ordering matches time ordering.
    pub fn format_ts(ts: DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn parse_ts(value: &str) -> Result<DateTime<Utc>, RepoError> {
        Ok(DateTime::parse_from_rfc3339(value)
            .map_err(db_err)?
            .with_timezone(&Utc))
    }

    fn parse_uuid(value: &str) -> Result<uuid::Uuid, RepoError> {
        uuid::Uuid::parse_str(value).map_err(db_err)
    }

    /// Account row from database.
    #[derive(FromRow)]
    pub struct DbAccount {
        pub id: String,
        pub user_id: String,
        pub name: String,
        pub account_type: String,
        pub balance: i64,
        pub currency: String,
        pub context: String,
        pub is_active: i64,
        pub created_at: String,
        pub updated_at: String,
    }

    impl DbAccount {
        /// Convert database row to domain Account.
        pub fn into_domain(self) -> Result<Account, RepoError> {
            let currency = parse_column("currency", &self.currency)?;
            let balance = Money::new(self.balance, currency).map_err(RepoError::Domain)?;

            Ok(Account::from_parts(
                AccountId::from_uuid(parse_uuid(&self.id)?),
                UserId::from_uuid(parse_uuid(&self.user_id)?),
                self.name,
                parse_column("account_type", &self.account_type)?,
                balance,
                parse_column("context", &self.context)?,
                self.is_active != 0,
                parse_ts(&self.created_at)?,
                parse_ts(&self.updated_at)?,
            ))
        }
    }

    /// Transaction row from database.
    #[derive(FromRow)]
    pub struct DbTransaction {
        pub id: String,
        pub account_id: String,
        pub transaction_type: String,
        pub amount: i64,
        pub currency: String,
        pub description: String,
        pub occurred_on: String,
        pub created_at: String,
        pub updated_at: String,
        pub deleted_at: Option<String>,
    }

    impl DbTransaction {
        /// Convert database row to domain Transaction.
        pub fn into_domain(self) -> Result<Transaction, RepoError> {
            let currency = parse_column("currency", &self.currency)?;
            let amount = Money::new(self.amount, currency).map_err(RepoError::Domain)?;
            let occurred_on: NaiveDate = parse_column("occurred_on", &self.occurred_on)?;
            let deleted_at = self.deleted_at.as_deref().map(parse_ts).transpose()?;

            Ok(Transaction::from_parts(
                TransactionId::from_uuid(parse_uuid(&self.id)?),
                AccountId::from_uuid(parse_uuid(&self.account_id)?),
                parse_column("transaction_type", &self.transaction_type)?,
                amount,
                self.description,
                occurred_on,
                parse_ts(&self.created_at)?,
                parse_ts(&self.updated_at)?,
                deleted_at,
            ))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PostgreSQL rows (native UUID, DATE and TIMESTAMPTZ)
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "postgres")]
pub mod postgres {
    use chrono::{DateTime, NaiveDate, Utc};
    use sqlx::FromRow;
    use uuid::Uuid;

    use ledger_types::{
        Account, AccountId, Money, RepoError, Transaction, TransactionId, UserId,
    };

    use super::parse_column;

    /// Account row from database.
    #[derive(FromRow)]
    pub struct DbAccount {
        pub id: Uuid,
        pub user_id: Uuid,
        pub name: String,
        pub account_type: String,
        pub balance: i64,
        pub currency: String,
        pub context: String,
        pub is_active: bool,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
    }

    impl DbAccount {
        /// Convert database row to domain Account.
        pub fn into_domain(self) -> Result<Account, RepoError> {
            let currency = parse_column("currency", &self.currency)?;
            let balance = Money::new(self.balance, currency).map_err(RepoError::Domain)?;

            Ok(Account::from_parts(
                AccountId::from_uuid(self.id),
                UserId::from_uuid(self.user_id),
                self.name,
                parse_column("account_type", &self.account_type)?,
                balance,
                parse_column("context", &self.context)?,
                self.is_active,
                self.created_at,
                self.updated_at,
            ))
        }
    }

    /// Transaction row from database.
    #[derive(FromRow)]
    pub struct DbTransaction {
        pub id: Uuid,
        pub account_id: Uuid,
        pub transaction_type: String,
        pub amount: i64,
        pub currency: String,
        pub description: String,
        pub occurred_on: NaiveDate,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
        pub deleted_at: Option<DateTime<Utc>>,
    }

    impl DbTransaction {
        /// Convert database row to domain Transaction.
        pub fn into_domain(self) -> Result<Transaction, RepoError> {
            let currency = parse_column("currency", &self.currency)?;
            let amount = Money::new(self.amount, currency).map_err(RepoError::Domain)?;

            Ok(Transaction::from_parts(
                TransactionId::from_uuid(self.id),
                AccountId::from_uuid(self.account_id),
                parse_column("transaction_type", &self.transaction_type)?,
                amount,
                self.description,
                self.occurred_on,
                self.created_at,
                self.updated_at,
                self.deleted_at,
            ))
        }
    }
}

//! SQLite repository adapter.
#![allow(clippy::collapsible_if)]

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

use ledger_types::{
    Account, AccountContext, AccountId, AccountRepository, Committed, RepoError,
    Transaction, TransactionId, TransactionRepository, UnitOfWork, UnitOfWorkFactory, UserId,
};

use crate::scope::{Scope, SharedScope};
use crate::types::sqlite::{DbAccount, DbTransaction, format_ts};
use crate::types::{db_err, delete_err};

const MIGRATIONS: [&str; 2] = [
    include_str!("../migrations/0001_create_accounts.sql"),
    include_str!("../migrations/0002_create_transactions.sql"),
];

/// How long a writer waits for the database write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

// ─────────────────────────────────────────────────────────────────────────────
// SQLite Store
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite connection pool, repository factory and unit-of-work factory.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Creates a new SQLite store with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure on-disk SQLite target directory exists (no-op for in-memory).
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            let path = path.split('?').next().unwrap_or(path);
            if path != ":memory:" {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePool::connect_with(options).await?;

        let store = Self { pool };
        store.create_schema().await?;
        tracing::info!("SQLite store ready");
        Ok(store)
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates the database schema. Idempotent.
    pub async fn create_schema(&self) -> Result<(), RepoError> {
        for migration in MIGRATIONS {
            for statement in migration.split(';') {
                let statement = statement.trim();
                if statement.is_empty() {
                    continue;
                }
                sqlx::query(statement)
                    .execute(&self.pool)
                    .await
                    .map_err(db_err)?;
            }
        }
        Ok(())
    }

    /// Account repository reading and writing outside any unit of work.
    pub fn accounts(&self) -> SqliteAccountRepository {
        SqliteAccountRepository {
            pool: self.pool.clone(),
        }
    }

    /// Transaction repository reading and writing outside any unit of work.
    pub fn transactions(&self) -> SqliteTransactionRepository {
        SqliteTransactionRepository {
            pool: self.pool.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Queries
// ─────────────────────────────────────────────────────────────────────────────

const ACCOUNT_COLUMNS: &str =
    "id, user_id, name, account_type, balance, currency, context, is_active, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, account_id, transaction_type, amount, currency, description, occurred_on, created_at, updated_at, deleted_at";

async fn select_account(
    conn: &mut SqliteConnection,
    id: AccountId,
) -> Result<Option<Account>, RepoError> {
    let row: Option<DbAccount> = sqlx::query_as(&format!(
        "SELECT {} FROM accounts WHERE id = ?",
        ACCOUNT_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_err)?;

    row.map(DbAccount::into_domain).transpose()
}

async fn select_accounts_by_user(
    conn: &mut SqliteConnection,
    user_id: UserId,
    context: Option<AccountContext>,
) -> Result<Vec<Account>, RepoError> {
    let rows: Vec<DbAccount> = match context {
        Some(context) => {
            sqlx::query_as::<_, DbAccount>(&format!(
                "SELECT {} FROM accounts WHERE user_id = ? AND context = ? ORDER BY created_at ASC",
                ACCOUNT_COLUMNS
            ))
            .bind(user_id.to_string())
            .bind(context.as_ref())
            .fetch_all(&mut *conn)
            .await
        }
        None => {
            sqlx::query_as::<_, DbAccount>(&format!(
                "SELECT {} FROM accounts WHERE user_id = ? ORDER BY created_at ASC",
                ACCOUNT_COLUMNS
            ))
            .bind(user_id.to_string())
            .fetch_all(&mut *conn)
            .await
        }
    }
    .map_err(db_err)?;

    rows.into_iter().map(DbAccount::into_domain).collect()
}

async fn upsert_account(conn: &mut SqliteConnection, account: &Account) -> Result<(), RepoError> {
    sqlx::query(&format!(
        r#"INSERT INTO accounts ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
           ON CONFLICT(id) DO UPDATE SET
               name = excluded.name,
               balance = excluded.balance,
               is_active = excluded.is_active,
               updated_at = excluded.updated_at"#,
        ACCOUNT_COLUMNS
    ))
    .bind(account.id().to_string())
    .bind(account.user_id().to_string())
    .bind(account.name())
    .bind(account.account_type().as_ref())
    .bind(account.balance().amount())
    .bind(account.currency().code())
    .bind(account.context().as_ref())
    .bind(account.is_active())
    .bind(format_ts(account.created_at()))
    .bind(format_ts(account.updated_at()))
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    Ok(())
}

async fn delete_account(conn: &mut SqliteConnection, id: AccountId) -> Result<(), RepoError> {
    let result = sqlx::query("DELETE FROM accounts WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(delete_err)?;

    if result.rows_affected() == 0 {
        return Err(RepoError::NotFound);
    }
    Ok(())
}

async fn account_exists(conn: &mut SqliteConnection, id: AccountId) -> Result<bool, RepoError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts WHERE id = ?")
        .bind(id.to_string())
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err)?;
    Ok(count > 0)
}

async fn count_accounts(conn: &mut SqliteConnection, user_id: UserId) -> Result<i64, RepoError> {
    sqlx::query_scalar("SELECT COUNT(*) FROM accounts WHERE user_id = ?")
        .bind(user_id.to_string())
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err)
}

async fn select_transaction(
    conn: &mut SqliteConnection,
    id: TransactionId,
) -> Result<Option<Transaction>, RepoError> {
    let row: Option<DbTransaction> = sqlx::query_as(&format!(
        "SELECT {} FROM transactions WHERE id = ? AND deleted_at IS NULL",
        TRANSACTION_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_err)?;

    row.map(DbTransaction::into_domain).transpose()
}

async fn select_transactions_by_account(
    conn: &mut SqliteConnection,
    account_id: AccountId,
) -> Result<Vec<Transaction>, RepoError> {
    let rows: Vec<DbTransaction> = sqlx::query_as(&format!(
        r#"SELECT {} FROM transactions
           WHERE account_id = ? AND deleted_at IS NULL
           ORDER BY occurred_on DESC, created_at DESC"#,
        TRANSACTION_COLUMNS
    ))
    .bind(account_id.to_string())
    .fetch_all(&mut *conn)
    .await
    .map_err(db_err)?;

    rows.into_iter().map(DbTransaction::into_domain).collect()
}

async fn upsert_transaction(
    conn: &mut SqliteConnection,
    transaction: &Transaction,
) -> Result<(), RepoError> {
    sqlx::query(&format!(
        r#"INSERT INTO transactions ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
           ON CONFLICT(id) DO UPDATE SET
               transaction_type = excluded.transaction_type,
               amount = excluded.amount,
               currency = excluded.currency,
               description = excluded.description,
               occurred_on = excluded.occurred_on,
               updated_at = excluded.updated_at,
               deleted_at = excluded.deleted_at"#,
        TRANSACTION_COLUMNS
    ))
    .bind(transaction.id().to_string())
    .bind(transaction.account_id().to_string())
    .bind(transaction.transaction_type().to_string())
    .bind(transaction.amount().amount())
    .bind(transaction.amount().currency().code())
    .bind(transaction.description())
    .bind(transaction.occurred_on().format("%Y-%m-%d").to_string())
    .bind(format_ts(transaction.created_at()))
    .bind(format_ts(transaction.updated_at()))
    .bind(transaction.deleted_at().map(format_ts))
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Pool-backed repositories
// ─────────────────────────────────────────────────────────────────────────────

/// Account repository that auto-commits every call.
#[derive(Clone)]
pub struct SqliteAccountRepository {
    pool: SqlitePool,
}

#[async_trait]
impl AccountRepository for SqliteAccountRepository {
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        select_account(&mut conn, id).await
    }

    async fn find_by_user_id(&self, user_id: UserId) -> Result<Vec<Account>, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        select_accounts_by_user(&mut conn, user_id, None).await
    }

    async fn find_by_user_id_and_context(
        &self,
        user_id: UserId,
        context: AccountContext,
    ) -> Result<Vec<Account>, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        select_accounts_by_user(&mut conn, user_id, Some(context)).await
    }

    async fn save(&self, account: &Account) -> Result<(), RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        upsert_account(&mut conn, account).await
    }

    async fn delete(&self, id: AccountId) -> Result<(), RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        delete_account(&mut conn, id).await
    }

    async fn exists(&self, id: AccountId) -> Result<bool, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        account_exists(&mut conn, id).await
    }

    async fn count(&self, user_id: UserId) -> Result<i64, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        count_accounts(&mut conn, user_id).await
    }
}

/// Transaction repository that auto-commits every call.
#[derive(Clone)]
pub struct SqliteTransactionRepository {
    pool: SqlitePool,
}

#[async_trait]
impl TransactionRepository for SqliteTransactionRepository {
    async fn find_by_id(&self, id: TransactionId) -> Result<Option<Transaction>, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        select_transaction(&mut conn, id).await
    }

    async fn find_by_account_id(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Transaction>, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        select_transactions_by_account(&mut conn, account_id).await
    }

    async fn save(&self, transaction: &Transaction) -> Result<(), RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        upsert_transaction(&mut conn, transaction).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Unit of Work
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl UnitOfWorkFactory for SqliteStore {
    type Work = SqliteUnitOfWork;

    async fn begin(&self) -> Result<SqliteUnitOfWork, RepoError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        // Take the write lock now so concurrent units of work queue on
        // busy_timeout instead of failing on upgrade after reading.
        sqlx::query("UPDATE accounts SET balance = balance WHERE 0")
            .execute(&mut *tx)
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        let scope = Scope::shared(tx);
        Ok(SqliteUnitOfWork {
            accounts: SqliteScopedAccounts {
                scope: scope.clone(),
            },
            transactions: SqliteScopedTransactions {
                scope: scope.clone(),
            },
            scope,
        })
    }
}

/// A SQLite transaction with the repositories bound to it.
pub struct SqliteUnitOfWork {
    accounts: SqliteScopedAccounts,
    transactions: SqliteScopedTransactions,
    scope: SharedScope<Sqlite>,
}

#[async_trait]
impl UnitOfWork for SqliteUnitOfWork {
    type Accounts = SqliteScopedAccounts;
    type Transactions = SqliteScopedTransactions;

    fn accounts(&self) -> &SqliteScopedAccounts {
        &self.accounts
    }

    fn transactions(&self) -> &SqliteScopedTransactions {
        &self.transactions
    }

    async fn commit(self) -> Result<Committed, RepoError> {
        self.scope.lock().await.commit().await
    }

    async fn rollback(self) -> Result<(), RepoError> {
        self.scope.lock().await.rollback().await
    }
}

/// Account repository bound to a [`SqliteUnitOfWork`].
pub struct SqliteScopedAccounts {
    scope: SharedScope<Sqlite>,
}

#[async_trait]
impl AccountRepository for SqliteScopedAccounts {
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, RepoError> {
        let mut scope = self.scope.lock().await;
        select_account(scope.connection()?, id).await
    }

    async fn find_by_user_id(&self, user_id: UserId) -> Result<Vec<Account>, RepoError> {
        let mut scope = self.scope.lock().await;
        select_accounts_by_user(scope.connection()?, user_id, None).await
    }

    async fn find_by_user_id_and_context(
        &self,
        user_id: UserId,
        context: AccountContext,
    ) -> Result<Vec<Account>, RepoError> {
        let mut scope = self.scope.lock().await;
        select_accounts_by_user(scope.connection()?, user_id, Some(context)).await
    }

    async fn save(&self, account: &Account) -> Result<(), RepoError> {
        let mut scope = self.scope.lock().await;
        upsert_account(scope.connection()?, account).await?;
        scope.touch(account.key());
        Ok(())
    }

    async fn delete(&self, id: AccountId) -> Result<(), RepoError> {
        let mut scope = self.scope.lock().await;
        let conn = scope.connection()?;
        let account = select_account(conn, id).await?.ok_or(RepoError::NotFound)?;
        delete_account(conn, id).await?;
        scope.touch(account.key());
        Ok(())
    }

    async fn exists(&self, id: AccountId) -> Result<bool, RepoError> {
        let mut scope = self.scope.lock().await;
        account_exists(scope.connection()?, id).await
    }

    async fn count(&self, user_id: UserId) -> Result<i64, RepoError> {
        let mut scope = self.scope.lock().await;
        count_accounts(scope.connection()?, user_id).await
    }
}

/// Transaction repository bound to a [`SqliteUnitOfWork`].
pub struct SqliteScopedTransactions {
    scope: SharedScope<Sqlite>,
}

#[async_trait]
impl TransactionRepository for SqliteScopedTransactions {
    async fn find_by_id(&self, id: TransactionId) -> Result<Option<Transaction>, RepoError> {
        let mut scope = self.scope.lock().await;
        select_transaction(scope.connection()?, id).await
    }

    async fn find_by_account_id(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Transaction>, RepoError> {
        let mut scope = self.scope.lock().await;
        select_transactions_by_account(scope.connection()?, account_id).await
    }

    async fn save(&self, transaction: &Transaction) -> Result<(), RepoError> {
        let mut scope = self.scope.lock().await;
        upsert_transaction(scope.connection()?, transaction).await
    }
}


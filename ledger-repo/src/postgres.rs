//! PostgreSQL repository adapter.

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres};

use ledger_types::{
    Account, AccountContext, AccountId, AccountRepository, Committed, RepoError, Transaction,
    TransactionId, TransactionRepository, UnitOfWork, UnitOfWorkFactory, UserId,
};

use crate::scope::{Scope, SharedScope};
use crate::types::postgres::{DbAccount, DbTransaction};
use crate::types::{db_err, delete_err};

// ─────────────────────────────────────────────────────────────────────────────
// PostgreSQL Store
// ─────────────────────────────────────────────────────────────────────────────

/// PostgreSQL store with row-level locking inside units of work.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

/// Executes SQL statements from a migration file, splitting by semicolons.
async fn execute_migration(pool: &PgPool, sql: &str, name: &str) -> Result<(), anyhow::Error> {
    for statement in sql.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;
        }
    }
    Ok(())
}

/// Runs all database migrations.
async fn run_migrations(pool: &PgPool) -> Result<(), anyhow::Error> {
    execute_migration(
        pool,
        include_str!("../migrations/0001_create_accounts_pg.sql"),
        "0001",
    )
    .await?;

    execute_migration(
        pool,
        include_str!("../migrations/0002_create_transactions_pg.sql"),
        "0002",
    )
    .await?;

    Ok(())
}

impl PgStore {
    /// Creates a new PostgreSQL store with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        run_migrations(&pool).await?;
        tracing::info!("PostgreSQL store ready");
        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the database schema (for testing with existing pool).
    pub async fn create_schema(&self) -> Result<(), RepoError> {
        run_migrations(&self.pool).await.map_err(db_err)
    }

    /// Account repository reading and writing outside any unit of work.
    pub fn accounts(&self) -> PgAccountRepository {
        PgAccountRepository {
            pool: self.pool.clone(),
        }
    }

    /// Transaction repository reading and writing outside any unit of work.
    pub fn transactions(&self) -> PgTransactionRepository {
        PgTransactionRepository {
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

/// Row lock suffix for reads that precede a write in the same transaction.
fn lock_clause(for_update: bool) -> &'static str {
    if for_update { " FOR UPDATE" } else { "" }
}

async fn select_account(
    conn: &mut PgConnection,
    id: AccountId,
    for_update: bool,
) -> Result<Option<Account>, RepoError> {
    let row: Option<DbAccount> = sqlx::query_as(&format!(
        "SELECT {} FROM accounts WHERE id = $1{}",
        ACCOUNT_COLUMNS,
        lock_clause(for_update)
    ))
    .bind(id.into_uuid())
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_err)?;

    row.map(DbAccount::into_domain).transpose()
}

async fn select_accounts_by_user(
    conn: &mut PgConnection,
    user_id: UserId,
    context: Option<AccountContext>,
) -> Result<Vec<Account>, RepoError> {
    let rows: Vec<DbAccount> = match context {
        Some(context) => {
            sqlx::query_as::<_, DbAccount>(&format!(
                "SELECT {} FROM accounts WHERE user_id = $1 AND context = $2 ORDER BY created_at ASC",
                ACCOUNT_COLUMNS
            ))
            .bind(user_id.into_uuid())
            .bind(context.as_ref())
            .fetch_all(&mut *conn)
            .await
        }
        None => {
            sqlx::query_as::<_, DbAccount>(&format!(
                "SELECT {} FROM accounts WHERE user_id = $1 ORDER BY created_at ASC",
                ACCOUNT_COLUMNS
            ))
            .bind(user_id.into_uuid())
            .fetch_all(&mut *conn)
            .await
        }
    }
    .map_err(db_err)?;

    rows.into_iter().map(DbAccount::into_domain).collect()
}

async fn upsert_account(conn: &mut PgConnection, account: &Account) -> Result<(), RepoError> {
    sqlx::query(&format!(
        r#"INSERT INTO accounts ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
           ON CONFLICT (id) DO UPDATE SET
               name = EXCLUDED.name,
               balance = EXCLUDED.balance,
               is_active = EXCLUDED.is_active,
               updated_at = EXCLUDED.updated_at"#,
        ACCOUNT_COLUMNS
    ))
    .bind(account.id().into_uuid())
    .bind(account.user_id().into_uuid())
    .bind(account.name())
    .bind(account.account_type().as_ref())
    .bind(account.balance().amount())
    .bind(account.currency().code())
    .bind(account.context().as_ref())
    .bind(account.is_active())
    .bind(account.created_at())
    .bind(account.updated_at())
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    Ok(())
}

async fn delete_account(conn: &mut PgConnection, id: AccountId) -> Result<(), RepoError> {
    let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
        .bind(id.into_uuid())
        .execute(&mut *conn)
        .await
        .map_err(delete_err)?;

    if result.rows_affected() == 0 {
        return Err(RepoError::NotFound);
    }
    Ok(())
}

async fn account_exists(conn: &mut PgConnection, id: AccountId) -> Result<bool, RepoError> {
    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM accounts WHERE id = $1)")
        .bind(id.into_uuid())
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err)
}

async fn count_accounts(conn: &mut PgConnection, user_id: UserId) -> Result<i64, RepoError> {
    sqlx::query_scalar("SELECT COUNT(*) FROM accounts WHERE user_id = $1")
        .bind(user_id.into_uuid())
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err)
}

async fn select_transaction(
    conn: &mut PgConnection,
    id: TransactionId,
    for_update: bool,
) -> Result<Option<Transaction>, RepoError> {
    let row: Option<DbTransaction> = sqlx::query_as(&format!(
        "SELECT {} FROM transactions WHERE id = $1 AND deleted_at IS NULL{}",
        TRANSACTION_COLUMNS,
        lock_clause(for_update)
    ))
    .bind(id.into_uuid())
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_err)?;

    row.map(DbTransaction::into_domain).transpose()
}

async fn select_transactions_by_account(
    conn: &mut PgConnection,
    account_id: AccountId,
) -> Result<Vec<Transaction>, RepoError> {
    let rows: Vec<DbTransaction> = sqlx::query_as(&format!(
        r#"SELECT {} FROM transactions
           WHERE account_id = $1 AND deleted_at IS NULL
           ORDER BY occurred_on DESC, created_at DESC"#,
        TRANSACTION_COLUMNS
    ))
    .bind(account_id.into_uuid())
    .fetch_all(&mut *conn)
    .await
    .map_err(db_err)?;

    rows.into_iter().map(DbTransaction::into_domain).collect()
}

async fn upsert_transaction(
    conn: &mut PgConnection,
    transaction: &Transaction,
) -> Result<(), RepoError> {
    sqlx::query(&format!(
        r#"INSERT INTO transactions ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
           ON CONFLICT (id) DO UPDATE SET
               transaction_type = EXCLUDED.transaction_type,
               amount = EXCLUDED.amount,
               currency = EXCLUDED.currency,
               description = EXCLUDED.description,
               occurred_on = EXCLUDED.occurred_on,
               updated_at = EXCLUDED.updated_at,
               deleted_at = EXCLUDED.deleted_at"#,
        TRANSACTION_COLUMNS
    ))
    .bind(transaction.id().into_uuid())
    .bind(transaction.account_id().into_uuid())
    .bind(transaction.transaction_type().to_string())
    .bind(transaction.amount().amount())
    .bind(transaction.amount().currency().code())
    .bind(transaction.description())
    .bind(transaction.occurred_on())
    .bind(transaction.created_at())
    .bind(transaction.updated_at())
    .bind(transaction.deleted_at())
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
pub struct PgAccountRepository {
    pool: PgPool,
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        select_account(&mut conn, id, false).await
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
pub struct PgTransactionRepository {
    pool: PgPool,
}

#[async_trait]
impl TransactionRepository for PgTransactionRepository {
    async fn find_by_id(&self, id: TransactionId) -> Result<Option<Transaction>, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        select_transaction(&mut conn, id, false).await
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
impl UnitOfWorkFactory for PgStore {
    type Work = PgUnitOfWork;

    async fn begin(&self) -> Result<PgUnitOfWork, RepoError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        let scope = Scope::shared(tx);
        Ok(PgUnitOfWork {
            accounts: PgScopedAccounts {
                scope: scope.clone(),
            },
            transactions: PgScopedTransactions {
                scope: scope.clone(),
            },
            scope,
        })
    }
}

/// A PostgreSQL transaction with the repositories bound to it.
pub struct PgUnitOfWork {
    accounts: PgScopedAccounts,
    transactions: PgScopedTransactions,
    scope: SharedScope<Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    type Accounts = PgScopedAccounts;
    type Transactions = PgScopedTransactions;

    fn accounts(&self) -> &PgScopedAccounts {
        &self.accounts
    }

    fn transactions(&self) -> &PgScopedTransactions {
        &self.transactions
    }

    async fn commit(self) -> Result<Committed, RepoError> {
        self.scope.lock().await.commit().await
    }

    async fn rollback(self) -> Result<(), RepoError> {
        self.scope.lock().await.rollback().await
    }
}

/// Account repository bound to a [`PgUnitOfWork`].
///
/// Point reads lock the row until the unit of work finishes.
pub struct PgScopedAccounts {
    scope: SharedScope<Postgres>,
}

#[async_trait]
impl AccountRepository for PgScopedAccounts {
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, RepoError> {
        let mut scope = self.scope.lock().await;
        select_account(scope.connection()?, id, true).await
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
        let account = select_account(conn, id, true)
            .await?
            .ok_or(RepoError::NotFound)?;
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

/// Transaction repository bound to a [`PgUnitOfWork`].
pub struct PgScopedTransactions {
    scope: SharedScope<Postgres>,
}

#[async_trait]
impl TransactionRepository for PgScopedTransactions {
    async fn find_by_id(&self, id: TransactionId) -> Result<Option<Transaction>, RepoError> {
        let mut scope = self.scope.lock().await;
        select_transaction(scope.connection()?, id, true).await
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

//! Ledger Application Service
//!
//! Orchestrates the Account and Transaction aggregates through the ports.
//! Contains NO infrastructure logic - pure business orchestration.
//!
//! Every write runs inside one unit of work and finishes with the same
//! sequence: commit, invalidate the cached reads of every account the unit of
//! work wrote, then publish the collected domain events. Nothing after the
//! commit runs when the unit of work is rolled back or dropped.

use std::sync::Arc;

use ledger_types::{
    Account, AccountContext, AccountId, AccountRepository, AppError, CacheInvalidator,
    CreateAccountRequest, CreateTransactionRequest, DomainError, DomainEvent, Money, RepoError,
    Transaction, TransactionId, TransactionRepository, UnitOfWork, UnitOfWorkFactory,
    UpdateTransactionRequest, UserId,
};

use crate::bus::EventBus;

/// Result of the in-transaction part of a write: the value to return and the
/// events to publish once committed.
type Staged<R> = Result<(R, Vec<DomainEvent>), AppError>;

/// Application service for ledger operations.
///
/// Generic over the ports - the adapters are injected at compile time:
/// - `U` opens units of work for every write
/// - `A` serves account reads, normally the cache-aside decorator
/// - `T` serves transaction reads
/// - `I` invalidates cached account reads after a commit
pub struct LedgerService<U, A, T, I> {
    units: U,
    accounts: A,
    transactions: T,
    invalidator: I,
    bus: Arc<EventBus>,
}

impl<U, A, T, I> LedgerService<U, A, T, I>
where
    U: UnitOfWorkFactory,
    A: AccountRepository,
    T: TransactionRepository,
    I: CacheInvalidator,
{
    /// Creates a new ledger service.
    pub fn new(units: U, accounts: A, transactions: T, invalidator: I, bus: Arc<EventBus>) -> Self {
        Self {
            units,
            accounts,
            transactions,
            invalidator,
            bus,
        }
    }

    /// Returns the event bus events are published on.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Returns the account read repository.
    pub fn accounts(&self) -> &A {
        &self.accounts
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Account Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Opens a new account.
    #[tracing::instrument(skip(self, req), fields(user_id = %req.user_id))]
    pub async fn open_account(&self, req: CreateAccountRequest) -> Result<Account, AppError> {
        let opening_balance = Money::new(req.opening_balance, req.currency)?;
        let mut account = Account::open(
            req.user_id,
            req.name,
            req.account_type,
            req.context,
            opening_balance,
        )?;

        let uow = self.units.begin().await?;
        let staged = match uow.accounts().save(&account).await {
            Ok(()) => Ok(((), account.take_events())),
            Err(e) => Err(AppError::from(e)),
        };
        self.finish("open_account", uow, staged).await?;

        tracing::info!(account_id = %account.id(), "Account opened");
        Ok(account)
    }

    /// Renames an account.
    #[tracing::instrument(skip(self))]
    pub async fn rename_account(&self, id: AccountId, name: String) -> Result<Account, AppError> {
        let uow = self.units.begin().await?;
        let staged = mutate_account(&uow, id, |account| account.update_name(name)).await;
        self.finish("rename_account", uow, staged).await
    }

    /// Reactivates an account. Already-active accounts are returned unchanged.
    #[tracing::instrument(skip(self))]
    pub async fn activate_account(&self, id: AccountId) -> Result<Account, AppError> {
        let uow = self.units.begin().await?;
        let staged = mutate_account(&uow, id, Account::activate).await;
        self.finish("activate_account", uow, staged).await
    }

    /// Deactivates an account, freezing its balance.
    #[tracing::instrument(skip(self))]
    pub async fn deactivate_account(&self, id: AccountId) -> Result<Account, AppError> {
        let uow = self.units.begin().await?;
        let staged = mutate_account(&uow, id, Account::deactivate).await;
        self.finish("deactivate_account", uow, staged).await
    }

    /// Hard-deletes an account. Administrative only.
    ///
    /// Goes through the account repository's own delete path, which
    /// invalidates the cache itself. Refused while transactions reference the
    /// account.
    #[tracing::instrument(skip(self))]
    pub async fn remove_account(&self, id: AccountId) -> Result<(), AppError> {
        self.accounts.delete(id).await.map_err(|e| match e {
            RepoError::NotFound => account_not_found(id),
            e => e.into(),
        })?;
        tracing::info!(account_id = %id, "Account removed");
        Ok(())
    }

    /// Gets an account by ID.
    pub async fn get_account(&self, id: AccountId) -> Result<Account, AppError> {
        self.accounts
            .find_by_id(id)
            .await
            .map_err(Into::into)
            .and_then(|opt| opt.ok_or_else(|| account_not_found(id)))
    }

    /// Lists a user's accounts.
    pub async fn list_accounts(&self, user_id: UserId) -> Result<Vec<Account>, AppError> {
        self.accounts
            .find_by_user_id(user_id)
            .await
            .map_err(Into::into)
    }

    /// Lists a user's accounts in one context.
    pub async fn list_accounts_in_context(
        &self,
        user_id: UserId,
        context: AccountContext,
    ) -> Result<Vec<Account>, AppError> {
        self.accounts
            .find_by_user_id_and_context(user_id, context)
            .await
            .map_err(Into::into)
    }

    /// Counts a user's accounts.
    pub async fn count_accounts(&self, user_id: UserId) -> Result<i64, AppError> {
        self.accounts.count(user_id).await.map_err(Into::into)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Transaction Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Records an income or expense and applies it to the account balance.
    #[tracing::instrument(skip(self, req), fields(account_id = %req.account_id, amount = req.amount))]
    pub async fn record_transaction(
        &self,
        req: CreateTransactionRequest,
    ) -> Result<Transaction, AppError> {
        let uow = self.units.begin().await?;
        let staged = record_in(&uow, req).await;
        self.finish("record_transaction", uow, staged).await
    }

    /// Replaces a transaction's type, amount, description and date.
    ///
    /// The previous effect is reversed and the new one applied in the same
    /// unit of work.
    #[tracing::instrument(skip(self, req), fields(amount = req.amount))]
    pub async fn revise_transaction(
        &self,
        id: TransactionId,
        req: UpdateTransactionRequest,
    ) -> Result<Transaction, AppError> {
        let uow = self.units.begin().await?;
        let staged = revise_in(&uow, id, req).await;
        self.finish("revise_transaction", uow, staged).await
    }

    /// Soft-deletes a transaction and reverses its effect.
    #[tracing::instrument(skip(self))]
    pub async fn delete_transaction(&self, id: TransactionId) -> Result<(), AppError> {
        let uow = self.units.begin().await?;
        let staged = delete_in(&uow, id).await;
        self.finish("delete_transaction", uow, staged).await
    }

    /// Gets a live transaction by ID.
    pub async fn get_transaction(&self, id: TransactionId) -> Result<Transaction, AppError> {
        self.transactions
            .find_by_id(id)
            .await
            .map_err(Into::into)
            .and_then(|opt| opt.ok_or_else(|| transaction_not_found(id)))
    }

    /// Lists live transactions for an account, most recent first.
    pub async fn list_transactions(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Transaction>, AppError> {
        // Verify account exists first
        if !self.accounts.exists(account_id).await? {
            return Err(account_not_found(account_id));
        }

        self.transactions
            .find_by_account_id(account_id)
            .await
            .map_err(Into::into)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Unit of Work completion
    // ─────────────────────────────────────────────────────────────────────────────

    /// Commits or rolls back `uow` depending on `staged`, then runs the
    /// post-commit steps.
    async fn finish<R>(
        &self,
        operation: &'static str,
        uow: U::Work,
        staged: Staged<R>,
    ) -> Result<R, AppError> {
        let (value, events) = match staged {
            Ok(staged) => staged,
            Err(e) => {
                if let Err(rollback) = uow.rollback().await {
                    tracing::warn!(operation, error = %rollback, "Rollback failed");
                }
                tracing::debug!(operation, error = %e, "Unit of work rolled back");
                return Err(e);
            }
        };

        let committed = uow.commit().await.map_err(|e| {
            tracing::error!(operation, error = %e, "Commit failed");
            AppError::from(e)
        })?;

        self.invalidator.invalidate(committed.accounts()).await;
        self.bus.publish_all(&events).await;

        tracing::debug!(
            operation,
            accounts = committed.accounts().len(),
            events = events.len(),
            "Unit of work committed"
        );
        Ok(value)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-transaction steps
// ─────────────────────────────────────────────────────────────────────────────

async fn load_account<W: UnitOfWork>(uow: &W, id: AccountId) -> Result<Account, AppError> {
    uow.accounts()
        .find_by_id(id)
        .await?
        .ok_or_else(|| account_not_found(id))
}

async fn load_transaction<W: UnitOfWork>(
    uow: &W,
    id: TransactionId,
) -> Result<Transaction, AppError> {
    uow.transactions()
        .find_by_id(id)
        .await?
        .ok_or_else(|| transaction_not_found(id))
}

async fn mutate_account<W, F>(uow: &W, id: AccountId, change: F) -> Staged<Account>
where
    W: UnitOfWork,
    F: FnOnce(&mut Account) -> Result<(), DomainError>,
{
    let mut account = load_account(uow, id).await?;
    change(&mut account)?;
    uow.accounts().save(&account).await?;
    let events = account.take_events();
    Ok((account, events))
}

async fn record_in<W: UnitOfWork>(uow: &W, req: CreateTransactionRequest) -> Staged<Transaction> {
    let mut account = load_account(uow, req.account_id).await?;
    let amount = Money::new(req.amount, req.currency)?;
    let mut transaction = Transaction::record(
        &account,
        req.transaction_type,
        amount,
        req.description,
        req.occurred_on,
    )?;
    account.apply(transaction.effect())?;

    uow.transactions().save(&transaction).await?;
    uow.accounts().save(&account).await?;

    Ok(drain(transaction, &mut account))
}

async fn revise_in<W: UnitOfWork>(
    uow: &W,
    id: TransactionId,
    req: UpdateTransactionRequest,
) -> Staged<Transaction> {
    let mut transaction = load_transaction(uow, id).await?;
    let mut account = load_account(uow, transaction.account_id()).await?;
    let amount = Money::new(req.amount, req.currency)?;

    let previous = transaction.revise(
        &account,
        req.transaction_type,
        amount,
        req.description,
        req.occurred_on,
    )?;
    account.apply_all(&[previous.inverse(), transaction.effect()])?;

    uow.transactions().save(&transaction).await?;
    uow.accounts().save(&account).await?;

    Ok(drain(transaction, &mut account))
}

async fn delete_in<W: UnitOfWork>(uow: &W, id: TransactionId) -> Staged<()> {
    let mut transaction = load_transaction(uow, id).await?;
    let mut account = load_account(uow, transaction.account_id()).await?;

    let effect = transaction.mark_deleted()?;
    account.apply(effect.inverse())?;

    uow.transactions().save(&transaction).await?;
    uow.accounts().save(&account).await?;

    let (_, events) = drain(transaction, &mut account);
    Ok(((), events))
}

/// Transaction events first, then the account's.
fn drain(mut transaction: Transaction, account: &mut Account) -> (Transaction, Vec<DomainEvent>) {
    let mut events = transaction.take_events();
    events.extend(account.take_events());
    (transaction, events)
}

fn account_not_found(id: AccountId) -> AppError {
    AppError::NotFound(format!("Account {}", id))
}

fn transaction_not_found(id: TransactionId) -> AppError {
    AppError::NotFound(format!("Transaction {}", id))
}

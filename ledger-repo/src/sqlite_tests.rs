//! SQLite repository integration tests.

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use ledger_types::{
        Account, AccountContext, AccountId, AccountRepository, AccountType, Currency, DomainError,
        Money, RepoError, Transaction, TransactionId, TransactionRepository, TransactionType,
        UnitOfWork, UnitOfWorkFactory, UserId,
    };
    use tempfile::TempDir;

    use crate::SqliteStore;

    /// File-backed store; the directory must outlive the store.
    async fn setup_store() -> (TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("ledger.db").display());
        let store = SqliteStore::new(&url).await.unwrap();
        (dir, store)
    }

    fn brl(amount: i64) -> Money {
        Money::new(amount, Currency::BRL).unwrap()
    }

    fn open_account(user_id: UserId, context: AccountContext, balance: i64) -> Account {
        let mut account = Account::open(
            user_id,
            "Checking".into(),
            AccountType::Bank,
            context,
            brl(balance),
        )
        .unwrap();
        account.take_events();
        account
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn expense(account: &Account, amount: i64) -> Transaction {
        Transaction::record(
            account,
            TransactionType::Expense,
            brl(amount),
            "Groceries".into(),
            day(),
        )
        .unwrap()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accounts
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_save_and_find_account() {
        let (_dir, store) = setup_store().await;
        let repo = store.accounts();
        let account = open_account(UserId::new(), AccountContext::Business, 10_000);

        repo.save(&account).await.unwrap();
        let fetched = repo.find_by_id(account.id()).await.unwrap().unwrap();

        assert_eq!(fetched.id(), account.id());
        assert_eq!(fetched.user_id(), account.user_id());
        assert_eq!(fetched.name(), "Checking");
        assert_eq!(fetched.account_type(), AccountType::Bank);
        assert_eq!(fetched.context(), AccountContext::Business);
        assert_eq!(fetched.balance(), brl(10_000));
        assert!(fetched.is_active());
        assert_eq!(fetched.created_at(), account.created_at());
        assert!(fetched.pending_events().is_empty());
    }

    #[tokio::test]
    async fn test_find_account_not_found() {
        let (_dir, store) = setup_store().await;

        let result = store.accounts().find_by_id(AccountId::new()).await.unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_save_updates_mutable_fields() {
        let (_dir, store) = setup_store().await;
        let repo = store.accounts();
        let mut account = open_account(UserId::new(), AccountContext::Personal, 500);
        repo.save(&account).await.unwrap();

        account.update_name("Savings".into()).unwrap();
        account.debit(brl(200)).unwrap();
        account.deactivate().unwrap();
        repo.save(&account).await.unwrap();

        let fetched = repo.find_by_id(account.id()).await.unwrap().unwrap();
        assert_eq!(fetched.name(), "Savings");
        assert_eq!(fetched.balance(), brl(300));
        assert!(!fetched.is_active());
    }

    #[tokio::test]
    async fn test_find_by_user_and_context() {
        let (_dir, store) = setup_store().await;
        let repo = store.accounts();
        let user = UserId::new();

        let personal = open_account(user, AccountContext::Personal, 0);
        let business = open_account(user, AccountContext::Business, 0);
        let stranger = open_account(UserId::new(), AccountContext::Personal, 0);
        for account in [&personal, &business, &stranger] {
            repo.save(account).await.unwrap();
        }

        let all = repo.find_by_user_id(user).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id(), personal.id());

        let only_business = repo
            .find_by_user_id_and_context(user, AccountContext::Business)
            .await
            .unwrap();
        assert_eq!(only_business.len(), 1);
        assert_eq!(only_business[0].id(), business.id());

        assert_eq!(repo.count(user).await.unwrap(), 2);
        assert!(repo.exists(stranger.id()).await.unwrap());
        assert!(!repo.exists(AccountId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_account() {
        let (_dir, store) = setup_store().await;
        let repo = store.accounts();
        let account = open_account(UserId::new(), AccountContext::Personal, 0);
        repo.save(&account).await.unwrap();

        repo.delete(account.id()).await.unwrap();

        assert!(!repo.exists(account.id()).await.unwrap());
        assert!(matches!(
            repo.delete(account.id()).await,
            Err(RepoError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_delete_account_with_transactions_conflicts() {
        let (_dir, store) = setup_store().await;
        let account = open_account(UserId::new(), AccountContext::Personal, 1000);
        store.accounts().save(&account).await.unwrap();
        store
            .transactions()
            .save(&expense(&account, 100))
            .await
            .unwrap();

        let result = store.accounts().delete(account.id()).await;

        assert!(matches!(result, Err(RepoError::Conflict(_))));
        assert!(store.accounts().exists(account.id()).await.unwrap());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transactions
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_save_and_find_transaction() {
        let (_dir, store) = setup_store().await;
        let account = open_account(UserId::new(), AccountContext::Personal, 1000);
        store.accounts().save(&account).await.unwrap();
        let tx = expense(&account, 250);

        store.transactions().save(&tx).await.unwrap();
        let fetched = store.transactions().find_by_id(tx.id()).await.unwrap().unwrap();

        assert_eq!(fetched.account_id(), account.id());
        assert_eq!(fetched.transaction_type(), TransactionType::Expense);
        assert_eq!(fetched.amount(), brl(250));
        assert_eq!(fetched.description(), "Groceries");
        assert_eq!(fetched.occurred_on(), day());
        assert!(!fetched.is_deleted());
    }

    #[tokio::test]
    async fn test_soft_deleted_transaction_is_hidden() {
        let (_dir, store) = setup_store().await;
        let repo = store.transactions();
        let account = open_account(UserId::new(), AccountContext::Personal, 1000);
        store.accounts().save(&account).await.unwrap();

        let kept = expense(&account, 100);
        let mut removed = expense(&account, 200);
        repo.save(&kept).await.unwrap();
        repo.save(&removed).await.unwrap();

        removed.mark_deleted().unwrap();
        repo.save(&removed).await.unwrap();

        assert!(repo.find_by_id(removed.id()).await.unwrap().is_none());
        let listed = repo.find_by_account_id(account.id()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id(), kept.id());
    }

    #[tokio::test]
    async fn test_find_transaction_not_found() {
        let (_dir, store) = setup_store().await;

        let result = store
            .transactions()
            .find_by_id(TransactionId::new())
            .await
            .unwrap();

        assert!(result.is_none());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Unit of Work
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_commit_persists_both_aggregates() {
        let (_dir, store) = setup_store().await;
        let mut account = open_account(UserId::new(), AccountContext::Personal, 10_000);
        store.accounts().save(&account).await.unwrap();

        let uow = store.begin().await.unwrap();
        let tx = expense(&account, 3000);
        account.apply(tx.effect()).unwrap();
        uow.transactions().save(&tx).await.unwrap();
        uow.accounts().save(&account).await.unwrap();
        uow.accounts().save(&account).await.unwrap();
        let committed = uow.commit().await.unwrap();

        assert_eq!(committed.accounts(), &[account.key()]);
        let stored = store.accounts().find_by_id(account.id()).await.unwrap().unwrap();
        assert_eq!(stored.balance(), brl(7000));
        assert!(store.transactions().find_by_id(tx.id()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let (_dir, store) = setup_store().await;
        let mut account = open_account(UserId::new(), AccountContext::Personal, 10_000);
        store.accounts().save(&account).await.unwrap();

        let uow = store.begin().await.unwrap();
        let tx = expense(&account, 3000);
        account.apply(tx.effect()).unwrap();
        uow.transactions().save(&tx).await.unwrap();
        uow.accounts().save(&account).await.unwrap();
        uow.rollback().await.unwrap();

        let stored = store.accounts().find_by_id(account.id()).await.unwrap().unwrap();
        assert_eq!(stored.balance(), brl(10_000));
        assert!(store.transactions().find_by_id(tx.id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible_outside() {
        let (_dir, store) = setup_store().await;
        let mut account = open_account(UserId::new(), AccountContext::Personal, 10_000);
        store.accounts().save(&account).await.unwrap();

        let uow = store.begin().await.unwrap();
        let tx = expense(&account, 4000);
        account.debit(brl(4000)).unwrap();
        uow.transactions().save(&tx).await.unwrap();
        uow.accounts().save(&account).await.unwrap();

        let inside = uow.accounts().find_by_id(account.id()).await.unwrap().unwrap();
        let outside = store.accounts().find_by_id(account.id()).await.unwrap().unwrap();
        assert_eq!(inside.balance(), brl(6000));
        assert_eq!(outside.balance(), brl(10_000));
        assert!(uow.transactions().find_by_id(tx.id()).await.unwrap().is_some());
        assert!(
            store
                .transactions()
                .find_by_id(tx.id())
                .await
                .unwrap()
                .is_none()
        );

        let _ = uow.commit().await.unwrap();
        let outside = store.accounts().find_by_id(account.id()).await.unwrap().unwrap();
        assert_eq!(outside.balance(), brl(6000));
        let listed = store
            .transactions()
            .find_by_account_id(account.id())
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id(), tx.id());
    }

    #[tokio::test]
    async fn test_dropped_unit_of_work_rolls_back() {
        let (_dir, store) = setup_store().await;
        let mut account = open_account(UserId::new(), AccountContext::Personal, 10_000);
        store.accounts().save(&account).await.unwrap();

        {
            let uow = store.begin().await.unwrap();
            account.debit(brl(1000)).unwrap();
            uow.accounts().save(&account).await.unwrap();
        }

        // The write lock is free again once the dropped transaction is gone.
        let uow = store.begin().await.unwrap();
        let stored = uow.accounts().find_by_id(account.id()).await.unwrap().unwrap();
        assert_eq!(stored.balance(), brl(10_000));
        uow.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_scoped_delete_records_owner() {
        let (_dir, store) = setup_store().await;
        let account = open_account(UserId::new(), AccountContext::Personal, 0);
        store.accounts().save(&account).await.unwrap();

        let uow = store.begin().await.unwrap();
        uow.accounts().delete(account.id()).await.unwrap();
        assert!(matches!(
            uow.accounts().delete(AccountId::new()).await,
            Err(RepoError::NotFound)
        ));
        let committed = uow.commit().await.unwrap();

        assert_eq!(committed.accounts(), &[account.key()]);
        assert!(!store.accounts().exists(account.id()).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_debits_never_overdraw() {
        let (_dir, store) = setup_store().await;
        let account = open_account(UserId::new(), AccountContext::Personal, 500);
        store.accounts().save(&account).await.unwrap();
        let id = account.id();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let uow = store.begin().await?;
                let mut account = uow
                    .accounts()
                    .find_by_id(id)
                    .await?
                    .ok_or(RepoError::NotFound)?;
                account.debit(brl(100)).map_err(RepoError::Domain)?;
                uow.accounts().save(&account).await?;
                uow.commit().await.map(|_| ())
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => succeeded += 1,
                Err(RepoError::Domain(DomainError::InsufficientBalance { .. })) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        let stored = store.accounts().find_by_id(id).await.unwrap().unwrap();
        assert_eq!(succeeded, 5);
        assert_eq!(stored.balance(), brl(0));
    }
}

//! Storage transaction shared by the repositories of one unit of work.

use std::sync::Arc;

use sqlx::{Database, Transaction};
use tokio::sync::Mutex;

use ledger_types::{AccountKey, Committed, RepoError};

pub(crate) type SharedScope<DB> = Arc<Mutex<Scope<DB>>>;

/// One open storage transaction plus the accounts written through it.
///
/// Dropping a scope that still holds its transaction rolls it back.
pub(crate) struct Scope<DB: Database> {
    tx: Option<Transaction<'static, DB>>,
    touched: Vec<AccountKey>,
}

impl<DB: Database> Scope<DB> {
    pub(crate) fn shared(tx: Transaction<'static, DB>) -> SharedScope<DB> {
        Arc::new(Mutex::new(Self {
            tx: Some(tx),
            touched: Vec::new(),
        }))
    }

    /// Connection of the open transaction.
    pub(crate) fn connection(&mut self) -> Result<&mut DB::Connection, RepoError> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| RepoError::Transaction("Unit of work already finished".into()))
    }

    /// Records an account write for post-commit cache invalidation.
    pub(crate) fn touch(&mut self, key: AccountKey) {
        self.touched.push(key);
    }

    pub(crate) async fn commit(&mut self) -> Result<Committed, RepoError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| RepoError::Transaction("Unit of work already finished".into()))?;

        tx.commit()
            .await
            .map_err(|e| RepoError::Commit(e.to_string()))?;

        Ok(Committed::new(std::mem::take(&mut self.touched)))
    }

    pub(crate) async fn rollback(&mut self) -> Result<(), RepoError> {
        self.touched.clear();
        match self.tx.take() {
            Some(tx) => tx
                .rollback()
                .await
                .map_err(|e| RepoError::Transaction(e.to_string())),
            None => Ok(()),
        }
    }
}

impl<DB: Database> Drop for Scope<DB> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            tracing::debug!(
                touched = self.touched.len(),
                "Unit of work dropped without commit, rolling back"
            );
        }
    }
}

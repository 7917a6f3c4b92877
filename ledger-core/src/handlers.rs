//! Event subscribers shipped with the ledger.

use std::sync::Arc;

use async_trait::async_trait;

use ledger_types::{AccountKey, AccountRepository, CacheInvalidator, DomainEvent, event_types};

use crate::bus::{EventBus, EventHandler};

/// Events after which an account's cached reads are stale.
pub const BALANCE_EVENTS: [&str; 4] = [
    event_types::ACCOUNT_BALANCE_UPDATED,
    event_types::TRANSACTION_CREATED,
    event_types::TRANSACTION_UPDATED,
    event_types::TRANSACTION_DELETED,
];

// ─────────────────────────────────────────────────────────────────────────────
// Balance update backstop
// ─────────────────────────────────────────────────────────────────────────────

/// Re-invalidates an account's cache entries when its balance changes.
///
/// The use cases already invalidate after commit; this covers writers that
/// only publish events. It never touches balances, so a replayed event
/// cannot apply an effect twice.
pub struct BalanceUpdateHandler<R, I> {
    accounts: R,
    invalidator: I,
}

impl<R, I> BalanceUpdateHandler<R, I>
where
    R: AccountRepository + 'static,
    I: CacheInvalidator + 'static,
{
    /// `accounts` must read from storage, not through the cache.
    pub fn new(accounts: R, invalidator: I) -> Self {
        Self {
            accounts,
            invalidator,
        }
    }

    pub fn register(self, bus: &EventBus) {
        bus.subscribe_many(&BALANCE_EVENTS, Arc::new(self));
    }

    async fn resolve(&self, event: &DomainEvent) -> anyhow::Result<Option<AccountKey>> {
        let account_id = event.account_id();
        if let Some(user_id) = event.user_id() {
            return Ok(Some(AccountKey {
                account_id,
                user_id,
            }));
        }
        Ok(self
            .accounts
            .find_by_id(account_id)
            .await?
            .map(|account| account.key()))
    }
}

#[async_trait]
impl<R, I> EventHandler for BalanceUpdateHandler<R, I>
where
    R: AccountRepository + 'static,
    I: CacheInvalidator + 'static,
{
    fn name(&self) -> &'static str {
        "balance_update"
    }

    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()> {
        match self.resolve(event).await? {
            Some(key) => self.invalidator.invalidate(&[key]).await,
            None => tracing::debug!(
                account_id = %event.account_id(),
                "Account no longer exists, nothing to invalidate"
            ),
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Audit log
// ─────────────────────────────────────────────────────────────────────────────

/// Writes one structured log record per domain event.
#[derive(Debug, Default, Clone, Copy)]
pub struct AuditLogHandler;

impl AuditLogHandler {
    pub fn register(self, bus: &EventBus) {
        bus.subscribe_many(&event_types::ALL, Arc::new(self));
    }
}

#[async_trait]
impl EventHandler for AuditLogHandler {
    fn name(&self) -> &'static str {
        "audit_log"
    }

    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()> {
        let payload = serde_json::to_string(event)?;
        tracing::info!(
            target: "ledger::audit",
            event_type = event.event_type(),
            aggregate_type = event.aggregate_type(),
            aggregate_id = %event.aggregate_id(),
            occurred_at = %event.occurred_at(),
            payload = %payload,
            "Domain event"
        );
        Ok(())
    }
}

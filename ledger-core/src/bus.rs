//! Synchronous in-process domain event bus.
//!
//! Handlers subscribe to an event type key and run in registration order on
//! the publisher's task. Nothing is queued or persisted: an event that is not
//! published before the process stops is gone.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use ledger_types::DomainEvent;

/// A subscriber to domain events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Returns the name of this handler, used in logs and errors.
    fn name(&self) -> &'static str;

    /// Handles one event.
    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()>;
}

/// Failure reported by [`EventBus::publish`].
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Handler {handler} failed on {event_type}")]
    Handler {
        handler: &'static str,
        event_type: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// Adapts a plain closure into an [`EventHandler`].
struct FnHandler<F> {
    name: &'static str,
    f: F,
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&DomainEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn name(&self) -> &'static str {
        self.name
    }

    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()> {
        (self.f)(event)
    }
}

/// Registry of handlers keyed by event type.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<&'static str, Vec<Arc<dyn EventHandler>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for one event type.
    pub fn subscribe(&self, event_type: &'static str, handler: Arc<dyn EventHandler>) {
        tracing::debug!(event_type, handler = handler.name(), "Subscribed");
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event_type)
            .or_default()
            .push(handler);
    }

    /// Registers one handler for several event types.
    pub fn subscribe_many(&self, event_types: &[&'static str], handler: Arc<dyn EventHandler>) {
        for &event_type in event_types {
            self.subscribe(event_type, handler.clone());
        }
    }

    /// Registers a synchronous closure.
    pub fn subscribe_fn<F>(&self, event_type: &'static str, name: &'static str, f: F)
    where
        F: Fn(&DomainEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(event_type, Arc::new(FnHandler { name, f }));
    }

    /// Returns the number of handlers registered for an event type.
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_type)
            .map_or(0, Vec::len)
    }

    /// Delivers an event to every handler registered for its type.
    ///
    /// A failing handler does not stop the ones after it. The first failure is
    /// returned once all handlers have run; later ones are only logged.
    pub async fn publish(&self, event: &DomainEvent) -> Result<(), BusError> {
        let event_type = event.event_type();
        // Snapshot so no lock is held while handlers run.
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_type)
            .cloned()
            .unwrap_or_default();

        let mut first_error = None;
        for handler in handlers {
            if let Err(source) = handler.handle(event).await {
                tracing::warn!(
                    event_type,
                    handler = handler.name(),
                    error = %source,
                    "Event handler failed"
                );
                if first_error.is_none() {
                    first_error = Some(BusError::Handler {
                        handler: handler.name(),
                        event_type,
                        source,
                    });
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Publishes events in order. Handler failures are logged, never returned.
    pub async fn publish_all(&self, events: &[DomainEvent]) {
        for event in events {
            if let Err(e) = self.publish(event).await {
                tracing::error!(
                    event_type = event.event_type(),
                    aggregate_id = %event.aggregate_id(),
                    error = %e,
                    "Event delivery incomplete"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ledger_types::{AccountId, UserId, event_types};
    use std::sync::Mutex;

    fn activated() -> DomainEvent {
        DomainEvent::AccountActivated {
            account_id: AccountId::new(),
            user_id: UserId::new(),
            occurred_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        assert_eq!(bus.handler_count(event_types::ACCOUNT_ACTIVATED), 0);
        assert!(bus.publish(&activated()).await.is_ok());
    }

    #[tokio::test]
    async fn test_handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second", "third"] {
            let calls = calls.clone();
            bus.subscribe_fn(event_types::ACCOUNT_ACTIVATED, name, move |_| {
                calls.lock().unwrap().push(name);
                Ok(())
            });
        }

        bus.publish(&activated()).await.unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_remaining_handlers() {
        let bus = EventBus::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let c = calls.clone();
        bus.subscribe_fn(event_types::ACCOUNT_ACTIVATED, "ok-before", move |_| {
            c.lock().unwrap().push("ok-before");
            Ok(())
        });
        bus.subscribe_fn(event_types::ACCOUNT_ACTIVATED, "broken", |_| {
            anyhow::bail!("notification service down")
        });
        bus.subscribe_fn(event_types::ACCOUNT_ACTIVATED, "also-broken", |_| {
            anyhow::bail!("second failure")
        });
        let c = calls.clone();
        bus.subscribe_fn(event_types::ACCOUNT_ACTIVATED, "ok-after", move |_| {
            c.lock().unwrap().push("ok-after");
            Ok(())
        });

        let err = bus.publish(&activated()).await.unwrap_err();

        assert_eq!(*calls.lock().unwrap(), vec!["ok-before", "ok-after"]);
        match err {
            BusError::Handler {
                handler,
                event_type,
                source,
            } => {
                assert_eq!(handler, "broken");
                assert_eq!(event_type, "AccountActivated");
                assert_eq!(source.to_string(), "notification service down");
            }
        }
    }

    #[tokio::test]
    async fn test_only_matching_type_is_delivered() {
        let bus = EventBus::new();
        let hits = Arc::new(Mutex::new(0));
        let h = hits.clone();
        bus.subscribe_fn(event_types::ACCOUNT_DEACTIVATED, "counter", move |_| {
            *h.lock().unwrap() += 1;
            Ok(())
        });

        bus.publish(&activated()).await.unwrap();

        assert_eq!(*hits.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_publish_all_swallows_failures() {
        let bus = EventBus::new();
        let hits = Arc::new(Mutex::new(0));
        bus.subscribe_fn(event_types::ACCOUNT_ACTIVATED, "broken", |_| {
            anyhow::bail!("boom")
        });
        let h = hits.clone();
        bus.subscribe_fn(event_types::ACCOUNT_ACTIVATED, "counter", move |_| {
            *h.lock().unwrap() += 1;
            Ok(())
        });

        bus.publish_all(&[activated(), activated()]).await;

        assert_eq!(*hits.lock().unwrap(), 2);
    }
}

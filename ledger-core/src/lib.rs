//! # Ledger Core
//!
//! Application layer for the finance ledger.
//!
//! ## Architecture
//!
//! - `service` - Application service (orchestrates the use cases)
//! - `bus` - Synchronous in-process domain event bus
//! - `handlers` - Event subscribers (cache backstop, audit log)
//!
//! The service is generic over the ports in `ledger-types`, allowing
//! different storage and cache adapters to be injected.

pub mod bus;
pub mod handlers;
pub mod service;


pub use bus::{BusError, EventBus, EventHandler};
pub use handlers::{AuditLogHandler, BALANCE_EVENTS, BalanceUpdateHandler};
pub use service::LedgerService;

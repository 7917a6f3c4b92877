//! # Ledger Types
//!
//! Domain types and port traits for the finance ledger.
//! This crate has ZERO external IO dependencies - only data structures,
//! business rules, and trait definitions.
//!
//! ## Architecture
//!
//! This crate represents the **innermost core** of the hexagonal architecture:
//! - `domain/` - Aggregates and values (Money, Account, Transaction, DomainEvent)
//! - `ports/` - Repository, unit-of-work and cache traits that adapters implement
//! - `dto/` - Use-case request objects
//! - `error/` - Domain, repository, cache and application error types

pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;

// Re-export commonly used types
pub use domain::{
    Account, AccountContext, AccountId, AccountKey, AccountType, BalanceEffect, Currency,
    DomainEvent, Money, Transaction, TransactionId, TransactionType, UserId, event_types,
};
pub use dto::*;
pub use error::{AppError, CacheError, DomainError, RepoError};
pub use ports::{
    AccountRepository, CacheInvalidator, CacheStore, Committed, TransactionRepository, UnitOfWork,
    UnitOfWorkFactory,
};

//! Port traits (interfaces for adapters).
//!
//! These are the contracts that adapters must implement.
//! The application layer depends on these traits, not concrete implementations.

mod cache;
mod repository;
mod unit_of_work;

pub use cache::{CacheInvalidator, CacheStore};
pub use repository::{AccountRepository, TransactionRepository};
pub use unit_of_work::{Committed, UnitOfWork, UnitOfWorkFactory};

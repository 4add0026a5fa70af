//! Ledger client interface.
//!
//! The ledger stores one [`LedgerRecord`] per identity key and is reached
//! through named query/invoke functions on a channel + contract. This crate
//! defines the [`Ledger`] trait, an in-memory implementation with the same
//! conflict semantics as the deployed contract, and an HTTP gateway client.

pub mod error;
pub mod gateway;
pub mod ledger;
pub mod memory;

pub use error::LedgerError;
pub use gateway::{GatewayConfig, GatewayLedger};
pub use ledger::{Ledger, LedgerRecord, LedgerStatus};
pub use memory::MemoryLedger;

//! # statecraft-storage
//!
//! History stores for statecraft.
//!
//! This crate provides:
//! - In-memory history store
//! - Append-only JSON-lines history store with crash recovery

pub mod error;
pub mod jsonl;
pub mod memory;

pub use error::StorageError;
pub use jsonl::{JsonlHistoryStore, RecoveryResult, SyncPolicy};
pub use memory::MemoryHistoryStore;

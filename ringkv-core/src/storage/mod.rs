//! Storage modules for Ringkv
//!
//! Provides the in-memory, per-slot sibling store.

pub mod sibling_store;

pub use sibling_store::{SiblingStore, SlotKey};

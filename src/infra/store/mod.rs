//! Persistence adapters.

pub mod memory;

pub use memory::{InMemoryStore, StaticBillingSource};

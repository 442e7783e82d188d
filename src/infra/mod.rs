//! Infrastructure adapters: job stores, persistence and posting providers.

pub mod provider;
pub mod queue;
pub mod store;

pub use provider::{HttpPostingProvider, RecordingProvider};
pub use queue::{FileJobStore, InMemoryJobStore};
pub use store::{InMemoryStore, StaticBillingSource};

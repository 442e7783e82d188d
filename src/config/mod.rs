//! Configuration models for workers, dispatching, quotas and the provider.

pub mod dispatcher;
pub mod engine;
pub mod pool;
pub mod quota;

pub use dispatcher::{DispatcherConfig, JobStoreConfig};
pub use engine::{EngineConfig, ProviderConfig};
pub use pool::WorkerPoolConfig;
pub use quota::{DiscountAutoPostCap, PlanLimits, QuotaConfig};

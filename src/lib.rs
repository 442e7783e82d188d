//! # Prometheus Publisher
//!
//! A timezone-aware scheduling and publishing engine for multi-tenant social
//! posting.
//!
//! The engine turns approved content plus a tenant's posting rule into
//! time-stamped publish jobs, fires each job at its slot against an external
//! posting provider, and enforces per-tenant quotas and destination safety on
//! the way.
//!
//! ## Pipeline
//!
//! - **Slots** ([`core::slots`]): posting rule + date range + timezone give an
//!   ascending sequence of future UTC instants, DST-correct.
//! - **Distributor** ([`core::Distributor`]): pairs content/platforms with
//!   slots, freezes each pairing's destination id, commits the batch
//!   atomically and only then enqueues publish jobs.
//! - **Dispatcher** ([`core::Dispatcher`]): keyed delayed jobs over a
//!   pluggable [`core::JobStore`], with one pending job per key, restart
//!   recovery and exponential-backoff retries.
//! - **Publish worker** ([`core::PublishWorker`]): re-loads everything at fire
//!   time, refuses to publish when ownership or the destination changed, and
//!   only ever sends the frozen destination id.
//! - **Quota ledger** ([`core::QuotaLedger`]): per-billing-period counters,
//!   checked before work is created and incremented after it succeeded.
//!
//! ## Getting started
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_publisher::builders::EngineBuilder;
//! use prometheus_publisher::config::EngineConfig;
//! use prometheus_publisher::infra::{InMemoryStore, StaticBillingSource};
//!
//! prometheus_publisher::util::init_tracing();
//! let store = Arc::new(InMemoryStore::new());
//! let engine = EngineBuilder::new(EngineConfig::from_env()?)
//!     .with_stores(store.clone())
//!     .with_billing(Arc::new(StaticBillingSource::new()))
//!     .build()?;
//!
//! let outcome = engine.schedule_content(&"tenant-1".into(), &["post-1".into()], None)?;
//! println!("{} scheduled, {} short", outcome.scheduled_count, outcome.shortfall);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions, algorithms and the publish pipeline.
pub mod core;
/// Configuration models for workers, dispatching, quotas and the provider.
pub mod config;
/// Builders to construct the engine from configuration.
pub mod builders;
/// Infrastructure adapters: job stores, persistence and posting providers.
pub mod infra;
/// Domain records consumed and produced by the engine.
pub mod model;
/// Engine facade and API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;

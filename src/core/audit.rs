//! Audit sink implementations.
//!
//! Every state transition of a schedule item produces one [`AuditEvent`].
//! Sinks are fire-and-forget from the engine's point of view: [`emit`] logs
//! and swallows sink failures so they never abort a publish or a schedule.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::SchedulerError;
use crate::util::serde::TenantId;

/// Severity of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    /// Normal lifecycle transition.
    Info,
    /// Failed operation.
    Warning,
    /// Security violation.
    Critical,
}

/// Audit event structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Tenant identifier.
    pub tenant: TenantId,
    /// Event type, e.g. `schedule.created` or `publish.failed`.
    pub event_type: String,
    /// Kind of entity the event is about.
    pub entity_type: String,
    /// Entity identifier.
    pub entity_id: String,
    /// Severity.
    pub severity: AuditSeverity,
    /// Structured context.
    pub metadata: serde_json::Value,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send + Sync {
    /// Record an audit event.
    ///
    /// # Errors
    ///
    /// Returns a backend error when the event could not be stored.
    fn record(&self, event: AuditEvent) -> Result<(), SchedulerError>;
}

/// Record an event, logging instead of propagating sink failures.
pub fn emit(sink: &dyn AuditSink, event: AuditEvent) {
    let event_type = event.event_type.clone();
    let entity_id = event.entity_id.clone();
    if let Err(e) = sink.record(event) {
        tracing::warn!(
            error = %e,
            event_type = %event_type,
            entity_id = %entity_id,
            "audit sink rejected event"
        );
    }
}

/// In-memory audit sink for testing and dev.
pub struct InMemoryAuditSink {
    events: Mutex<VecDeque<AuditEvent>>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events.min(1024))),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Events of one type, oldest first.
    #[must_use]
    pub fn events_of_type(&self, event_type: &str) -> Vec<AuditEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), SchedulerError> {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
        Ok(())
    }
}

/// Sink that writes events to the `audit` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), SchedulerError> {
        let metadata = event.metadata.to_string();
        match event.severity {
            AuditSeverity::Critical => tracing::error!(
                target: "audit",
                tenant = %event.tenant,
                event_type = %event.event_type,
                entity_type = %event.entity_type,
                entity_id = %event.entity_id,
                %metadata,
                "audit event"
            ),
            AuditSeverity::Warning => tracing::warn!(
                target: "audit",
                tenant = %event.tenant,
                event_type = %event.event_type,
                entity_type = %event.entity_type,
                entity_id = %event.entity_id,
                %metadata,
                "audit event"
            ),
            AuditSeverity::Info => tracing::info!(
                target: "audit",
                tenant = %event.tenant,
                event_type = %event.event_type,
                entity_type = %event.entity_type,
                entity_id = %event.entity_id,
                %metadata,
                "audit event"
            ),
        }
        Ok(())
    }
}

/// Helper to build an audit event from context.
pub fn build_audit_event(
    tenant: impl Into<TenantId>,
    event_type: impl Into<String>,
    entity_type: impl Into<String>,
    entity_id: impl Into<String>,
    severity: AuditSeverity,
    metadata: serde_json::Value,
) -> AuditEvent {
    AuditEvent {
        event_id: Uuid::new_v4().to_string(),
        tenant: tenant.into(),
        event_type: event_type.into(),
        entity_type: entity_type.into(),
        entity_id: entity_id.into(),
        severity,
        metadata,
        created_at: Utc::now(),
    }
}

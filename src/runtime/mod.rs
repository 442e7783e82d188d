//! Engine facade and API surface.

pub mod api;
pub mod engine;

pub use api::{submit_schedule, ErrorResponse, Health, ScheduleRequest};
pub use engine::{PublishDispatcher, SchedulingEngine};

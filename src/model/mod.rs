//! Domain records consumed and produced by the engine.

pub mod content;
pub mod destination;
pub mod rule;
pub mod schedule;
pub mod usage;

pub use content::{ContentItem, ContentStatus};
pub use destination::{DestinationProfile, DestinationStatus};
pub use rule::{PostingRule, TimeWindow};
pub use schedule::{rolled_up_content_status, ScheduleItem, ScheduleStatus};
pub use usage::{BillingSnapshot, PlanTier, QuotaAction, UsageCounter};

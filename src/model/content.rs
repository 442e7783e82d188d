//! Content items owned by the external content store.

use serde::{Deserialize, Serialize};

use crate::util::serde::{ContentId, Platform, TenantId};

/// Lifecycle of a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentStatus {
    /// Being authored.
    Draft,
    /// Waiting for review.
    PendingApproval,
    /// Approved and ready to schedule.
    Approved,
    /// Every target platform has a schedule item.
    Scheduled,
    /// Every schedule item has published.
    Published,
    /// Rejected in review.
    Rejected,
}

/// Approved post content with its target platforms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Content identifier.
    pub id: ContentId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Lifecycle state.
    pub status: ContentStatus,
    /// Target platforms in the order they should take slots.
    pub platforms: Vec<Platform>,
    /// Post caption.
    pub caption: String,
    /// Hashtags, with or without the leading `#`.
    #[serde(default)]
    pub hashtags: Vec<String>,
    /// Public media URLs.
    #[serde(default)]
    pub media_urls: Vec<String>,
}

impl ContentItem {
    /// Whether the item can be (re-)scheduled.
    #[must_use]
    pub fn is_schedulable(&self) -> bool {
        matches!(self.status, ContentStatus::Approved | ContentStatus::Scheduled)
    }

    /// Caption followed by the hashtag line.
    #[must_use]
    pub fn post_text(&self) -> String {
        let tags: Vec<String> = self
            .hashtags
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(|t| {
                if t.starts_with('#') {
                    t.to_owned()
                } else {
                    format!("#{t}")
                }
            })
            .collect();
        if tags.is_empty() {
            self.caption.clone()
        } else {
            format!("{}\n\n{}", self.caption.trim_end(), tags.join(" "))
        }
    }
}

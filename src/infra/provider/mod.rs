//! Posting provider adapters.

pub mod http;
pub mod recording;

pub use http::HttpPostingProvider;
pub use recording::RecordingProvider;

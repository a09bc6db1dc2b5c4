// src/ingest/providers/mod.rs
pub mod https_feed;
pub mod static_feed;

pub use https_feed::HttpFeedFetcher;
pub use static_feed::StaticFeedFetcher;

/// User agent sent with every outbound request.
pub const USER_AGENT: &str = concat!(
    "feed-digest-bot/",
    env!("CARGO_PKG_VERSION"),
    " (RSS to chat digest bot)"
);

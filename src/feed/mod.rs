mod fetcher;
pub mod interval;
pub mod resolve;
pub mod rewrite;
pub mod updated;

pub use fetcher::{FeedFetcher, RefreshOutcome};

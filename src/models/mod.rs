mod entry_metadata;
mod feed_config;

pub use entry_metadata::FeedEntryMetadata;
pub use feed_config::{
    FeedConfig, FeedConfigData, FeedConfigForm, FeedConfigFull, FeedDetails, FeedType,
    OpenEntrySetting, ProxyMode,
};

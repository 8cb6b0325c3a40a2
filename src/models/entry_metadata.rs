use serde::{Deserialize, Serialize};

/// Read state for one entry of a feed, keyed by the entry's feed-native id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntryMetadata {
    pub entry_id: String,
    #[serde(default)]
    pub is_marked_read: bool,
}

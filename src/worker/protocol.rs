use serde::{Deserialize, Serialize};

use crate::models::{
    FeedConfig, FeedConfigData, FeedConfigForm, FeedConfigFull, FeedEntryMetadata,
};

/// Messages accepted by the worker, tagged by `message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Request {
    Ping,
    Init,
    Upgrade,
    ListFeedConfigs,
    InsertFeedConfig {
        feed_config: FeedConfigForm,
    },
    UpdateFeedConfig {
        feed_config: FeedConfigForm,
    },
    DeleteFeedConfig {
        feed_config_id: i64,
    },
    GetFeedConfigFull {
        feed_config_id: i64,
    },
    UpdateFeedConfigData {
        feed_config_data: FeedConfigData,
    },
    ListFeedEntriesMetadata {
        feed_config_id: i64,
    },
    UpdateFeedEntryMetadata {
        feed_config_id: i64,
        entry_metadata: FeedEntryMetadata,
    },
    BulkUpdateEntriesMarkRead {
        feed_config_id: i64,
        entry_ids: Vec<String>,
    },
    Demo,
    DevNuke,
}

impl Request {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Init => "init",
            Self::Upgrade => "upgrade",
            Self::ListFeedConfigs => "list-feed-configs",
            Self::InsertFeedConfig { .. } => "insert-feed-config",
            Self::UpdateFeedConfig { .. } => "update-feed-config",
            Self::DeleteFeedConfig { .. } => "delete-feed-config",
            Self::GetFeedConfigFull { .. } => "get-feed-config-full",
            Self::UpdateFeedConfigData { .. } => "update-feed-config-data",
            Self::ListFeedEntriesMetadata { .. } => "list-feed-entries-metadata",
            Self::UpdateFeedEntryMetadata { .. } => "update-feed-entry-metadata",
            Self::BulkUpdateEntriesMarkRead { .. } => "bulk-update-entries-mark-read",
            Self::Demo => "demo",
            Self::DevNuke => "dev-nuke",
        }
    }
}

/// Messages sent back by the worker, tagged by `message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Response {
    Pong,
    Initialized,
    Upgraded {
        applied: Vec<String>,
    },
    FeedConfigs {
        feed_configs: Vec<FeedConfig>,
    },
    FeedConfigFull {
        data: FeedConfigFull,
    },
    FeedEntryMetadataList {
        feed_config_id: i64,
        entries_metadata: Vec<FeedEntryMetadata>,
    },
    FeedEntryMetadataUpdated {
        feed_config_id: i64,
        entry_id: String,
    },
    FeedEntriesMarkedRead {
        feed_config_id: i64,
        count: usize,
    },
    Nuked {
        dropped: Vec<String>,
    },
    Error {
        error: String,
    },
}

impl Response {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pong => "pong",
            Self::Initialized => "initialized",
            Self::Upgraded { .. } => "upgraded",
            Self::FeedConfigs { .. } => "feed-configs",
            Self::FeedConfigFull { .. } => "feed-config-full",
            Self::FeedEntryMetadataList { .. } => "feed-entry-metadata-list",
            Self::FeedEntryMetadataUpdated { .. } => "feed-entry-metadata-updated",
            Self::FeedEntriesMarkedRead { .. } => "feed-entries-marked-read",
            Self::Nuked { .. } => "nuked",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_tagged_requests() {
        let request: Request = serde_json::from_value(json!({
            "message": "bulk-update-entries-mark-read",
            "feedConfigId": 3,
            "entryIds": ["a", "b"],
        }))
        .unwrap();
        assert_eq!(
            request,
            Request::BulkUpdateEntriesMarkRead {
                feed_config_id: 3,
                entry_ids: vec!["a".to_string(), "b".to_string()],
            }
        );

        let request: Request = serde_json::from_value(json!({
            "message": "update-feed-entry-metadata",
            "feedConfigId": 3,
            "entryMetadata": { "entryId": "guid-9" },
        }))
        .unwrap();
        assert_eq!(
            request,
            Request::UpdateFeedEntryMetadata {
                feed_config_id: 3,
                entry_metadata: FeedEntryMetadata {
                    entry_id: "guid-9".to_string(),
                    is_marked_read: false,
                },
            }
        );

        let request: Request = serde_json::from_value(json!({ "message": "dev-nuke" })).unwrap();
        assert_eq!(request.kind(), "dev-nuke");
    }

    #[test]
    fn decodes_insert_form() {
        let request: Request = serde_json::from_value(json!({
            "message": "insert-feed-config",
            "feedConfig": {
                "feed_type": "atom",
                "url": "https://example.com/atom.xml",
                "proxy": "cors-relay",
                "title": "Example",
                "description": "",
                "scan_interval": "30m",
                "open_entry_setting": "new-tab",
            },
        }))
        .unwrap();

        let Request::InsertFeedConfig { feed_config } = request else {
            panic!("wrong variant");
        };
        assert_eq!(feed_config.id, None);
        assert_eq!(feed_config.scan_interval, "30m");
    }

    #[test]
    fn unknown_discriminant_does_not_decode() {
        assert!(serde_json::from_value::<Request>(json!({ "message": "reticulate" })).is_err());
        assert!(serde_json::from_value::<Request>(json!({ "feedConfigId": 1 })).is_err());
    }

    #[test]
    fn encodes_tagged_responses() {
        let value = serde_json::to_value(Response::FeedEntryMetadataList {
            feed_config_id: 4,
            entries_metadata: vec![FeedEntryMetadata {
                entry_id: "x".to_string(),
                is_marked_read: true,
            }],
        })
        .unwrap();
        assert_eq!(
            value,
            json!({
                "message": "feed-entry-metadata-list",
                "feedConfigId": 4,
                "entriesMetadata": [{ "entryId": "x", "isMarkedRead": true }],
            })
        );

        assert_eq!(serde_json::to_value(Response::Pong).unwrap(), json!({ "message": "pong" }));
    }
}

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FeedType {
    #[serde(rename = "rss")]
    Rss,
    #[serde(rename = "atom")]
    Atom,
    #[serde(rename = "unknown")]
    Unknown,
    #[default]
    #[serde(rename = "")]
    Unset,
}

impl FeedType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rss => "rss",
            Self::Atom => "atom",
            Self::Unknown => "unknown",
            Self::Unset => "",
        }
    }

    /// Stored text is not constrained by the schema, so anything we do not
    /// recognise reads back as `Unknown`.
    pub fn from_stored(value: &str) -> Self {
        match value {
            "rss" => Self::Rss,
            "atom" => Self::Atom,
            "" => Self::Unset,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProxyMode {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "cors-relay")]
    CorsRelay,
}

impl ProxyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "",
            Self::CorsRelay => "cors-relay",
        }
    }

    pub fn from_stored(value: &str) -> Self {
        match value {
            "cors-relay" => Self::CorsRelay,
            _ => Self::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OpenEntrySetting {
    #[default]
    InApp,
    NewTab,
}

impl OpenEntrySetting {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InApp => "in-app",
            Self::NewTab => "new-tab",
        }
    }

    pub fn from_stored(value: &str) -> Self {
        match value {
            "new-tab" => Self::NewTab,
            _ => Self::InApp,
        }
    }
}

macro_rules! text_column {
    ($ty:ty, $null:expr) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                match value {
                    ValueRef::Null => Ok($null),
                    _ => value.as_str().map(Self::from_stored),
                }
            }
        }
    };
}

text_column!(FeedType, FeedType::Unset);
text_column!(ProxyMode, ProxyMode::None);
text_column!(OpenEntrySetting, OpenEntrySetting::InApp);

/// A feed configuration row without the fetched body, as shown in list views.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeedConfig {
    pub id: i64,
    #[serde(default)]
    pub feed_type: FeedType,
    pub url: String,
    #[serde(default)]
    pub proxy: ProxyMode,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub scan_interval: String,
    #[serde(default)]
    pub open_entry_setting: OpenEntrySetting,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub last_checked: String,
    #[serde(default)]
    pub etag: String,
}

/// A feed configuration row including the raw fetched body.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeedConfigFull {
    #[serde(flatten)]
    pub config: FeedConfig,
    #[serde(default)]
    pub html: String,
}

/// The user-editable part of a feed configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeedConfigForm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub feed_type: FeedType,
    pub url: String,
    #[serde(default)]
    pub proxy: ProxyMode,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub scan_interval: String,
    #[serde(default)]
    pub open_entry_setting: OpenEntrySetting,
}

/// Fields written by a refresh. They only ever change together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfigData {
    pub id: i64,
    pub last_checked: String,
    pub last_updated: String,
    pub etag: String,
    pub html: String,
}

/// Title, description and type sniffed from a feed document.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedDetails {
    pub title: String,
    pub description: String,
    pub feed_type: FeedType,
}

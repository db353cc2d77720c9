// ABOUTME: Serde data models for content items, filters, and media assets
// ABOUTME: Tolerant parsing with optional fields and status aliases

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    #[serde(alias = "publish")]
    Published,
    #[default]
    Draft,
    Pending,
    #[serde(alias = "future")]
    Scheduled,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Published => "published",
            ItemStatus::Draft => "draft",
            ItemStatus::Pending => "pending",
            ItemStatus::Scheduled => "scheduled",
        }
    }

    /// Accepts canonical names plus the legacy aliases `publish` and
    /// `future` found in older exports.
    pub fn parse(value: &str) -> Option<ItemStatus> {
        match value.trim().to_ascii_lowercase().as_str() {
            "published" | "publish" => Some(ItemStatus::Published),
            "draft" => Some(ItemStatus::Draft),
            "pending" => Some(ItemStatus::Pending),
            "scheduled" | "future" => Some(ItemStatus::Scheduled),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentMode {
    Open,
    Closed,
}

impl CommentMode {
    pub fn parse(value: &str) -> Option<CommentMode> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" => Some(CommentMode::Open),
            "closed" => Some(CommentMode::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: u64,
    pub title: String,
    /// Body in the structured-markup dialect, not Markdown.
    pub body: String,
    pub status: ItemStatus,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,
    /// Normalized source path of the featured media asset.
    #[serde(default)]
    pub featured_image: Option<String>,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub parent: Option<u64>,
}

/// Fields accepted by repository create/update calls. The repository
/// resolves author names and fills defaults for absent values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemFields {
    pub title: String,
    pub body: String,
    pub status: ItemStatus,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub menu_order: Option<i64>,
    #[serde(default)]
    pub comments: Option<CommentMode>,
    #[serde(default)]
    pub parent: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAsset {
    pub id: u64,
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ItemStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    pub exclude_exported: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

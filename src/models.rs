//! Data models shared by every trending source.
//!
//! All scrapers normalize their upstream payloads into [`TrendingItem`], so
//! the CLI can print one uniform JSON shape regardless of the site.

use serde::{Deserialize, Serialize};

/// Marker carried by placeholder items when every upstream failed.
pub const UNAVAILABLE_NOTE: &str = "接口暂时不可用，请稍后重试";

/// One entry of a trending list.
///
/// Only `title` is mandatory; everything else is omitted from the JSON output
/// when the upstream did not provide it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TrendingItem {
    /// 1-based position in the list, when the source ranks items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    /// Views, reads, replies... whatever the site counts, as a display string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub popularity: Option<String>,
    /// ISO-8601 when the upstream exposes a publish time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_time: Option<String>,
    /// Set only on placeholder items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl TrendingItem {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// The single item served when a source is entirely unreachable.
    pub fn placeholder(title: &str, description: &str, link: &str) -> Self {
        Self {
            rank: Some(1),
            description: Some(description.to_string()),
            link: Some(link.to_string()),
            note: Some(UNAVAILABLE_NOTE.to_string()),
            ..Self::new(title)
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.note.is_some()
    }
}

/// Assign 1-based ranks in list order.
pub fn ranked(items: Vec<TrendingItem>) -> Vec<TrendingItem> {
    items
        .into_iter()
        .zip(1u32..)
        .map(|(item, rank)| TrendingItem {
            rank: Some(rank),
            ..item
        })
        .collect()
}

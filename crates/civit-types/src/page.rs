use serde::{Deserialize, Deserializer, Serialize};

use crate::model::Model;

/// Pagination block shared by every list endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageMetadata {
    pub total_items: Option<u64>,
    pub current_page: Option<u64>,
    pub page_size: Option<u64>,
    pub total_pages: Option<u64>,
    #[serde(deserialize_with = "cursor")]
    pub next_cursor: Option<String>,
    pub next_page: Option<String>,
    pub prev_page: Option<String>,
}

impl PageMetadata {
    /// Page number to request next when the endpoint paginates by page
    /// rather than by cursor.
    pub fn next_page_number(&self) -> Option<u64> {
        match (self.current_page, self.total_pages) {
            (Some(cur), Some(total)) if cur < total => Some(cur + 1),
            _ => None,
        }
    }

    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some() || self.next_page.is_some() || self.next_page_number().is_some()
    }
}

/// Generic `{ items, metadata }` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub metadata: PageMetadata,
}

pub type ModelsPage = Page<Model>;
pub type TagsPage = Page<Tag>;
pub type CreatorsPage = Page<CreatorSummary>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Tag {
    pub name: String,
    pub model_count: Option<u64>,
    pub link: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreatorSummary {
    pub username: String,
    pub model_count: Option<u64>,
    pub link: Option<String>,
    pub image: Option<String>,
}

// Cursors come back as strings (`"123|456"`) or bare numbers.
fn cursor<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

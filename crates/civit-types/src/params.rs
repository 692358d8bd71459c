use crate::enums::{ModelType, Period, SortOrder};

/// Upper bound the `/models` endpoint accepts for `limit`.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Filters for `GET /models`.
///
/// Built with chained setters and rendered through [`SearchParams::to_query`],
/// which yields pairs in a fixed order so the rendered URL can double as a
/// cache key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchParams {
    pub limit: Option<u32>,
    pub page: Option<u32>,
    pub cursor: Option<String>,
    pub query: Option<String>,
    pub tag: Option<String>,
    pub username: Option<String>,
    pub types: Vec<ModelType>,
    pub sort: Option<SortOrder>,
    pub period: Option<Period>,
    pub nsfw: Option<bool>,
    pub base_models: Vec<String>,
    pub favorites: Option<bool>,
    pub primary_file_only: Option<bool>,
    pub allow_no_credit: Option<bool>,
    pub allow_derivatives: Option<bool>,
    pub allow_different_licenses: Option<bool>,
    pub allow_commercial_use: Option<String>,
    pub ids: Vec<u64>,
}

impl SearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit.clamp(1, MAX_PAGE_SIZE));
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page.max(1));
        self
    }

    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn model_type(mut self, t: ModelType) -> Self {
        if !self.types.contains(&t) {
            self.types.push(t);
        }
        self
    }

    pub fn sort(mut self, sort: SortOrder) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn period(mut self, period: Period) -> Self {
        self.period = Some(period);
        self
    }

    pub fn nsfw(mut self, nsfw: bool) -> Self {
        self.nsfw = Some(nsfw);
        self
    }

    pub fn base_model(mut self, base: impl Into<String>) -> Self {
        let base = base.into();
        if !self.base_models.contains(&base) {
            self.base_models.push(base);
        }
        self
    }

    pub fn favorites(mut self, favorites: bool) -> Self {
        self.favorites = Some(favorites);
        self
    }

    pub fn primary_file_only(mut self, primary: bool) -> Self {
        self.primary_file_only = Some(primary);
        self
    }

    pub fn ids(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.ids.extend(ids);
        self
    }

    /// Page size actually sent, falling back to the API default of 100.
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(MAX_PAGE_SIZE)
    }

    /// CivitAI rejects `page` together with `query`; cursors must be used.
    pub fn requires_cursor(&self) -> bool {
        self.query.is_some()
    }

    /// Render to query pairs in a stable order. Multi-valued filters repeat
    /// the key, which is what the API expects.
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut q: Vec<(String, String)> = Vec::new();
        let mut push = |k: &str, v: String| q.push((k.to_owned(), v));

        if let Some(limit) = self.limit {
            push("limit", limit.to_string());
        }
        if let Some(cursor) = &self.cursor {
            push("cursor", cursor.clone());
        } else if let Some(page) = self.page {
            if !self.requires_cursor() {
                push("page", page.to_string());
            }
        }
        if let Some(query) = &self.query {
            push("query", query.clone());
        }
        if let Some(tag) = &self.tag {
            push("tag", tag.clone());
        }
        if let Some(username) = &self.username {
            push("username", username.clone());
        }
        for t in &self.types {
            push("types", t.as_str().to_owned());
        }
        if let Some(sort) = self.sort {
            push("sort", sort.as_str().to_owned());
        }
        if let Some(period) = self.period {
            push("period", period.as_str().to_owned());
        }
        if let Some(nsfw) = self.nsfw {
            push("nsfw", nsfw.to_string());
        }
        for base in &self.base_models {
            push("baseModels", base.clone());
        }
        if let Some(v) = self.favorites {
            push("favorites", v.to_string());
        }
        if let Some(v) = self.primary_file_only {
            push("primaryFileOnly", v.to_string());
        }
        if let Some(v) = self.allow_no_credit {
            push("allowNoCredit", v.to_string());
        }
        if let Some(v) = self.allow_derivatives {
            push("allowDerivatives", v.to_string());
        }
        if let Some(v) = self.allow_different_licenses {
            push("allowDifferentLicenses", v.to_string());
        }
        if let Some(v) = &self.allow_commercial_use {
            push("allowCommercialUse", v.clone());
        }
        for id in &self.ids {
            push("ids", id.to_string());
        }
        q
    }
}

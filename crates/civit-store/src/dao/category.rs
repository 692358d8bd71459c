use strum::{Display, EnumString};

/// What a category was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum CategoryKind {
    Type,
    BaseModel,
    Tag,
}

impl CategoryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CategoryKind::Type => "type",
            CategoryKind::BaseModel => "base_model",
            CategoryKind::Tag => "tag",
        }
    }
}

/// A row in the `categories` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRecord {
    pub model_id: i64,
    pub kind: CategoryKind,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryCount {
    pub kind: CategoryKind,
    pub name: String,
    pub count: i64,
}

//! Shared types for the civit workspace: the CivitAI wire model, list
//! envelopes and query parameters.

pub mod enums;
pub mod model;
pub mod page;
pub mod params;

pub use enums::{ModelType, ParseEnumError, Period, SortOrder};
pub use model::{
    Creator, FileHashes, FileMetadata, Model, ModelFile, ModelImage, ModelStats, ModelVersion,
};
pub use page::{CreatorSummary, CreatorsPage, ModelsPage, Page, PageMetadata, Tag, TagsPage};
pub use params::{MAX_PAGE_SIZE, SearchParams};

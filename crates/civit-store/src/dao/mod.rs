pub mod category;
pub mod download;
pub mod model;

pub use category::{CategoryCount, CategoryKind, CategoryRecord};
pub use download::{DownloadRecord, DownloadStatus, NewDownload};
pub use model::{ModelFilter, ModelRecord};

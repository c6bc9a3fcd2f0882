pub mod content;
pub mod recency;

pub use content::{validate_filename, ContentDir, StagedFile};
pub use recency::RecencyStore;

pub mod archive;
mod config;
mod store;


pub use config::StorageConfig;
pub use store::{ArtifactStore, DATA_FILE_NAME, StoredArtifact, validate_segment};

pub mod blob_store;
pub mod paths;
pub mod photo_store;

pub use blob_store::FsBlobStore;
pub use photo_store::PhotoStore;

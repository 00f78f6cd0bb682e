//! Storage abstractions for the weather-for-humans ETL.
//!
//! Provides unified interfaces for:
//! - Object storage (S3 compatible) for the merged forecast archive
//! - A document store (PostgreSQL JSONB, or in memory) for the status
//!   record and the per-cell forecast documents
//! - The media endpoint that receives rendered charts

pub mod documents;
pub mod error;
pub mod media;
pub mod memory;
pub mod object_store;
pub mod postgres;
pub mod status;

pub use self::object_store::{ObjectStorage, ObjectStorageConfig};
pub use documents::{DocumentStore, ForecastDocument, StatusDocument, StatusField, STATUS_ID};
pub use error::{StoreError, StoreResult};
pub use media::{MediaConfig, MediaStorage};
pub use memory::MemoryDocumentStore;
pub use postgres::PgDocumentStore;
pub use status::StatusStore;

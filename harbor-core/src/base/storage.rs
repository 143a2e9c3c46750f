use std::collections::HashMap;

use rst_common::standard::async_trait::async_trait;
use rst_common::standard::uuid::Uuid;
use rst_common::with_errors::thiserror::{self, Error};

/// `StorageError` covers the generic tagged-record storage contract
#[derive(Debug, PartialEq, Error, Clone)]
pub enum StorageError {
    #[error("storage record not found: {0}")]
    NotFound(String),

    #[error("duplicate storage record: {0}")]
    Duplicate(String),

    #[error("storage error: {0}")]
    StorageFailure(String),
}

/// `StorageRecord` is a raw key/value record with exact-match tags, used for the
/// `DID Document` store and the verkey-to-`DID` reverse index
#[derive(Debug, Clone, PartialEq)]
pub struct StorageRecord {
    pub id: String,
    pub record_type: String,
    pub value: String,
    pub tags: HashMap<String, String>,
}

impl StorageRecord {
    pub fn new(record_type: String, value: String, tags: HashMap<String, String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            record_type,
            value,
            tags,
        }
    }
}

/// `StorageBuilder` is the contract of the generic record storage
///
/// Queries are exact-match over the tag map. `find_record` raises
/// [`StorageError::NotFound`] when nothing matches
#[async_trait]
pub trait StorageBuilder: Send + Sync {
    async fn add_record(&self, record: StorageRecord) -> Result<(), StorageError>;

    async fn find_record(
        &self,
        record_type: String,
        tags: HashMap<String, String>,
    ) -> Result<StorageRecord, StorageError>;

    async fn update_record(
        &self,
        record: StorageRecord,
        value: String,
        tags: HashMap<String, String>,
    ) -> Result<(), StorageError>;

    async fn delete_all_records(
        &self,
        record_type: String,
        tags: HashMap<String, String>,
    ) -> Result<(), StorageError>;
}

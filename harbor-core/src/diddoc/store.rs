use std::collections::HashMap;

use rstdev_domain::entity::ToJSON;

use crate::base::storage::{StorageBuilder, StorageError, StorageRecord};

use super::doc::DIDDocument;

pub const RECORD_TYPE_DID_DOC: &str = "did_doc";
pub const RECORD_TYPE_DID_KEY: &str = "did_key";

/// `DocumentStore` persists peer `DID Documents` and maintains the reverse index
/// from verification key to owning `DID`
///
/// Storing is an upsert keyed by the owner `DID`. After every store the key index
/// for that `DID` is rebuilt from scratch, so a re-store never leaves stale
/// entries behind
pub struct DocumentStore<TStorage>
where
    TStorage: StorageBuilder,
{
    storage: TStorage,
}

impl<TStorage> DocumentStore<TStorage>
where
    TStorage: StorageBuilder,
{
    pub fn new(storage: TStorage) -> Self {
        Self { storage }
    }

    fn did_tags(did: &str) -> HashMap<String, String> {
        HashMap::from([("did".to_string(), did.to_string())])
    }

    /// Upsert a document by its owner `DID` and re-index every key the document
    /// owner controls
    pub async fn store(&self, doc: &DIDDocument) -> Result<(), StorageError> {
        let value = doc
            .to_json()
            .map_err(|err| StorageError::StorageFailure(err.to_string()))?;
        let tags = Self::did_tags(&doc.did);

        match self
            .storage
            .find_record(RECORD_TYPE_DID_DOC.to_string(), tags.clone())
            .await
        {
            Ok(record) => {
                self.storage
                    .update_record(record, value, tags.clone())
                    .await?
            }
            Err(StorageError::NotFound(_)) => {
                let record = StorageRecord::new(RECORD_TYPE_DID_DOC.to_string(), value, tags);
                self.storage.add_record(record).await?
            }
            Err(err) => return Err(err),
        }

        self.remove_keys_for_did(&doc.did).await?;
        for key in doc.owned_keys() {
            self.add_key_for_did(&doc.did, &key.value).await?;
        }

        Ok(())
    }

    /// Fetch a stored document, failing with `NotFound` when absent
    pub async fn fetch(&self, did: String) -> Result<DIDDocument, StorageError> {
        let record = self
            .storage
            .find_record(RECORD_TYPE_DID_DOC.to_string(), Self::did_tags(&did))
            .await?;

        DIDDocument::from_json(&record.value)
    }

    /// Find the `DID` a verification key was indexed under
    pub async fn find_did_for_key(&self, key: String) -> Result<String, StorageError> {
        let tags = HashMap::from([("key".to_string(), key.clone())]);
        let record = self
            .storage
            .find_record(RECORD_TYPE_DID_KEY.to_string(), tags)
            .await?;

        record
            .tags
            .get("did")
            .cloned()
            .ok_or(StorageError::NotFound(key))
    }

    async fn add_key_for_did(&self, did: &str, key: &str) -> Result<(), StorageError> {
        let tags = HashMap::from([
            ("did".to_string(), did.to_string()),
            ("key".to_string(), key.to_string()),
        ]);
        let record = StorageRecord::new(RECORD_TYPE_DID_KEY.to_string(), key.to_string(), tags);
        self.storage.add_record(record).await
    }

    async fn remove_keys_for_did(&self, did: &str) -> Result<(), StorageError> {
        self.storage
            .delete_all_records(RECORD_TYPE_DID_KEY.to_string(), Self::did_tags(did))
            .await
    }
}

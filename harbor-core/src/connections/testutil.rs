//! Shared mockall fakes for the trait contracts, used across the domain test
//! modules
use std::collections::HashMap;

use mockall::mock;

use rst_common::standard::async_trait::async_trait;
use rst_common::standard::serde_json::Value;

use crate::base::cache::{CacheBuilder, CacheError};
use crate::base::ledger::{LedgerBuilder, LedgerError};
use crate::base::responder::{ResponderBuilder, ResponderError};
use crate::base::storage::{StorageBuilder, StorageError, StorageRecord};
use crate::base::wallet::{DIDKey, WalletBuilder, WalletError};
use crate::mediation::record::MediationRecord;
use crate::mediation::types::{MediationError, MediationRepoBuilder, MediationState};

use super::messages::{ConnectionRequest, Invitation};
use super::record::ConnRecord;
use super::types::{ConnectionError, RepoBuilder, Role};

mock!(
    pub FakeRepo{}

    impl Clone for FakeRepo {
        fn clone(&self) -> Self;
    }

    #[async_trait]
    impl RepoBuilder for FakeRepo {
        type EntityAccessor = ConnRecord;

        async fn save(&self, connection: &ConnRecord, reason: String) -> Result<(), ConnectionError>;
        async fn retrieve_by_id(&self, connection_id: String) -> Result<ConnRecord, ConnectionError>;
        async fn retrieve_by_did(&self, their_did: String, my_did: Option<String>) -> Result<ConnRecord, ConnectionError>;
        async fn retrieve_by_invitation_key(&self, invitation_key: String, their_role: Role) -> Result<ConnRecord, ConnectionError>;
        async fn retrieve_by_request_id(&self, request_id: String) -> Result<ConnRecord, ConnectionError>;
        async fn query_by_inbound_connection(&self, inbound_connection_id: String) -> Result<Vec<ConnRecord>, ConnectionError>;
        async fn attach_invitation(&self, connection_id: String, invitation: &Invitation) -> Result<(), ConnectionError>;
        async fn retrieve_invitation(&self, connection_id: String) -> Result<Invitation, ConnectionError>;
        async fn attach_request(&self, connection_id: String, request: &ConnectionRequest) -> Result<(), ConnectionError>;
        async fn retrieve_request(&self, connection_id: String) -> Result<ConnectionRequest, ConnectionError>;
    }
);

mock!(
    pub FakeMediationRepo{}

    impl Clone for FakeMediationRepo {
        fn clone(&self) -> Self;
    }

    #[async_trait]
    impl MediationRepoBuilder for FakeMediationRepo {
        async fn save(&self, record: &MediationRecord, reason: String) -> Result<(), MediationError>;
        async fn retrieve_by_id(&self, mediation_id: String) -> Result<MediationRecord, MediationError>;
        async fn retrieve_by_connection_id(&self, connection_id: String) -> Result<MediationRecord, MediationError>;
        async fn query(&self, state: Option<MediationState>) -> Result<Vec<MediationRecord>, MediationError>;
    }
);

mock!(
    pub FakeWallet{}

    #[async_trait]
    impl WalletBuilder for FakeWallet {
        async fn create_local_did(&self, seed: Option<String>, did: Option<String>) -> Result<DIDKey, WalletError>;
        async fn get_local_did(&self, did: String) -> Result<DIDKey, WalletError>;
        async fn get_local_did_for_verkey(&self, verkey: String) -> Result<DIDKey, WalletError>;
        async fn get_public_did(&self) -> Result<Option<DIDKey>, WalletError>;
        async fn create_signing_key(&self) -> Result<String, WalletError>;
        async fn sign_message(&self, message: Vec<u8>, verkey: String) -> Result<Vec<u8>, WalletError>;
    }
);

mock!(
    pub FakeStorage{}

    #[async_trait]
    impl StorageBuilder for FakeStorage {
        async fn add_record(&self, record: StorageRecord) -> Result<(), StorageError>;
        async fn find_record(&self, record_type: String, tags: HashMap<String, String>) -> Result<StorageRecord, StorageError>;
        async fn update_record(&self, record: StorageRecord, value: String, tags: HashMap<String, String>) -> Result<(), StorageError>;
        async fn delete_all_records(&self, record_type: String, tags: HashMap<String, String>) -> Result<(), StorageError>;
    }
);

mock!(
    pub FakeLedger{}

    #[async_trait]
    impl LedgerBuilder for FakeLedger {
        async fn get_endpoint_for_did(&self, did: String) -> Result<Option<String>, LedgerError>;
        async fn get_key_for_did(&self, did: String) -> Result<Option<String>, LedgerError>;
    }
);

mock!(
    pub FakeCache{}

    #[async_trait]
    impl CacheBuilder for FakeCache {
        async fn acquire(&self, key: String) -> Result<Option<Value>, CacheError>;
        async fn set_result(&self, key: String, value: Value, ttl_secs: u64) -> Result<(), CacheError>;
        async fn release(&self, key: String) -> Result<(), CacheError>;
    }
);

mock!(
    pub FakeResponder{}

    #[async_trait]
    impl ResponderBuilder for FakeResponder {
        async fn send(&self, message: Value, connection_id: String) -> Result<(), ResponderError>;
        async fn send_reply(&self, message: Value, connection_id: Option<String>) -> Result<(), ResponderError>;
    }
);

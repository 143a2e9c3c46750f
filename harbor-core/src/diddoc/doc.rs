use rst_common::standard::serde::{self, Deserialize, Serialize};
use rst_common::standard::serde_json;

use rstdev_domain::entity::ToJSON;
use rstdev_domain::BaseError;

use crate::base::storage::StorageError;

pub const PUBLIC_KEY_TYPE_ED25519: &str = "Ed25519VerificationKey2018";
pub const SERVICE_TYPE_AGENT: &str = "IndyAgent";

/// `PublicKey` is a single verification key entry of a [`DIDDocument`]
///
/// The `controller` states which `DID` owns the key; `authentication` marks keys
/// the owner may authenticate with. Routing keys supplied by a mediator are
/// carried as non-authenticating entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct PublicKey {
    pub id: String,

    #[serde(rename = "type")]
    pub key_type: String,

    pub controller: String,

    #[serde(rename = "publicKeyBase58")]
    pub value: String,

    #[serde(default)]
    pub authentication: bool,
}

impl PublicKey {
    pub fn new(did: &str, ident: &str, value: &str, controller: &str, authentication: bool) -> Self {
        Self {
            id: format!("{}#{}", did, ident),
            key_type: PUBLIC_KEY_TYPE_ED25519.to_string(),
            controller: controller.to_string(),
            value: value.to_string(),
            authentication,
        }
    }
}

/// `Service` is a service block of a [`DIDDocument`]: where the owner can be
/// reached and through which recipient and routing keys, both order-preserving
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct Service {
    pub id: String,

    #[serde(rename = "type")]
    pub service_type: String,

    #[serde(rename = "recipientKeys", default)]
    pub recipient_keys: Vec<String>,

    #[serde(rename = "routingKeys", default)]
    pub routing_keys: Vec<String>,

    #[serde(rename = "serviceEndpoint")]
    pub endpoint: String,
}

impl Service {
    pub fn new(
        did: &str,
        ident: &str,
        recipient_keys: Vec<String>,
        routing_keys: Vec<String>,
        endpoint: &str,
    ) -> Self {
        Self {
            id: format!("{}#{}", did, ident),
            service_type: SERVICE_TYPE_AGENT.to_string(),
            recipient_keys,
            routing_keys,
            endpoint: endpoint.to_string(),
        }
    }
}

/// `DIDDocument` publishes a party's identity: its `DID`, verification keys and
/// service endpoints
///
/// A service's recipient and routing keys reference keys declared in the same
/// document or externally supplied literal keys; nothing outside the document is
/// required to interpret it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct DIDDocument {
    #[serde(rename = "id")]
    pub did: String,

    #[serde(rename = "publicKey", default)]
    pub public_key: Vec<PublicKey>,

    #[serde(default)]
    pub service: Vec<Service>,
}

impl DIDDocument {
    pub fn new(did: String) -> Self {
        Self {
            did,
            public_key: Vec::new(),
            service: Vec::new(),
        }
    }

    /// Insert or replace a key entry, keyed by its `id`
    pub fn set_public_key(&mut self, key: PublicKey) {
        if let Some(existing) = self.public_key.iter_mut().find(|pk| pk.id == key.id) {
            *existing = key;
            return;
        }
        self.public_key.push(key);
    }

    /// Insert or replace a service block, keyed by its `id`
    pub fn set_service(&mut self, service: Service) {
        if let Some(existing) = self.service.iter_mut().find(|svc| svc.id == service.id) {
            *existing = service;
            return;
        }
        self.service.push(service);
    }

    /// Keys controlled by the document owner itself
    pub fn owned_keys(&self) -> Vec<&PublicKey> {
        self.public_key
            .iter()
            .filter(|key| key.controller == self.did)
            .collect()
    }

    pub fn from_json(value: &str) -> Result<Self, StorageError> {
        serde_json::from_str(value).map_err(|err| StorageError::StorageFailure(err.to_string()))
    }
}

impl ToJSON for DIDDocument {
    fn to_json(&self) -> Result<String, BaseError> {
        serde_json::to_string(self).map_err(|err| BaseError::ToJSONError(err.to_string()))
    }
}

impl TryInto<Vec<u8>> for DIDDocument {
    type Error = StorageError;

    fn try_into(self) -> Result<Vec<u8>, Self::Error> {
        serde_json::to_vec(&self).map_err(|err| StorageError::StorageFailure(err.to_string()))
    }
}

impl TryFrom<Vec<u8>> for DIDDocument {
    type Error = StorageError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        serde_json::from_slice(&bytes).map_err(|err| StorageError::StorageFailure(err.to_string()))
    }
}

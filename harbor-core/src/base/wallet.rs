use rst_common::standard::async_trait::async_trait;
use rst_common::standard::serde::{self, Deserialize, Serialize};
use rst_common::with_errors::thiserror::{self, Error};

/// `WalletError` covers the key/`DID` store contract failures
///
/// `NotFound` is kept separate from the generic failure so callers can treat a
/// missing local `DID` as absence instead of a hard error
#[derive(Debug, PartialEq, Error, Clone)]
pub enum WalletError {
    #[error("wallet record not found: {0}")]
    NotFound(String),

    #[error("wallet error: {0}")]
    WalletFailure(String),
}

/// `DIDKey` describes a locally owned identity: its `DID`, the verification key
/// published for it and whether the `DID` is public (ledger-registered)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct DIDKey {
    pub did: String,
    pub verkey: String,
    pub public: bool,
}

impl DIDKey {
    pub fn new(did: String, verkey: String) -> Self {
        Self {
            did,
            verkey,
            public: false,
        }
    }
}

/// `WalletBuilder` is the contract of the key/`DID` store ("wallet")
///
/// The wallet owns all private key material. Domain code only ever sees `DID`
/// strings and verification keys; signing happens behind this boundary
#[async_trait]
pub trait WalletBuilder: Send + Sync {
    /// Create a new local `DID`, optionally derived from a seed or forced to a
    /// given `DID` value
    async fn create_local_did(
        &self,
        seed: Option<String>,
        did: Option<String>,
    ) -> Result<DIDKey, WalletError>;

    async fn get_local_did(&self, did: String) -> Result<DIDKey, WalletError>;

    async fn get_local_did_for_verkey(&self, verkey: String) -> Result<DIDKey, WalletError>;

    /// The public (ledger-registered) `DID` of this agent, if one exists
    async fn get_public_did(&self) -> Result<Option<DIDKey>, WalletError>;

    /// Create a standalone signing key and return its verification key
    async fn create_signing_key(&self) -> Result<String, WalletError>;

    /// Sign a message with the private key belonging to `verkey`
    async fn sign_message(&self, message: Vec<u8>, verkey: String) -> Result<Vec<u8>, WalletError>;
}

use rst_common::standard::async_trait::async_trait;
use rst_common::with_errors::thiserror::{self, Error};

/// `LedgerError` covers failures of the distributed-ledger read contract
#[derive(Debug, PartialEq, Error, Clone)]
pub enum LedgerError {
    #[error("ledger entry not found: {0}")]
    NotFound(String),

    #[error("ledger error: {0}")]
    LedgerFailure(String),
}

/// `LedgerBuilder` is the read-only contract against the distributed ledger,
/// consulted when an invitation references a public `DID` instead of carrying
/// inline keys and endpoint
///
/// The ledger client owns its own session lifecycle; both calls may be slow and
/// are suspension points for the surrounding operation
#[async_trait]
pub trait LedgerBuilder: Send + Sync {
    async fn get_endpoint_for_did(&self, did: String) -> Result<Option<String>, LedgerError>;

    async fn get_key_for_did(&self, did: String) -> Result<Option<String>, LedgerError>;
}

use rst_common::standard::async_trait::async_trait;
use rst_common::standard::serde::{self, Deserialize, Serialize};
use rst_common::with_errors::thiserror::{self, Error};

use super::record::MediationRecord;

/// `MediationError` is the base error type for the `Mediation` domain
#[derive(Debug, PartialEq, Error, Clone)]
pub enum MediationError {
    #[error("mediation record not found: {0}")]
    NotFound(String),

    #[error("mediation management error: {0}")]
    Management(String),

    #[error("entity error: {0}")]
    EntityError(String),

    #[error("storage error: {0}")]
    StorageFailure(String),

    #[error("unable to send message: {0}")]
    SendFailure(String),
}

/// `MediationState` tracks a mediation request's lifecycle on either side
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(crate = "self::serde", rename_all = "snake_case")]
pub enum MediationState {
    RequestReceived,
    Granted,
    Denied,
}

/// `MediationRole` states which side of the mediation this record holds:
/// [`MediationRole::Client`] when we asked a mediator to route for us,
/// [`MediationRole::Server`] when we route for someone else
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(crate = "self::serde", rename_all = "lowercase")]
pub enum MediationRole {
    Client,
    Server,
}

/// `MediationRepoBuilder` is the `Mediation Repository` abstraction
#[async_trait]
pub trait MediationRepoBuilder: Clone + Sync + Send {
    async fn save(
        &self,
        record: &MediationRecord,
        reason: String,
    ) -> Result<(), MediationError>;

    async fn retrieve_by_id(&self, mediation_id: String) -> Result<MediationRecord, MediationError>;

    async fn retrieve_by_connection_id(
        &self,
        connection_id: String,
    ) -> Result<MediationRecord, MediationError>;

    async fn query(
        &self,
        state: Option<MediationState>,
    ) -> Result<Vec<MediationRecord>, MediationError>;
}

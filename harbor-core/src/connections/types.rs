use std::fmt::Debug;

use rst_common::standard::async_trait::async_trait;
use rst_common::standard::chrono::{DateTime, Utc};
use rst_common::standard::serde::{self, Deserialize, Serialize};
use rst_common::with_errors::thiserror::{self, Error};

use rstdev_domain::entity::ToJSON;

use crate::base::cache::CacheError;
use crate::base::ledger::LedgerError;
use crate::base::responder::ResponderError;
use crate::base::storage::StorageError;
use crate::base::wallet::WalletError;
use crate::mediation::types::MediationError;

use super::messages::{ConnectionRequest, Invitation};
use super::record::ConnectionID;

/// `ProblemReportReason` enumerates the machine-readable codes a connection
/// problem report may carry back to the other party
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(crate = "self::serde", rename_all = "snake_case")]
pub enum ProblemReportReason {
    RequestNotAccepted,
    RequestProcessingError,
    ResponseNotAccepted,
    ResponseProcessingError,
}

impl ProblemReportReason {
    pub fn code(&self) -> &'static str {
        match self {
            ProblemReportReason::RequestNotAccepted => "request_not_accepted",
            ProblemReportReason::RequestProcessingError => "request_processing_error",
            ProblemReportReason::ResponseNotAccepted => "response_not_accepted",
            ProblemReportReason::ResponseProcessingError => "response_processing_error",
        }
    }
}

/// `ConnectionError` is the base error type for the `Connections` domain
///
/// `Management` failures may carry a [`ProblemReportReason`] when the failure
/// should be reported back to the other party rather than only logged locally
#[derive(Debug, PartialEq, Error, Clone)]
pub enum ConnectionError {
    #[error("connection record not found: {0}")]
    NotFound(String),

    #[error("connection management error: {message}")]
    Management {
        message: String,
        reason: Option<ProblemReportReason>,
    },

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("entity error: {0}")]
    EntityError(String),

    #[error("storage error: {0}")]
    StorageFailure(String),

    #[error("wallet error: {0}")]
    WalletFailure(String),

    #[error("ledger error: {0}")]
    LedgerFailure(String),

    #[error("cache error: {0}")]
    CacheFailure(String),

    #[error("unable to send message: {0}")]
    SendFailure(String),
}

impl ConnectionError {
    pub fn management(message: impl Into<String>) -> Self {
        ConnectionError::Management {
            message: message.into(),
            reason: None,
        }
    }

    pub fn management_with_reason(
        message: impl Into<String>,
        reason: ProblemReportReason,
    ) -> Self {
        ConnectionError::Management {
            message: message.into(),
            reason: Some(reason),
        }
    }
}

impl From<WalletError> for ConnectionError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::NotFound(val) => ConnectionError::NotFound(val),
            WalletError::WalletFailure(val) => ConnectionError::WalletFailure(val),
        }
    }
}

impl From<StorageError> for ConnectionError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(val) => ConnectionError::NotFound(val),
            StorageError::Duplicate(val) => ConnectionError::StorageFailure(val),
            StorageError::StorageFailure(val) => ConnectionError::StorageFailure(val),
        }
    }
}

impl From<LedgerError> for ConnectionError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(val) => ConnectionError::NotFound(val),
            LedgerError::LedgerFailure(val) => ConnectionError::LedgerFailure(val),
        }
    }
}

impl From<CacheError> for ConnectionError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::CacheFailure(val) => ConnectionError::CacheFailure(val),
        }
    }
}

impl From<ResponderError> for ConnectionError {
    fn from(err: ResponderError) -> Self {
        match err {
            ResponderError::SendFailure(val) => ConnectionError::SendFailure(val),
        }
    }
}

impl From<MediationError> for ConnectionError {
    fn from(err: MediationError) -> Self {
        match err {
            MediationError::NotFound(val) => ConnectionError::NotFound(val),
            MediationError::Management(val) => ConnectionError::management(val),
            MediationError::EntityError(val) => ConnectionError::EntityError(val),
            MediationError::StorageFailure(val) => ConnectionError::StorageFailure(val),
            MediationError::SendFailure(val) => ConnectionError::SendFailure(val),
        }
    }
}

/// `State` represents the connection protocol states between two peers
///
/// The exchange walks forward only: `Invitation -> Request -> Response ->
/// Completed`. A record created from a received request starts at
/// [`State::Request`] without ever holding [`State::Invitation`]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(crate = "self::serde", rename_all = "lowercase")]
pub enum State {
    Invitation,
    Request,
    Response,
    Completed,
}

impl State {
    pub(crate) fn rank(&self) -> u8 {
        match self {
            State::Invitation => 0,
            State::Request => 1,
            State::Response => 2,
            State::Completed => 3,
        }
    }
}

/// `Role` is the other party's role in the exchange, fixed at record creation
///
/// When we issued the invitation, the other party is the [`Role::Requester`];
/// when we received one, they are the [`Role::Responder`]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(crate = "self::serde", rename_all = "lowercase")]
pub enum Role {
    Requester,
    Responder,
}

/// `Accept` decides whether protocol steps advance automatically or wait for an
/// explicit operator action
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(crate = "self::serde", rename_all = "lowercase")]
pub enum Accept {
    Auto,
    Manual,
}

/// `InvitationMode` marks how the originating invitation may be consumed
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(crate = "self::serde", rename_all = "lowercase")]
pub enum InvitationMode {
    Once,
    Multi,
    Static,
}

/// `RoutingState` tracks inbound-route activation against a router connection
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(crate = "self::serde", rename_all = "lowercase")]
pub enum RoutingState {
    None,
    Request,
    Completed,
}

/// `ConnectionEntityAccessor` is a special trait used to access the main
/// connection record property fields
///
/// Fields stay private on the record itself; outside consumers read them
/// through this trait so they can never be mutated past the record's own
/// transition rules
pub trait ConnectionEntityAccessor:
    Clone + Debug + ToJSON + TryInto<Vec<u8>> + TryFrom<Vec<u8>> + Send + Sync
{
    fn get_connection_id(&self) -> ConnectionID;
    fn get_my_did(&self) -> Option<String>;
    fn get_their_did(&self) -> Option<String>;
    fn get_their_label(&self) -> Option<String>;
    fn get_their_role(&self) -> Role;
    fn get_state(&self) -> State;
    fn get_accept(&self) -> Accept;
    fn get_invitation_mode(&self) -> InvitationMode;
    fn get_invitation_key(&self) -> Option<String>;
    fn get_routing_state(&self) -> RoutingState;
    fn get_inbound_connection_id(&self) -> Option<String>;
    fn get_request_id(&self) -> Option<String>;
    fn get_alias(&self) -> Option<String>;
    fn get_created_at(&self) -> DateTime<Utc>;
    fn get_updated_at(&self) -> DateTime<Utc>;
}

/// `RepoBuilder` is the `Connection Repository` abstraction implementing the
/// repository pattern over connection records and their attached exchange
/// messages
///
/// `save` persists the record as-is. Two callers racing on the same record will
/// overwrite each other, last write wins; callers that cannot tolerate that
/// must serialize their own access
#[async_trait]
pub trait RepoBuilder: Clone + Sync + Send {
    type EntityAccessor: ConnectionEntityAccessor;

    async fn save(
        &self,
        connection: &Self::EntityAccessor,
        reason: String,
    ) -> Result<(), ConnectionError>;

    async fn retrieve_by_id(
        &self,
        connection_id: String,
    ) -> Result<Self::EntityAccessor, ConnectionError>;

    /// Lookup by the `DID` pair. `my_did` narrows the match when given
    async fn retrieve_by_did(
        &self,
        their_did: String,
        my_did: Option<String>,
    ) -> Result<Self::EntityAccessor, ConnectionError>;

    /// Lookup by the invitation verification key, scoped to the other party's
    /// role so requester-side and responder-side records never collide
    async fn retrieve_by_invitation_key(
        &self,
        invitation_key: String,
        their_role: Role,
    ) -> Result<Self::EntityAccessor, ConnectionError>;

    /// Lookup by the request thread identifier carried in a response
    async fn retrieve_by_request_id(
        &self,
        request_id: String,
    ) -> Result<Self::EntityAccessor, ConnectionError>;

    /// All records whose inbound route goes through the given router connection
    async fn query_by_inbound_connection(
        &self,
        inbound_connection_id: String,
    ) -> Result<Vec<Self::EntityAccessor>, ConnectionError>;

    async fn attach_invitation(
        &self,
        connection_id: String,
        invitation: &Invitation,
    ) -> Result<(), ConnectionError>;

    async fn retrieve_invitation(
        &self,
        connection_id: String,
    ) -> Result<Invitation, ConnectionError>;

    async fn attach_request(
        &self,
        connection_id: String,
        request: &ConnectionRequest,
    ) -> Result<(), ConnectionError>;

    async fn retrieve_request(
        &self,
        connection_id: String,
    ) -> Result<ConnectionRequest, ConnectionError>;
}

use derive_more::{AsRef, From, Into};
use the_newtype::Newtype;

use rst_common::standard::chrono::{DateTime, Utc};
use rst_common::standard::serde::{self, Deserialize, Serialize};
use rst_common::standard::serde_json;
use rst_common::standard::uuid::Uuid;

use rstdev_domain::entity::ToJSON;
use rstdev_domain::BaseError;

use super::types::{MediationError, MediationRole, MediationState};

/// Unique identifier for mediation records
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Newtype, From, Into, AsRef)]
#[serde(crate = "self::serde")]
pub struct MediationID(String);

impl MediationID {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_validated(id: String) -> Self {
        Self(id)
    }

    pub fn as_ref(&self) -> &str {
        &self.0
    }
}

/// `MediationRecord` is the durable state of one mediation relationship over a
/// connection: whether routing was requested, granted or denied, and the
/// routing keys and endpoint a grant carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct MediationRecord {
    mediation_id: MediationID,

    state: MediationState,

    role: MediationRole,

    /// The connection the mediation request traveled over
    connection_id: String,

    mediator_terms: Vec<String>,

    recipient_terms: Vec<String>,

    /// Keys granted by the mediator, empty until granted
    routing_keys: Vec<String>,

    /// Endpoint granted by the mediator, empty until granted
    endpoint: Option<String>,

    created_at: DateTime<Utc>,

    updated_at: DateTime<Utc>,
}

impl MediationRecord {
    pub fn new(
        role: MediationRole,
        connection_id: String,
        mediator_terms: Vec<String>,
        recipient_terms: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            mediation_id: MediationID::generate(),
            state: MediationState::RequestReceived,
            role,
            connection_id,
            mediator_terms,
            recipient_terms,
            routing_keys: Vec::new(),
            endpoint: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the mediation granted, recording the routing keys and endpoint the
    /// grant carries
    pub fn grant(&mut self, routing_keys: Vec<String>, endpoint: String) {
        self.state = MediationState::Granted;
        self.routing_keys = routing_keys;
        self.endpoint = Some(endpoint);
        self.updated_at = Utc::now();
    }

    pub fn deny(&mut self) {
        self.state = MediationState::Denied;
        self.updated_at = Utc::now();
    }

    pub fn is_granted(&self) -> bool {
        self.state == MediationState::Granted
    }

    pub fn get_mediation_id(&self) -> MediationID {
        self.mediation_id.to_owned()
    }

    pub fn get_state(&self) -> MediationState {
        self.state
    }

    pub fn get_role(&self) -> MediationRole {
        self.role
    }

    pub fn get_connection_id(&self) -> String {
        self.connection_id.to_owned()
    }

    pub fn get_mediator_terms(&self) -> Vec<String> {
        self.mediator_terms.to_owned()
    }

    pub fn get_recipient_terms(&self) -> Vec<String> {
        self.recipient_terms.to_owned()
    }

    pub fn get_routing_keys(&self) -> Vec<String> {
        self.routing_keys.to_owned()
    }

    pub fn get_endpoint(&self) -> Option<String> {
        self.endpoint.to_owned()
    }

    pub fn get_created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn get_updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl ToJSON for MediationRecord {
    fn to_json(&self) -> Result<String, BaseError> {
        serde_json::to_string(self).map_err(|err| BaseError::ToJSONError(err.to_string()))
    }
}

impl TryInto<Vec<u8>> for MediationRecord {
    type Error = MediationError;

    fn try_into(self) -> Result<Vec<u8>, Self::Error> {
        serde_json::to_vec(&self).map_err(|err| MediationError::EntityError(err.to_string()))
    }
}

impl TryFrom<Vec<u8>> for MediationRecord {
    type Error = MediationError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        serde_json::from_slice(&bytes).map_err(|err| MediationError::EntityError(err.to_string()))
    }
}

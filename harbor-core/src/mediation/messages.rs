use rst_common::standard::serde::{self, Deserialize, Serialize};
use rst_common::standard::serde_json;
use rst_common::standard::uuid::Uuid;

use rstdev_domain::entity::ToJSON;
use rstdev_domain::BaseError;

/// `KeylistUpdateAction` is the operation a [`KeylistUpdateRule`] applies
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde", rename_all = "lowercase")]
pub enum KeylistUpdateAction {
    Add,
    Remove,
}

/// One key the mediator should start or stop routing for us
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct KeylistUpdateRule {
    pub recipient_key: String,
    pub action: KeylistUpdateAction,
}

impl KeylistUpdateRule {
    pub fn add(recipient_key: String) -> Self {
        Self {
            recipient_key,
            action: KeylistUpdateAction::Add,
        }
    }

    pub fn remove(recipient_key: String) -> Self {
        Self {
            recipient_key,
            action: KeylistUpdateAction::Remove,
        }
    }
}

/// `KeylistUpdate` asks the mediator to change the set of keys it routes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct KeylistUpdate {
    #[serde(rename = "@id")]
    id: String,

    updates: Vec<KeylistUpdateRule>,
}

impl KeylistUpdate {
    pub fn new(updates: Vec<KeylistUpdateRule>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            updates,
        }
    }

    pub fn get_id(&self) -> &String {
        &self.id
    }

    pub fn get_updates(&self) -> &Vec<KeylistUpdateRule> {
        &self.updates
    }
}

/// `MediationRequest` asks the other party to mediate our inbound traffic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct MediationRequest {
    #[serde(rename = "@id")]
    id: String,

    #[serde(default)]
    mediator_terms: Vec<String>,

    #[serde(default)]
    recipient_terms: Vec<String>,
}

impl MediationRequest {
    pub fn new(mediator_terms: Vec<String>, recipient_terms: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            mediator_terms,
            recipient_terms,
        }
    }

    pub fn get_id(&self) -> &String {
        &self.id
    }

    pub fn get_mediator_terms(&self) -> Vec<String> {
        self.mediator_terms.to_owned()
    }

    pub fn get_recipient_terms(&self) -> Vec<String> {
        self.recipient_terms.to_owned()
    }
}

/// `MediationGrant` accepts a mediation request, carrying the endpoint and
/// routing keys the recipient must advertise from now on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct MediationGrant {
    #[serde(rename = "@id")]
    id: String,

    endpoint: String,

    routing_keys: Vec<String>,
}

impl MediationGrant {
    pub fn new(endpoint: String, routing_keys: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            endpoint,
            routing_keys,
        }
    }

    pub fn get_endpoint(&self) -> String {
        self.endpoint.to_owned()
    }

    pub fn get_routing_keys(&self) -> Vec<String> {
        self.routing_keys.to_owned()
    }
}

/// `MediationDeny` rejects a mediation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct MediationDeny {
    #[serde(rename = "@id")]
    id: String,

    #[serde(default)]
    mediator_terms: Vec<String>,

    #[serde(default)]
    recipient_terms: Vec<String>,
}

impl MediationDeny {
    pub fn new(mediator_terms: Vec<String>, recipient_terms: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            mediator_terms,
            recipient_terms,
        }
    }
}

impl ToJSON for KeylistUpdate {
    fn to_json(&self) -> Result<String, BaseError> {
        serde_json::to_string(self).map_err(|err| BaseError::ToJSONError(err.to_string()))
    }
}

impl ToJSON for MediationRequest {
    fn to_json(&self) -> Result<String, BaseError> {
        serde_json::to_string(self).map_err(|err| BaseError::ToJSONError(err.to_string()))
    }
}

impl ToJSON for MediationGrant {
    fn to_json(&self) -> Result<String, BaseError> {
        serde_json::to_string(self).map_err(|err| BaseError::ToJSONError(err.to_string()))
    }
}

impl ToJSON for MediationDeny {
    fn to_json(&self) -> Result<String, BaseError> {
        serde_json::to_string(self).map_err(|err| BaseError::ToJSONError(err.to_string()))
    }
}

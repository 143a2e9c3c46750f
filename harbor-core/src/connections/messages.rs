use rst_common::standard::serde::{self, Deserialize, Serialize};
use rst_common::standard::serde_json;
use rst_common::standard::uuid::Uuid;

use rstdev_domain::entity::ToJSON;
use rstdev_domain::BaseError;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::diddoc::doc::DIDDocument;

use super::types::{ConnectionError, ProblemReportReason};

/// `InvitationKind` is the payload variant of an [`Invitation`]
///
/// A public invitation carries only a ledger-resolvable `DID`; a peer
/// invitation carries the keys and endpoint inline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde", untagged)]
pub enum InvitationKind {
    Did {
        did: String,
    },
    Inline {
        #[serde(rename = "recipientKeys")]
        recipient_keys: Vec<String>,

        #[serde(rename = "serviceEndpoint")]
        endpoint: String,

        #[serde(rename = "routingKeys", default)]
        routing_keys: Vec<String>,
    },
}

/// `Invitation` is the out-of-band message that opens the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct Invitation {
    #[serde(rename = "@id")]
    id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<String>,

    #[serde(flatten)]
    kind: InvitationKind,
}

impl Invitation {
    pub fn new_public(label: Option<String>, did: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            label,
            kind: InvitationKind::Did { did },
        }
    }

    pub fn new_inline(
        label: Option<String>,
        recipient_keys: Vec<String>,
        endpoint: String,
        routing_keys: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            label,
            kind: InvitationKind::Inline {
                recipient_keys,
                endpoint,
                routing_keys,
            },
        }
    }

    pub fn get_id(&self) -> &String {
        &self.id
    }

    pub fn get_label(&self) -> Option<String> {
        self.label.to_owned()
    }

    pub fn get_kind(&self) -> &InvitationKind {
        &self.kind
    }

    /// The `DID` of a public invitation, `None` for inline invitations
    pub fn get_did(&self) -> Option<String> {
        match &self.kind {
            InvitationKind::Did { did } => Some(did.to_owned()),
            InvitationKind::Inline { .. } => None,
        }
    }

    /// First recipient key of an inline invitation
    pub fn get_invitation_key(&self) -> Option<String> {
        match &self.kind {
            InvitationKind::Did { .. } => None,
            InvitationKind::Inline { recipient_keys, .. } => recipient_keys.first().cloned(),
        }
    }
}

/// `ConnectionDetail` couples a party's `DID` with the document describing it,
/// carried inside requests and responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct ConnectionDetail {
    #[serde(rename = "DID")]
    pub did: String,

    #[serde(rename = "DIDDoc")]
    pub did_doc: DIDDocument,
}

impl ConnectionDetail {
    pub fn new(did: String, did_doc: DIDDocument) -> Self {
        Self { did, did_doc }
    }
}

/// `ConnectionRequest` answers an invitation with the requester's own identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct ConnectionRequest {
    #[serde(rename = "@id")]
    id: String,

    label: String,

    connection: ConnectionDetail,
}

impl ConnectionRequest {
    pub fn new(label: String, connection: ConnectionDetail) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            label,
            connection,
        }
    }

    pub fn get_id(&self) -> &String {
        &self.id
    }

    pub fn get_label(&self) -> &String {
        &self.label
    }

    pub fn get_connection(&self) -> &ConnectionDetail {
        &self.connection
    }
}

/// `Thread` references the originating message a reply correlates with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct Thread {
    #[serde(rename = "thid")]
    pub thread_id: String,
}

/// `ConnectionSignature` attests a [`ConnectionDetail`] with the invitation key
///
/// The signed payload is an 8-byte big-endian unix timestamp followed by the
/// canonical JSON of the detail, so a captured response cannot be replayed with
/// an older detail under the same timestamp prefix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct ConnectionSignature {
    pub signer: String,

    /// Base64 over the raw signature bytes
    pub signature: String,

    #[serde(rename = "sigData")]
    pub sig_data: String,
}

impl ConnectionSignature {
    pub fn new(signer: String, signature: Vec<u8>, sig_data: Vec<u8>) -> Self {
        Self {
            signer,
            signature: BASE64.encode(signature),
            sig_data: BASE64.encode(sig_data),
        }
    }
}

/// Build the byte payload signed over a connection detail: timestamp prefix
/// plus the detail serialized as JSON
pub fn signable_payload(
    detail: &ConnectionDetail,
    timestamp: u64,
) -> Result<Vec<u8>, ConnectionError> {
    let mut payload = timestamp.to_be_bytes().to_vec();
    let detail_json =
        serde_json::to_vec(detail).map_err(|err| ConnectionError::EntityError(err.to_string()))?;
    payload.extend_from_slice(&detail_json);
    Ok(payload)
}

/// `ConnectionResponse` completes the responder's half of the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct ConnectionResponse {
    #[serde(rename = "@id")]
    id: String,

    #[serde(rename = "~thread", skip_serializing_if = "Option::is_none")]
    thread: Option<Thread>,

    connection: ConnectionDetail,

    #[serde(rename = "connection~sig", skip_serializing_if = "Option::is_none")]
    signature: Option<ConnectionSignature>,
}

impl ConnectionResponse {
    pub fn new(connection: ConnectionDetail) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            thread: None,
            connection,
            signature: None,
        }
    }

    /// Correlate this response with the request it answers
    pub fn assign_thread_from(&mut self, request: &ConnectionRequest) {
        self.thread = Some(Thread {
            thread_id: request.get_id().to_owned(),
        });
    }

    pub fn assign_thread_id(&mut self, thread_id: String) {
        self.thread = Some(Thread { thread_id });
    }

    pub fn set_signature(&mut self, signature: ConnectionSignature) {
        self.signature = Some(signature);
    }

    pub fn get_id(&self) -> &String {
        &self.id
    }

    pub fn get_thread_id(&self) -> Option<String> {
        self.thread.as_ref().map(|thread| thread.thread_id.to_owned())
    }

    pub fn get_connection(&self) -> &ConnectionDetail {
        &self.connection
    }

    pub fn get_signature(&self) -> Option<&ConnectionSignature> {
        self.signature.as_ref()
    }
}

/// `ProblemReport` tells the other party why their message was rejected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct ProblemReport {
    #[serde(rename = "@id")]
    id: String,

    #[serde(rename = "problem-code")]
    problem_code: String,

    explain: String,
}

impl ProblemReport {
    pub fn new(reason: &ProblemReportReason, explain: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            problem_code: reason.code().to_string(),
            explain,
        }
    }

    pub fn get_problem_code(&self) -> &String {
        &self.problem_code
    }

    pub fn get_explain(&self) -> &String {
        &self.explain
    }
}

impl ToJSON for Invitation {
    fn to_json(&self) -> Result<String, BaseError> {
        serde_json::to_string(self).map_err(|err| BaseError::ToJSONError(err.to_string()))
    }
}

impl ToJSON for ConnectionRequest {
    fn to_json(&self) -> Result<String, BaseError> {
        serde_json::to_string(self).map_err(|err| BaseError::ToJSONError(err.to_string()))
    }
}

impl ToJSON for ConnectionResponse {
    fn to_json(&self) -> Result<String, BaseError> {
        serde_json::to_string(self).map_err(|err| BaseError::ToJSONError(err.to_string()))
    }
}

impl ToJSON for ProblemReport {
    fn to_json(&self) -> Result<String, BaseError> {
        serde_json::to_string(self).map_err(|err| BaseError::ToJSONError(err.to_string()))
    }
}

use derive_more::{AsRef, From, Into};
use the_newtype::Newtype;

use rst_common::standard::chrono::{DateTime, Utc};
use rst_common::standard::serde::{self, Deserialize, Serialize};
use rst_common::standard::serde_json;
use rst_common::standard::uuid::Uuid;

use rstdev_domain::entity::ToJSON;
use rstdev_domain::BaseError;

use super::types::{
    Accept, ConnectionEntityAccessor, ConnectionError, InvitationMode, Role, RoutingState, State,
};

/// Unique identifier for connection records
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Newtype, From, Into, AsRef)]
#[serde(crate = "self::serde")]
pub struct ConnectionID(String);

impl ConnectionID {
    /// Generate a new unique connection ID
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

/// `ConnRecord` is the durable state of one pairwise connection
///
/// A record is created either when we issue an invitation, when we receive one,
/// or directly at [`State::Request`] for connections established from a bare
/// incoming request against our public `DID`. From then on it only walks
/// forward through the protocol states, see [`ConnRecord::transition`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct ConnRecord {
    connection_id: ConnectionID,

    /// Our `DID` for this pairwise relation, absent until a local `DID` has
    /// been created for it
    my_did: Option<String>,

    /// The other party's `DID`, absent until their request or response arrived
    their_did: Option<String>,

    their_label: Option<String>,

    their_role: Role,

    state: State,

    accept: Accept,

    invitation_mode: InvitationMode,

    /// The verification key the originating invitation was issued under; the
    /// response to a request must be signed with this key
    invitation_key: Option<String>,

    routing_state: RoutingState,

    /// Router connection our inbound traffic is (being) routed through
    inbound_connection_id: Option<String>,

    /// Thread id of the connection request, correlates the response
    request_id: Option<String>,

    /// Local, never-transmitted operator label
    alias: Option<String>,

    created_at: DateTime<Utc>,

    updated_at: DateTime<Utc>,
}

impl ConnRecord {
    pub fn builder() -> ConnRecordBuilder {
        ConnRecordBuilder::new()
    }

    /// Move the record forward to `state`
    ///
    /// Transitions only ever walk forward. Re-entering the current state is
    /// accepted so retried handlers stay idempotent; walking backward is an
    /// error
    pub fn transition(&mut self, state: State) -> Result<(), ConnectionError> {
        if state.rank() < self.state.rank() {
            return Err(ConnectionError::management(format!(
                "invalid state transition: {:?} to {:?}",
                self.state, state
            )));
        }

        self.state = state;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn set_my_did(&mut self, did: String) {
        self.my_did = Some(did);
        self.updated_at = Utc::now();
    }

    pub fn set_their_did(&mut self, did: String) {
        self.their_did = Some(did);
        self.updated_at = Utc::now();
    }

    pub fn set_their_label(&mut self, label: String) {
        self.their_label = Some(label);
        self.updated_at = Utc::now();
    }

    pub fn set_request_id(&mut self, request_id: String) {
        self.request_id = Some(request_id);
        self.updated_at = Utc::now();
    }

    pub fn set_alias(&mut self, alias: String) {
        self.alias = Some(alias);
        self.updated_at = Utc::now();
    }

    pub fn set_routing_state(&mut self, routing_state: RoutingState) {
        self.routing_state = routing_state;
        self.updated_at = Utc::now();
    }

    pub fn set_inbound_connection_id(&mut self, inbound_connection_id: String) {
        self.inbound_connection_id = Some(inbound_connection_id);
        self.updated_at = Utc::now();
    }

    /// A multi-use invitation record stays at [`State::Invitation`] and spawns
    /// a fresh record for every request it receives
    pub fn is_multiuse_invitation(&self) -> bool {
        self.invitation_mode == InvitationMode::Multi
    }

    /// Ready for traffic: the exchange reached [`State::Response`] or
    /// [`State::Completed`]
    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Response | State::Completed)
    }
}

impl ConnectionEntityAccessor for ConnRecord {
    fn get_connection_id(&self) -> ConnectionID {
        self.connection_id.to_owned()
    }

    fn get_my_did(&self) -> Option<String> {
        self.my_did.to_owned()
    }

    fn get_their_did(&self) -> Option<String> {
        self.their_did.to_owned()
    }

    fn get_their_label(&self) -> Option<String> {
        self.their_label.to_owned()
    }

    fn get_their_role(&self) -> Role {
        self.their_role
    }

    fn get_state(&self) -> State {
        self.state
    }

    fn get_accept(&self) -> Accept {
        self.accept
    }

    fn get_invitation_mode(&self) -> InvitationMode {
        self.invitation_mode
    }

    fn get_invitation_key(&self) -> Option<String> {
        self.invitation_key.to_owned()
    }

    fn get_routing_state(&self) -> RoutingState {
        self.routing_state
    }

    fn get_inbound_connection_id(&self) -> Option<String> {
        self.inbound_connection_id.to_owned()
    }

    fn get_request_id(&self) -> Option<String> {
        self.request_id.to_owned()
    }

    fn get_alias(&self) -> Option<String> {
        self.alias.to_owned()
    }

    fn get_created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn get_updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl ToJSON for ConnRecord {
    fn to_json(&self) -> Result<String, BaseError> {
        serde_json::to_string(self).map_err(|err| BaseError::ToJSONError(err.to_string()))
    }
}

impl TryInto<Vec<u8>> for ConnRecord {
    type Error = ConnectionError;

    fn try_into(self) -> Result<Vec<u8>, Self::Error> {
        serde_json::to_vec(&self).map_err(|err| ConnectionError::EntityError(err.to_string()))
    }
}

impl TryFrom<Vec<u8>> for ConnRecord {
    type Error = ConnectionError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        serde_json::from_slice(&bytes).map_err(|err| ConnectionError::EntityError(err.to_string()))
    }
}

/// Fluent builder for [`ConnRecord`]
///
/// `their_role` and the initial `state` have no sensible defaults and must be
/// given explicitly; everything else defaults to the common case
pub struct ConnRecordBuilder {
    their_role: Option<Role>,
    state: Option<State>,
    accept: Accept,
    invitation_mode: InvitationMode,
    my_did: Option<String>,
    their_did: Option<String>,
    their_label: Option<String>,
    invitation_key: Option<String>,
    inbound_connection_id: Option<String>,
    request_id: Option<String>,
    alias: Option<String>,
}

impl ConnRecordBuilder {
    pub fn new() -> Self {
        Self {
            their_role: None,
            state: None,
            accept: Accept::Manual,
            invitation_mode: InvitationMode::Once,
            my_did: None,
            their_did: None,
            their_label: None,
            invitation_key: None,
            inbound_connection_id: None,
            request_id: None,
            alias: None,
        }
    }

    pub fn with_their_role(mut self, their_role: Role) -> Self {
        self.their_role = Some(their_role);
        self
    }

    pub fn with_state(mut self, state: State) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_accept(mut self, accept: Accept) -> Self {
        self.accept = accept;
        self
    }

    pub fn with_invitation_mode(mut self, invitation_mode: InvitationMode) -> Self {
        self.invitation_mode = invitation_mode;
        self
    }

    pub fn with_my_did(mut self, my_did: String) -> Self {
        self.my_did = Some(my_did);
        self
    }

    pub fn with_their_did(mut self, their_did: String) -> Self {
        self.their_did = Some(their_did);
        self
    }

    pub fn with_their_label(mut self, their_label: String) -> Self {
        self.their_label = Some(their_label);
        self
    }

    pub fn with_invitation_key(mut self, invitation_key: String) -> Self {
        self.invitation_key = Some(invitation_key);
        self
    }

    pub fn with_inbound_connection_id(mut self, inbound_connection_id: String) -> Self {
        self.inbound_connection_id = Some(inbound_connection_id);
        self
    }

    pub fn with_request_id(mut self, request_id: String) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn with_alias(mut self, alias: String) -> Self {
        self.alias = Some(alias);
        self
    }

    pub fn build(self) -> Result<ConnRecord, ConnectionError> {
        let their_role = self
            .their_role
            .ok_or(ConnectionError::EntityError("missing their_role".to_string()))?;
        let state = self
            .state
            .ok_or(ConnectionError::EntityError("missing state".to_string()))?;

        let now = Utc::now();
        Ok(ConnRecord {
            connection_id: ConnectionID::generate(),
            my_did: self.my_did,
            their_did: self.their_did,
            their_label: self.their_label,
            their_role,
            state,
            accept: self.accept,
            invitation_mode: self.invitation_mode,
            invitation_key: self.invitation_key,
            routing_state: RoutingState::None,
            inbound_connection_id: self.inbound_connection_id,
            request_id: self.request_id,
            alias: self.alias,
            created_at: now,
            updated_at: now,
        })
    }
}

impl Default for ConnRecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use table_test::table_test;

    fn build_record(state: State) -> ConnRecord {
        ConnRecord::builder()
            .with_their_role(Role::Requester)
            .with_state(state)
            .with_invitation_key("CnEDk9HrMnmiHXEV1WFgbVCRteYnPqsJwrTdcZaNhFVW".to_string())
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_missing_required_fields() {
        let record = ConnRecord::builder()
            .with_their_role(Role::Requester)
            .build();
        assert!(matches!(
            record.unwrap_err(),
            ConnectionError::EntityError(_)
        ))
    }

    #[test]
    fn test_transition_table() {
        let table = vec![
            ((State::Invitation, State::Request), true),
            ((State::Invitation, State::Completed), true),
            ((State::Request, State::Request), true),
            ((State::Request, State::Response), true),
            ((State::Response, State::Completed), true),
            ((State::Response, State::Request), false),
            ((State::Completed, State::Invitation), false),
        ];

        for (validator, (from, to), expected) in table_test!(table) {
            let mut record = build_record(from);
            let out = record.transition(to);

            validator
                .given(&format!("{:?} -> {:?}", from, to))
                .when("transition")
                .then(&format!("allowed should be: {}", expected))
                .assert_eq(expected, out.is_ok());
        }
    }

    #[test]
    fn test_transition_updates_timestamp() {
        let mut record = build_record(State::Invitation);
        let before = record.get_updated_at();

        record.transition(State::Request).unwrap();
        assert_eq!(record.get_state(), State::Request);
        assert!(record.get_updated_at() >= before)
    }

    #[test]
    fn test_readiness_predicates() {
        let record = build_record(State::Invitation);
        assert!(!record.is_ready());

        let mut record = build_record(State::Request);
        record.transition(State::Response).unwrap();
        assert!(record.is_ready());

        let multi = ConnRecord::builder()
            .with_their_role(Role::Requester)
            .with_state(State::Invitation)
            .with_invitation_mode(InvitationMode::Multi)
            .build()
            .unwrap();
        assert!(multi.is_multiuse_invitation())
    }

    #[test]
    fn test_json_round_trip() {
        let record = build_record(State::Request);
        let json = record.to_json();
        assert!(!json.is_err());

        let parsed: ConnRecord = serde_json::from_str(json.unwrap().as_str()).unwrap();
        assert_eq!(parsed, record)
    }

    #[test]
    fn test_bytes_round_trip() {
        let record = build_record(State::Completed);
        let bytes: Vec<u8> = record.clone().try_into().unwrap();

        let parsed = ConnRecord::try_from(bytes);
        assert!(!parsed.is_err());
        assert_eq!(parsed.unwrap(), record)
    }
}

use rst_common::standard::serde_json;
use rst_common::with_logging::log::debug;

use rstdev_domain::entity::ToJSON;

use crate::base::responder::{ResponderBuilder, ResponderError};
use crate::base::wallet::WalletBuilder;
use crate::connections::record::ConnRecord;
use crate::connections::types::{
    ConnectionEntityAccessor, ConnectionError, RepoBuilder, RoutingState,
};

use super::messages::{
    KeylistUpdate, KeylistUpdateRule, MediationDeny, MediationGrant, MediationRequest,
};
use super::record::MediationRecord;
use super::types::{MediationError, MediationRepoBuilder, MediationRole, MediationState};

impl From<ResponderError> for MediationError {
    fn from(err: ResponderError) -> Self {
        match err {
            ResponderError::SendFailure(val) => MediationError::SendFailure(val),
        }
    }
}

/// `RouteCoordinator` manages routing indirection: activating an inbound route
/// through an already-established router connection, and the mediation
/// request/grant/deny exchange on both the client and the server side
pub struct RouteCoordinator<TRepo, TMedRepo, TWallet, TResponder>
where
    TRepo: RepoBuilder<EntityAccessor = ConnRecord>,
    TMedRepo: MediationRepoBuilder,
    TWallet: WalletBuilder,
    TResponder: ResponderBuilder,
{
    repo: TRepo,
    mediation_repo: TMedRepo,
    wallet: TWallet,
    responder: Option<TResponder>,
}

impl<TRepo, TMedRepo, TWallet, TResponder> RouteCoordinator<TRepo, TMedRepo, TWallet, TResponder>
where
    TRepo: RepoBuilder<EntityAccessor = ConnRecord>,
    TMedRepo: MediationRepoBuilder,
    TWallet: WalletBuilder,
    TResponder: ResponderBuilder,
{
    pub fn new(repo: TRepo, mediation_repo: TMedRepo, wallet: TWallet) -> Self {
        Self {
            repo,
            mediation_repo,
            wallet,
            responder: None,
        }
    }

    pub fn with_responder(mut self, responder: TResponder) -> Self {
        self.responder = Some(responder);
        self
    }

    fn responder(&self) -> Result<&TResponder, MediationError> {
        self.responder
            .as_ref()
            .ok_or(MediationError::Management("no responder configured".to_string()))
    }

    /// Route our inbound traffic for `record` through the router connection
    /// behind `inbound_connection_id`
    ///
    /// The router connection must already be ready. The routing state moves to
    /// [`RoutingState::Request`] until the router confirms, see
    /// [`RouteCoordinator::update_inbound`]
    pub async fn establish_inbound(
        &self,
        record: &mut ConnRecord,
        inbound_connection_id: String,
    ) -> Result<RoutingState, ConnectionError> {
        // a record created from a received invitation may not carry a DID yet
        let my_info = match record.get_my_did() {
            Some(did) => self.wallet.get_local_did(did).await?,
            None => {
                let my_info = self.wallet.create_local_did(None, None).await?;
                record.set_my_did(my_info.did.to_owned());
                my_info
            }
        };

        let router = self
            .repo
            .retrieve_by_id(inbound_connection_id.to_owned())
            .await
            .map_err(|err| match err {
                ConnectionError::NotFound(_) => {
                    ConnectionError::management("routing connection not found")
                }
                other => other,
            })?;
        if !router.is_ready() {
            return Err(ConnectionError::management(
                "routing connection is not ready",
            ));
        }

        let update = KeylistUpdate::new(vec![KeylistUpdateRule::add(my_info.verkey)]);
        let payload = update
            .to_json()
            .map_err(|err| ConnectionError::EntityError(err.to_string()))?;
        let message = serde_json::from_str(&payload)
            .map_err(|err| ConnectionError::EntityError(err.to_string()))?;

        let responder = self
            .responder
            .as_ref()
            .ok_or(ConnectionError::ConfigError("no responder configured".to_string()))?;
        responder
            .send(message, inbound_connection_id.to_owned())
            .await
            .map_err(ConnectionError::from)?;

        record.set_inbound_connection_id(inbound_connection_id);
        record.set_routing_state(RoutingState::Request);
        self.repo
            .save(record, "Sent inbound route request".to_string())
            .await?;

        Ok(record.get_routing_state())
    }

    /// Apply a router's route confirmation to every connection routed through
    /// it whose local verification key matches `recipient_verkey`
    pub async fn update_inbound(
        &self,
        inbound_connection_id: String,
        recipient_verkey: String,
        routing_state: RoutingState,
    ) -> Result<Vec<ConnRecord>, ConnectionError> {
        let records = self
            .repo
            .query_by_inbound_connection(inbound_connection_id)
            .await?;

        let mut updated = Vec::new();
        for mut record in records {
            let my_did = match record.get_my_did() {
                Some(did) => did,
                None => continue,
            };
            let my_info = self.wallet.get_local_did(my_did).await?;
            if my_info.verkey != recipient_verkey {
                continue;
            }

            record.set_routing_state(routing_state);
            self.repo
                .save(&record, "Updated inbound route state".to_string())
                .await?;
            updated.push(record);
        }

        debug!("updated inbound routing state on {} records", updated.len());
        Ok(updated)
    }

    /// Ask the other party of `connection` to mediate our inbound traffic
    pub async fn request_mediation(
        &self,
        connection: &ConnRecord,
        mediator_terms: Vec<String>,
        recipient_terms: Vec<String>,
    ) -> Result<(MediationRecord, MediationRequest), MediationError> {
        if !connection.is_ready() {
            return Err(MediationError::Management(
                "mediation requires a ready connection".to_string(),
            ));
        }

        let connection_id: String = connection.get_connection_id().into();
        let record = MediationRecord::new(
            MediationRole::Client,
            connection_id.to_owned(),
            mediator_terms.to_owned(),
            recipient_terms.to_owned(),
        );
        self.mediation_repo
            .save(&record, "Created mediation request".to_string())
            .await?;

        let request = MediationRequest::new(mediator_terms, recipient_terms);
        let message = to_message(&request)?;
        self.responder()?.send(message, connection_id).await?;

        Ok((record, request))
    }

    /// Record a mediation request received over `connection`; granting or
    /// denying it is a separate, explicit step
    pub async fn receive_mediation_request(
        &self,
        connection: &ConnRecord,
        request: &MediationRequest,
    ) -> Result<MediationRecord, MediationError> {
        if !connection.is_ready() {
            return Err(MediationError::Management(
                "mediation requires a ready connection".to_string(),
            ));
        }

        let record = MediationRecord::new(
            MediationRole::Server,
            connection.get_connection_id().into(),
            request.get_mediator_terms(),
            request.get_recipient_terms(),
        );
        self.mediation_repo
            .save(&record, "Received mediation request".to_string())
            .await?;

        Ok(record)
    }

    /// Grant a previously received mediation request and notify the recipient
    pub async fn grant_request(
        &self,
        mediation_id: String,
        endpoint: String,
        routing_keys: Vec<String>,
    ) -> Result<(MediationRecord, MediationGrant), MediationError> {
        let mut record = self.retrieve_pending(mediation_id, MediationRole::Server).await?;

        record.grant(routing_keys.to_owned(), endpoint.to_owned());
        self.mediation_repo
            .save(&record, "Granted mediation request".to_string())
            .await?;

        let grant = MediationGrant::new(endpoint, routing_keys);
        let message = to_message(&grant)?;
        self.responder()?
            .send(message, record.get_connection_id())
            .await?;

        Ok((record, grant))
    }

    /// Deny a previously received mediation request and notify the recipient
    pub async fn deny_request(
        &self,
        mediation_id: String,
    ) -> Result<(MediationRecord, MediationDeny), MediationError> {
        let mut record = self.retrieve_pending(mediation_id, MediationRole::Server).await?;

        record.deny();
        self.mediation_repo
            .save(&record, "Denied mediation request".to_string())
            .await?;

        let deny = MediationDeny::new(record.get_mediator_terms(), record.get_recipient_terms());
        let message = to_message(&deny)?;
        self.responder()?
            .send(message, record.get_connection_id())
            .await?;

        Ok((record, deny))
    }

    /// Apply a mediation grant received over `connection` to our pending
    /// client-side record
    pub async fn receive_grant(
        &self,
        connection: &ConnRecord,
        grant: &MediationGrant,
    ) -> Result<MediationRecord, MediationError> {
        let mut record = self
            .retrieve_pending_by_connection(connection, MediationRole::Client)
            .await?;

        record.grant(grant.get_routing_keys(), grant.get_endpoint());
        self.mediation_repo
            .save(&record, "Mediation granted".to_string())
            .await?;

        Ok(record)
    }

    /// Apply a mediation denial received over `connection` to our pending
    /// client-side record
    pub async fn receive_deny(
        &self,
        connection: &ConnRecord,
    ) -> Result<MediationRecord, MediationError> {
        let mut record = self
            .retrieve_pending_by_connection(connection, MediationRole::Client)
            .await?;

        record.deny();
        self.mediation_repo
            .save(&record, "Mediation denied".to_string())
            .await?;

        Ok(record)
    }

    async fn retrieve_pending(
        &self,
        mediation_id: String,
        role: MediationRole,
    ) -> Result<MediationRecord, MediationError> {
        let record = self.mediation_repo.retrieve_by_id(mediation_id).await?;
        self.check_pending(record, role)
    }

    async fn retrieve_pending_by_connection(
        &self,
        connection: &ConnRecord,
        role: MediationRole,
    ) -> Result<MediationRecord, MediationError> {
        let record = self
            .mediation_repo
            .retrieve_by_connection_id(connection.get_connection_id().into())
            .await?;
        self.check_pending(record, role)
    }

    fn check_pending(
        &self,
        record: MediationRecord,
        role: MediationRole,
    ) -> Result<MediationRecord, MediationError> {
        if record.get_role() != role {
            return Err(MediationError::Management(format!(
                "mediation record holds the wrong role: {:?}",
                record.get_role()
            )));
        }
        if record.get_state() != MediationState::RequestReceived {
            return Err(MediationError::Management(format!(
                "mediation request already resolved: {:?}",
                record.get_state()
            )));
        }
        Ok(record)
    }
}

fn to_message<T>(message: &T) -> Result<serde_json::Value, MediationError>
where
    T: ToJSON,
{
    let payload = message
        .to_json()
        .map_err(|err| MediationError::EntityError(err.to_string()))?;
    serde_json::from_str(&payload).map_err(|err| MediationError::EntityError(err.to_string()))
}

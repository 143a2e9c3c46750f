use rst_common::standard::chrono::Utc;
use rst_common::standard::serde_json;
use rst_common::with_logging::log::{debug, warn};

use rstdev_domain::entity::ToJSON;

use sha2::{Digest, Sha256};

use crate::base::responder::ResponderBuilder;
use crate::base::settings::Settings;
use crate::base::storage::StorageBuilder;
use crate::base::wallet::{DIDKey, WalletBuilder};
use crate::diddoc::builder::DocumentBuilder;
use crate::diddoc::doc::{DIDDocument, PublicKey, Service};
use crate::diddoc::store::DocumentStore;
use crate::mediation::messages::{KeylistUpdate, KeylistUpdateRule};
use crate::mediation::record::MediationRecord;
use crate::mediation::types::MediationRepoBuilder;

use super::messages::{
    signable_payload, ConnectionDetail, ConnectionRequest, ConnectionResponse,
    ConnectionSignature, Invitation, InvitationKind,
};
use super::receipt::MessageReceipt;
use super::record::ConnRecord;
use super::types::{
    Accept, ConnectionEntityAccessor, ConnectionError, InvitationMode, ProblemReportReason,
    RepoBuilder, Role, State,
};

/// Options for [`ConnectionManager::create_invitation`]
#[derive(Debug, Clone, Default)]
pub struct CreateInvitationArgs {
    pub my_label: Option<String>,
    pub my_endpoint: Option<String>,
    pub auto_accept: Option<bool>,
    pub public: bool,
    pub multi_use: bool,
    pub alias: Option<String>,
    pub recipient_keys: Vec<String>,
    pub routing_keys: Vec<String>,
    pub mediation_id: Option<String>,
}

/// Options for [`ConnectionManager::create_static_connection`]
#[derive(Debug, Clone, Default)]
pub struct StaticConnectionArgs {
    pub my_did: Option<String>,
    pub my_seed: Option<String>,
    pub their_did: Option<String>,
    pub their_seed: Option<String>,
    pub their_verkey: Option<String>,
    pub their_endpoint: Option<String>,
    pub their_label: Option<String>,
    pub alias: Option<String>,
}

/// `ConnectionManager` drives the connection-establishment state machine:
/// `invitation -> request -> response -> completed` on both sides of the
/// exchange, plus static connections that skip the exchange entirely
///
/// Every collaborator is injected at construction. The responder is optional;
/// without one, auto-accept steps still advance the local record and the
/// prepared message is dropped with a log line
pub struct ConnectionManager<TRepo, TMedRepo, TWallet, TStorage, TResponder>
where
    TRepo: RepoBuilder<EntityAccessor = ConnRecord>,
    TMedRepo: MediationRepoBuilder,
    TWallet: WalletBuilder,
    TStorage: StorageBuilder,
    TResponder: ResponderBuilder,
{
    repo: TRepo,
    mediation_repo: TMedRepo,
    wallet: TWallet,
    doc_store: DocumentStore<TStorage>,
    responder: Option<TResponder>,
    settings: Settings,
}

impl<TRepo, TMedRepo, TWallet, TStorage, TResponder>
    ConnectionManager<TRepo, TMedRepo, TWallet, TStorage, TResponder>
where
    TRepo: RepoBuilder<EntityAccessor = ConnRecord>,
    TMedRepo: MediationRepoBuilder,
    TWallet: WalletBuilder,
    TStorage: StorageBuilder,
    TResponder: ResponderBuilder,
{
    pub fn new(
        repo: TRepo,
        mediation_repo: TMedRepo,
        wallet: TWallet,
        doc_store: DocumentStore<TStorage>,
        settings: Settings,
    ) -> Self {
        Self {
            repo,
            mediation_repo,
            wallet,
            doc_store,
            responder: None,
            settings,
        }
    }

    pub fn with_responder(mut self, responder: TResponder) -> Self {
        self.responder = Some(responder);
        self
    }

    /// Create a new invitation
    ///
    /// A public invitation carries only our public `DID` and creates no record;
    /// anyone may answer it. Otherwise a record at [`State::Invitation`] is
    /// created under a fresh (or caller-supplied) invitation key. With a
    /// granted mediation, the mediator's endpoint and routing keys are
    /// advertised instead of our own
    pub async fn create_invitation(
        &self,
        args: CreateInvitationArgs,
    ) -> Result<(Option<ConnRecord>, Invitation), ConnectionError> {
        if args.public {
            if args.multi_use {
                return Err(ConnectionError::management(
                    "public invitations cannot be multi-use",
                ));
            }
            if !self.settings.public_invites {
                return Err(ConnectionError::ConfigError(
                    "public invitations are not enabled".to_string(),
                ));
            }
            let public_did =
                self.wallet
                    .get_public_did()
                    .await?
                    .ok_or(ConnectionError::management(
                        "cannot create public invitation with no public DID",
                    ))?;

            let label = args
                .my_label
                .or(Some(self.settings.default_label.to_owned()));
            let invitation = Invitation::new_public(label, public_did.did);
            return Ok((None, invitation));
        }

        let invitation_key = match args.recipient_keys.first() {
            Some(key) => key.to_owned(),
            None => self.wallet.create_signing_key().await?,
        };

        let auto = args.auto_accept.unwrap_or(self.settings.auto_accept_invites);
        let mut builder = ConnRecord::builder()
            .with_their_role(Role::Requester)
            .with_state(State::Invitation)
            .with_invitation_key(invitation_key.to_owned())
            .with_accept(if auto { Accept::Auto } else { Accept::Manual })
            .with_invitation_mode(if args.multi_use {
                InvitationMode::Multi
            } else {
                InvitationMode::Once
            });
        if let Some(alias) = args.alias {
            builder = builder.with_alias(alias);
        }
        let record = builder.build()?;
        self.repo
            .save(&record, "Created new invitation".to_string())
            .await?;

        let mut endpoint = args
            .my_endpoint
            .or(self.settings.default_endpoint.to_owned());
        let mut routing_keys = args.routing_keys;
        let mediation = match args.mediation_id {
            Some(mediation_id) => {
                let mediation = self.mediation_repo.retrieve_by_id(mediation_id).await?;
                if !mediation.is_granted() {
                    return Err(ConnectionError::management("mediation is not granted"));
                }
                routing_keys = mediation.get_routing_keys();
                endpoint = mediation.get_endpoint();
                Some(mediation)
            }
            None => None,
        };

        let recipient_keys = if args.recipient_keys.is_empty() {
            vec![invitation_key.to_owned()]
        } else {
            args.recipient_keys
        };
        let label = args
            .my_label
            .or(Some(self.settings.default_label.to_owned()));
        let invitation = Invitation::new_inline(
            label,
            recipient_keys,
            endpoint.unwrap_or_default(),
            routing_keys,
        );
        self.repo
            .attach_invitation(record.get_connection_id().into(), &invitation)
            .await?;

        if self.settings.auto_send_keylist_update_in_create_invitation {
            if let Some(mediation) = mediation {
                self.send_keylist_update_best_effort(&mediation, invitation_key)
                    .await;
            }
        }

        Ok((Some(record), invitation))
    }

    /// Record a received invitation; with auto-accept, immediately answer it
    /// with a connection request
    pub async fn receive_invitation(
        &self,
        invitation: Invitation,
        auto_accept: Option<bool>,
        alias: Option<String>,
    ) -> Result<ConnRecord, ConnectionError> {
        if let InvitationKind::Inline {
            recipient_keys,
            endpoint,
            ..
        } = invitation.get_kind()
        {
            if recipient_keys.is_empty() || endpoint.is_empty() {
                return Err(ConnectionError::management(
                    "invitation must carry recipient keys and an endpoint",
                ));
            }
        }

        let auto = auto_accept.unwrap_or(self.settings.auto_accept_invites);
        let mut builder = ConnRecord::builder()
            .with_their_role(Role::Responder)
            .with_state(State::Invitation)
            .with_accept(if auto { Accept::Auto } else { Accept::Manual });
        if let Some(key) = invitation.get_invitation_key() {
            builder = builder.with_invitation_key(key);
        }
        if let Some(did) = invitation.get_did() {
            builder = builder.with_their_did(did);
        }
        if let Some(label) = invitation.get_label() {
            builder = builder.with_their_label(label);
        }
        if let Some(alias) = alias {
            builder = builder.with_alias(alias);
        }
        let mut record = builder.build()?;
        self.repo
            .save(&record, "Created new connection record from invitation".to_string())
            .await?;
        self.repo
            .attach_invitation(record.get_connection_id().into(), &invitation)
            .await?;

        if record.get_accept() == Accept::Auto {
            let request = self.create_request(&mut record, None, None, None).await?;
            match &self.responder {
                Some(responder) => {
                    responder
                        .send(to_message(&request)?, record.get_connection_id().into())
                        .await?
                }
                None => debug!("connection request created, no responder configured to send it"),
            }
        } else {
            debug!("connection invitation will await manual acceptance");
        }

        Ok(record)
    }

    /// Answer the invitation behind `record` with a connection request carrying
    /// our own `DID Document`
    ///
    /// With a granted mediation, the document advertises the mediator's
    /// endpoint and routing keys instead of our own endpoints
    pub async fn create_request(
        &self,
        record: &mut ConnRecord,
        my_label: Option<String>,
        my_endpoint: Option<String>,
        mediation_id: Option<String>,
    ) -> Result<ConnectionRequest, ConnectionError> {
        let my_info = self.ensure_local_did(record).await?;

        let mediation = match mediation_id {
            Some(mediation_id) => {
                let mediation = self.mediation_repo.retrieve_by_id(mediation_id).await?;
                if !mediation.is_granted() {
                    return Err(ConnectionError::management("mediation is not granted"));
                }
                Some(mediation)
            }
            None => None,
        };

        let builder = DocumentBuilder::new(&self.repo, &self.doc_store);
        let did_doc = match &mediation {
            Some(mediation) if !mediation.get_routing_keys().is_empty() => {
                let endpoint = mediation
                    .get_endpoint()
                    .ok_or(ConnectionError::management("mediation grant has no endpoint"))?;
                builder.create_routing_keys_did_document(
                    &my_info,
                    mediation.get_routing_keys(),
                    endpoint,
                )
            }
            _ => {
                builder
                    .create_did_document(
                        &my_info,
                        record.get_inbound_connection_id(),
                        self.own_endpoints(my_endpoint),
                    )
                    .await?
            }
        };

        let label = my_label.unwrap_or(self.settings.default_label.to_owned());
        let request =
            ConnectionRequest::new(label, ConnectionDetail::new(my_info.did.to_owned(), did_doc));

        record.set_request_id(request.get_id().to_owned());
        record.transition(State::Request)?;
        self.repo
            .save(record, "Created connection request".to_string())
            .await?;

        if self.settings.auto_send_keylist_update_in_requests {
            if let Some(mediation) = mediation {
                self.send_keylist_update_best_effort(&mediation, my_info.verkey.to_owned())
                    .await;
            }
        }

        Ok(request)
    }

    /// Handle a received connection request
    ///
    /// The record is found by the invitation key the request arrived under; a
    /// multi-use invitation spawns a fresh record per request. Without a
    /// matching invitation the request must target our public `DID`, which
    /// only works when public invitations are enabled
    pub async fn receive_request(
        &self,
        request: ConnectionRequest,
        receipt: &MessageReceipt,
    ) -> Result<ConnRecord, ConnectionError> {
        let mut connection: Option<ConnRecord> = None;
        if let Some(verkey) = receipt.get_recipient_verkey() {
            match self
                .repo
                .retrieve_by_invitation_key(verkey.to_owned(), Role::Requester)
                .await
            {
                Ok(invitation_record) => {
                    if invitation_record.is_multiuse_invitation() {
                        connection = Some(self.spawn_from_multiuse(&invitation_record, verkey).await?);
                    } else {
                        connection = Some(invitation_record);
                    }
                }
                Err(ConnectionError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }

        let detail = request.get_connection();
        if detail.did != detail.did_doc.did {
            return Err(ConnectionError::management_with_reason(
                "connection DID does not match DID document id",
                ProblemReportReason::RequestNotAccepted,
            ));
        }
        self.doc_store.store(&detail.did_doc).await?;

        let mut record = match connection {
            Some(mut record) => {
                record.set_their_label(request.get_label().to_owned());
                record.set_their_did(detail.did.to_owned());
                record.set_request_id(request.get_id().to_owned());
                record.transition(State::Request)?;
                self.repo
                    .save(&record, "Received connection request from invitation".to_string())
                    .await?;
                record
            }
            None => {
                if !self.settings.public_invites {
                    return Err(ConnectionError::management_with_reason(
                        "public invitations are not enabled",
                        ProblemReportReason::RequestNotAccepted,
                    ));
                }
                if !receipt.is_recipient_did_public() {
                    return Err(ConnectionError::management_with_reason(
                        "request does not target our public DID",
                        ProblemReportReason::RequestNotAccepted,
                    ));
                }

                let my_info = self.wallet.create_local_did(None, None).await?;
                let mut builder = ConnRecord::builder()
                    .with_their_role(Role::Requester)
                    .with_state(State::Request)
                    .with_accept(if self.settings.auto_accept_requests {
                        Accept::Auto
                    } else {
                        Accept::Manual
                    })
                    .with_my_did(my_info.did)
                    .with_their_did(detail.did.to_owned())
                    .with_their_label(request.get_label().to_owned())
                    .with_request_id(request.get_id().to_owned());
                if let Some(verkey) = receipt.get_recipient_verkey() {
                    builder = builder.with_invitation_key(verkey);
                }

                let record = builder.build()?;
                self.repo
                    .save(&record, "Received connection request from public DID".to_string())
                    .await?;
                record
            }
        };
        self.repo
            .attach_request(record.get_connection_id().into(), &request)
            .await?;

        if record.get_accept() == Accept::Auto {
            let response = self.create_response(&mut record, None).await?;
            match &self.responder {
                Some(responder) => {
                    responder
                        .send(to_message(&response)?, record.get_connection_id().into())
                        .await?
                }
                None => debug!("connection response created, no responder configured to send it"),
            }
        } else {
            debug!("connection request will await manual acceptance");
        }

        Ok(record)
    }

    /// Answer the request behind `record` with a response signed by the
    /// original invitation key
    pub async fn create_response(
        &self,
        record: &mut ConnRecord,
        my_endpoint: Option<String>,
    ) -> Result<ConnectionResponse, ConnectionError> {
        if !matches!(record.get_state(), State::Request | State::Response) {
            return Err(ConnectionError::management(format!(
                "connection is not in the request or response state: {:?}",
                record.get_state()
            )));
        }

        let request_id = record
            .get_request_id()
            .ok_or(ConnectionError::management(
                "connection has no request to respond to",
            ))?;
        let signer = record
            .get_invitation_key()
            .ok_or(ConnectionError::management(
                "connection has no invitation key to sign with",
            ))?;

        let my_info = self.ensure_local_did(record).await?;
        let did_doc = DocumentBuilder::new(&self.repo, &self.doc_store)
            .create_did_document(
                &my_info,
                record.get_inbound_connection_id(),
                self.own_endpoints(my_endpoint),
            )
            .await?;

        let detail = ConnectionDetail::new(my_info.did.to_owned(), did_doc);
        let mut response = ConnectionResponse::new(detail.to_owned());
        response.assign_thread_id(request_id);

        let payload = signable_payload(&detail, Utc::now().timestamp() as u64)?;
        let signature = self
            .wallet
            .sign_message(payload.to_owned(), signer.to_owned())
            .await?;
        response.set_signature(ConnectionSignature::new(signer, signature, payload));

        record.transition(State::Response)?;
        self.repo
            .save(record, "Created connection response".to_string())
            .await?;

        Ok(response)
    }

    /// Accept a received connection response, storing the other party's
    /// document and completing our half of the exchange
    ///
    /// The record is found by the response's thread reference, falling back to
    /// the `DID` pair the receipt resolved
    pub async fn accept_response(
        &self,
        response: ConnectionResponse,
        receipt: &MessageReceipt,
    ) -> Result<ConnRecord, ConnectionError> {
        let mut connection: Option<ConnRecord> = None;
        if let Some(thread_id) = response.get_thread_id() {
            match self.repo.retrieve_by_request_id(thread_id).await {
                Ok(record) => connection = Some(record),
                Err(ConnectionError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }
        if connection.is_none() {
            if let Some(sender_did) = receipt.get_sender_did() {
                match self
                    .repo
                    .retrieve_by_did(sender_did, receipt.get_recipient_did())
                    .await
                {
                    Ok(record) => connection = Some(record),
                    Err(ConnectionError::NotFound(_)) => {}
                    Err(err) => return Err(err),
                }
            }
        }

        let mut record = connection.ok_or(ConnectionError::management_with_reason(
            "no corresponding connection request found",
            ProblemReportReason::ResponseNotAccepted,
        ))?;

        if !matches!(record.get_state(), State::Request | State::Response) {
            return Err(ConnectionError::management_with_reason(
                format!(
                    "cannot accept connection response for connection in state: {:?}",
                    record.get_state()
                ),
                ProblemReportReason::ResponseNotAccepted,
            ));
        }

        let detail = response.get_connection();
        if detail.did != detail.did_doc.did {
            return Err(ConnectionError::management_with_reason(
                "connection DID does not match DID document id",
                ProblemReportReason::ResponseNotAccepted,
            ));
        }
        self.doc_store.store(&detail.did_doc).await?;

        record.set_their_did(detail.did.to_owned());
        record.transition(State::Response)?;
        self.repo
            .save(&record, "Accepted connection response".to_string())
            .await?;

        Ok(record)
    }

    /// Create a connection that skips the exchange entirely: both sides'
    /// identities are fixed up front and the record starts completed
    ///
    /// The other side is given either as an explicit `DID` and verification
    /// key, or as a seed their static identity is derived from
    pub async fn create_static_connection(
        &self,
        args: StaticConnectionArgs,
    ) -> Result<(DIDKey, DIDKey, ConnRecord), ConnectionError> {
        let my_info = self.wallet.create_local_did(args.my_seed, args.my_did).await?;

        let their_info = match (args.their_did, args.their_verkey) {
            (Some(did), Some(verkey)) => DIDKey::new(did, verkey),
            _ => {
                let seed = args.their_seed.ok_or(ConnectionError::management(
                    "either their DID and verkey or their seed must be provided",
                ))?;
                derive_did_key(&seed)
            }
        };

        let mut builder = ConnRecord::builder()
            .with_their_role(Role::Requester)
            .with_state(State::Completed)
            .with_invitation_mode(InvitationMode::Static)
            .with_my_did(my_info.did.to_owned())
            .with_their_did(their_info.did.to_owned());
        if let Some(label) = args.their_label {
            builder = builder.with_their_label(label);
        }
        if let Some(alias) = args.alias {
            builder = builder.with_alias(alias);
        }
        let record = builder.build()?;
        self.repo
            .save(&record, "Created new static connection".to_string())
            .await?;

        // their document, so target resolution works without an exchange
        let mut doc = DIDDocument::new(their_info.did.to_owned());
        doc.set_public_key(PublicKey::new(
            &their_info.did,
            "1",
            &their_info.verkey,
            &their_info.did,
            true,
        ));
        doc.set_service(Service::new(
            &their_info.did,
            "indy",
            vec![their_info.verkey.to_owned()],
            vec![],
            &args.their_endpoint.unwrap_or_default(),
        ));
        self.doc_store.store(&doc).await?;

        Ok((my_info, their_info, record))
    }

    async fn ensure_local_did(&self, record: &mut ConnRecord) -> Result<DIDKey, ConnectionError> {
        match record.get_my_did() {
            Some(did) => Ok(self.wallet.get_local_did(did).await?),
            None => {
                let my_info = self.wallet.create_local_did(None, None).await?;
                record.set_my_did(my_info.did.to_owned());
                Ok(my_info)
            }
        }
    }

    fn own_endpoints(&self, my_endpoint: Option<String>) -> Vec<String> {
        let mut endpoints = Vec::new();
        if let Some(endpoint) = my_endpoint.or(self.settings.default_endpoint.to_owned()) {
            endpoints.push(endpoint);
        }
        endpoints.extend(self.settings.additional_endpoints.to_owned());
        endpoints
    }

    async fn spawn_from_multiuse(
        &self,
        invitation_record: &ConnRecord,
        invitation_key: String,
    ) -> Result<ConnRecord, ConnectionError> {
        let fresh = ConnRecord::builder()
            .with_their_role(Role::Requester)
            .with_state(State::Invitation)
            .with_accept(invitation_record.get_accept())
            .with_invitation_key(invitation_key)
            .build()?;
        self.repo
            .save(&fresh, "Created new connection record from multi-use invitation".to_string())
            .await?;

        // carry the original invitation over so target resolution keeps working
        match self
            .repo
            .retrieve_invitation(invitation_record.get_connection_id().into())
            .await
        {
            Ok(original) => {
                self.repo
                    .attach_invitation(fresh.get_connection_id().into(), &original)
                    .await?
            }
            Err(ConnectionError::NotFound(_)) => {
                debug!("multi-use invitation record has no attached invitation")
            }
            Err(err) => return Err(err),
        }

        Ok(fresh)
    }

    /// Routing registration stays advisory: a mediator that missed one keylist
    /// update will learn the key through the next exchange
    async fn send_keylist_update_best_effort(&self, mediation: &MediationRecord, key: String) {
        let responder = match &self.responder {
            Some(responder) => responder,
            None => {
                debug!("no responder configured, skipping keylist update");
                return;
            }
        };

        let update = KeylistUpdate::new(vec![KeylistUpdateRule::add(key)]);
        let message = match to_message(&update) {
            Ok(message) => message,
            Err(err) => {
                warn!("unable to serialize keylist update: {}", err);
                return;
            }
        };

        if let Err(err) = responder.send(message, mediation.get_connection_id()).await {
            warn!("unable to send keylist update: {}", err);
        }
    }
}

/// Derive a static identity from a seed, for peers provisioned out of band
fn derive_did_key(seed: &str) -> DIDKey {
    let digest = Sha256::digest(seed.as_bytes());
    let verkey = bs58::encode(&digest).into_string();
    let did = bs58::encode(&digest[..16]).into_string();
    DIDKey::new(did, verkey)
}

fn to_message<T>(message: &T) -> Result<serde_json::Value, ConnectionError>
where
    T: ToJSON,
{
    let payload = message
        .to_json()
        .map_err(|err| ConnectionError::EntityError(err.to_string()))?;
    serde_json::from_str(&payload).map_err(|err| ConnectionError::EntityError(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use mockall::predicate::eq;

    use rst_common::standard::async_trait::async_trait;
    use rst_common::with_tokio::tokio;

    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;

    use crate::base::storage::{StorageError, StorageRecord};
    use crate::base::wallet::WalletError;
    use crate::connections::testutil::{
        MockFakeMediationRepo, MockFakeRepo, MockFakeResponder, MockFakeStorage, MockFakeWallet,
    };
    use crate::mediation::types::MediationRole;

    const MY_VERKEY: &str = "CnEDk9HrMnmiHXEV1WFgbVCRteYnPqsJwrTdcZaNhFVW";
    const THEIR_VERKEY: &str = "9EH5gYEeNc3z7PYXmd53d5x6qAfCNrqQqEB4nS7Zfu6K";

    type Manager = ConnectionManager<
        MockFakeRepo,
        MockFakeMediationRepo,
        MockFakeWallet,
        MockFakeStorage,
        MockFakeResponder,
    >;

    fn build_manager(
        repo: MockFakeRepo,
        mediation_repo: MockFakeMediationRepo,
        wallet: MockFakeWallet,
        storage: MockFakeStorage,
        settings: Settings,
    ) -> Manager {
        ConnectionManager::new(
            repo,
            mediation_repo,
            wallet,
            DocumentStore::new(storage),
            settings,
        )
    }

    fn signing_wallet() -> MockFakeWallet {
        let mut wallet = MockFakeWallet::new();
        wallet
            .expect_create_signing_key()
            .returning(|| Ok(MY_VERKEY.to_string()));
        wallet
    }

    fn storing_storage() -> MockFakeStorage {
        let mut storage = MockFakeStorage::new();
        storage
            .expect_find_record()
            .returning(|record_type, _| Err(StorageError::NotFound(record_type)));
        storage.expect_add_record().returning(|_| Ok(()));
        storage.expect_delete_all_records().returning(|_, _| Ok(()));
        storage
    }

    fn their_doc() -> DIDDocument {
        let mut doc = DIDDocument::new("did:sov:alice".to_string());
        doc.set_public_key(PublicKey::new(
            "did:sov:alice",
            "1",
            THEIR_VERKEY,
            "did:sov:alice",
            true,
        ));
        doc.set_service(Service::new(
            "did:sov:alice",
            "indy",
            vec![THEIR_VERKEY.to_string()],
            vec![],
            "https://a.example/in",
        ));
        doc
    }

    #[derive(Clone, Default)]
    struct InMemoryRepo {
        records: Arc<Mutex<HashMap<String, ConnRecord>>>,
        invitations: Arc<Mutex<HashMap<String, Invitation>>>,
        requests: Arc<Mutex<HashMap<String, ConnectionRequest>>>,
    }

    #[async_trait]
    impl RepoBuilder for InMemoryRepo {
        type EntityAccessor = ConnRecord;

        async fn save(
            &self,
            connection: &ConnRecord,
            _reason: String,
        ) -> Result<(), ConnectionError> {
            self.records
                .lock()
                .unwrap()
                .insert(connection.get_connection_id().into(), connection.to_owned());
            Ok(())
        }

        async fn retrieve_by_id(&self, connection_id: String) -> Result<ConnRecord, ConnectionError> {
            self.records
                .lock()
                .unwrap()
                .get(&connection_id)
                .cloned()
                .ok_or(ConnectionError::NotFound(connection_id))
        }

        async fn retrieve_by_did(
            &self,
            their_did: String,
            my_did: Option<String>,
        ) -> Result<ConnRecord, ConnectionError> {
            self.records
                .lock()
                .unwrap()
                .values()
                .find(|record| {
                    record.get_their_did() == Some(their_did.to_owned())
                        && my_did
                            .as_ref()
                            .map(|did| record.get_my_did().as_ref() == Some(did))
                            .unwrap_or(true)
                })
                .cloned()
                .ok_or(ConnectionError::NotFound(their_did))
        }

        async fn retrieve_by_invitation_key(
            &self,
            invitation_key: String,
            their_role: Role,
        ) -> Result<ConnRecord, ConnectionError> {
            self.records
                .lock()
                .unwrap()
                .values()
                .find(|record| {
                    record.get_invitation_key() == Some(invitation_key.to_owned())
                        && record.get_their_role() == their_role
                })
                .cloned()
                .ok_or(ConnectionError::NotFound(invitation_key))
        }

        async fn retrieve_by_request_id(
            &self,
            request_id: String,
        ) -> Result<ConnRecord, ConnectionError> {
            self.records
                .lock()
                .unwrap()
                .values()
                .find(|record| record.get_request_id() == Some(request_id.to_owned()))
                .cloned()
                .ok_or(ConnectionError::NotFound(request_id))
        }

        async fn query_by_inbound_connection(
            &self,
            inbound_connection_id: String,
        ) -> Result<Vec<ConnRecord>, ConnectionError> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .values()
                .filter(|record| {
                    record.get_inbound_connection_id() == Some(inbound_connection_id.to_owned())
                })
                .cloned()
                .collect())
        }

        async fn attach_invitation(
            &self,
            connection_id: String,
            invitation: &Invitation,
        ) -> Result<(), ConnectionError> {
            self.invitations
                .lock()
                .unwrap()
                .insert(connection_id, invitation.to_owned());
            Ok(())
        }

        async fn retrieve_invitation(
            &self,
            connection_id: String,
        ) -> Result<Invitation, ConnectionError> {
            self.invitations
                .lock()
                .unwrap()
                .get(&connection_id)
                .cloned()
                .ok_or(ConnectionError::NotFound(connection_id))
        }

        async fn attach_request(
            &self,
            connection_id: String,
            request: &ConnectionRequest,
        ) -> Result<(), ConnectionError> {
            self.requests
                .lock()
                .unwrap()
                .insert(connection_id, request.to_owned());
            Ok(())
        }

        async fn retrieve_request(
            &self,
            connection_id: String,
        ) -> Result<ConnectionRequest, ConnectionError> {
            self.requests
                .lock()
                .unwrap()
                .get(&connection_id)
                .cloned()
                .ok_or(ConnectionError::NotFound(connection_id))
        }
    }

    #[derive(Clone, Default)]
    struct InMemoryStorage {
        records: Arc<Mutex<Vec<StorageRecord>>>,
    }

    fn tags_match(record: &StorageRecord, tags: &HashMap<String, String>) -> bool {
        tags.iter()
            .all(|(k, v)| record.tags.get(k).map(|val| val == v).unwrap_or(false))
    }

    #[async_trait]
    impl StorageBuilder for InMemoryStorage {
        async fn add_record(&self, record: StorageRecord) -> Result<(), StorageError> {
            self.records.lock().unwrap().push(record);
            Ok(())
        }

        async fn find_record(
            &self,
            record_type: String,
            tags: HashMap<String, String>,
        ) -> Result<StorageRecord, StorageError> {
            self.records
                .lock()
                .unwrap()
                .iter()
                .find(|record| record.record_type == record_type && tags_match(record, &tags))
                .cloned()
                .ok_or(StorageError::NotFound(record_type))
        }

        async fn update_record(
            &self,
            record: StorageRecord,
            value: String,
            tags: HashMap<String, String>,
        ) -> Result<(), StorageError> {
            let mut records = self.records.lock().unwrap();
            let existing = records
                .iter_mut()
                .find(|existing| existing.id == record.id)
                .ok_or(StorageError::NotFound(record.id.clone()))?;
            existing.value = value;
            existing.tags = tags;
            Ok(())
        }

        async fn delete_all_records(
            &self,
            record_type: String,
            tags: HashMap<String, String>,
        ) -> Result<(), StorageError> {
            self.records
                .lock()
                .unwrap()
                .retain(|record| !(record.record_type == record_type && tags_match(record, &tags)));
            Ok(())
        }
    }

    /// A wallet that always answers with the same identity
    struct StaticWallet {
        did: &'static str,
        verkey: &'static str,
    }

    #[async_trait]
    impl WalletBuilder for StaticWallet {
        async fn create_local_did(
            &self,
            _seed: Option<String>,
            _did: Option<String>,
        ) -> Result<DIDKey, WalletError> {
            Ok(DIDKey::new(self.did.to_string(), self.verkey.to_string()))
        }

        async fn get_local_did(&self, did: String) -> Result<DIDKey, WalletError> {
            Ok(DIDKey::new(did, self.verkey.to_string()))
        }

        async fn get_local_did_for_verkey(&self, verkey: String) -> Result<DIDKey, WalletError> {
            Err(WalletError::NotFound(verkey))
        }

        async fn get_public_did(&self) -> Result<Option<DIDKey>, WalletError> {
            Ok(None)
        }

        async fn create_signing_key(&self) -> Result<String, WalletError> {
            Ok(self.verkey.to_string())
        }

        async fn sign_message(
            &self,
            _message: Vec<u8>,
            _verkey: String,
        ) -> Result<Vec<u8>, WalletError> {
            Ok(vec![7u8; 64])
        }
    }

    #[tokio::test]
    async fn test_create_invitation_single_use() {
        let mut repo = MockFakeRepo::new();
        repo.expect_save()
            .withf(|record, _| {
                record.get_state() == State::Invitation
                    && record.get_their_role() == Role::Requester
                    && record.get_invitation_mode() == InvitationMode::Once
                    && record.get_invitation_key() == Some(MY_VERKEY.to_string())
            })
            .returning(|_, _| Ok(()));
        repo.expect_attach_invitation().returning(|_, _| Ok(()));

        let manager = build_manager(
            repo,
            MockFakeMediationRepo::new(),
            signing_wallet(),
            MockFakeStorage::new(),
            Settings::default(),
        );

        let (record, invitation) = manager
            .create_invitation(CreateInvitationArgs {
                my_endpoint: Some("https://a.example/in".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(record.is_some());
        assert_eq!(
            invitation.get_invitation_key(),
            Some(MY_VERKEY.to_string())
        );
        assert_eq!(invitation.get_label(), Some("harbor-agent".to_string()))
    }

    #[tokio::test]
    async fn test_create_public_invitation_requires_setting() {
        let manager = build_manager(
            MockFakeRepo::new(),
            MockFakeMediationRepo::new(),
            MockFakeWallet::new(),
            MockFakeStorage::new(),
            Settings::default(),
        );

        let out = manager
            .create_invitation(CreateInvitationArgs {
                public: true,
                ..Default::default()
            })
            .await;
        assert!(matches!(out.unwrap_err(), ConnectionError::ConfigError(_)))
    }

    #[tokio::test]
    async fn test_create_public_invitation_carries_public_did() {
        let mut wallet = MockFakeWallet::new();
        wallet.expect_get_public_did().returning(|| {
            let mut key = DIDKey::new("did:sov:public".to_string(), MY_VERKEY.to_string());
            key.public = true;
            Ok(Some(key))
        });

        let settings = Settings {
            public_invites: true,
            ..Default::default()
        };
        let manager = build_manager(
            MockFakeRepo::new(),
            MockFakeMediationRepo::new(),
            wallet,
            MockFakeStorage::new(),
            settings,
        );

        let (record, invitation) = manager
            .create_invitation(CreateInvitationArgs {
                public: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(record.is_none());
        assert_eq!(invitation.get_did(), Some("did:sov:public".to_string()))
    }

    #[tokio::test]
    async fn test_receive_invitation_manual_stays_at_invitation() {
        let mut repo = MockFakeRepo::new();
        repo.expect_save()
            .withf(|record, _| {
                record.get_state() == State::Invitation
                    && record.get_their_role() == Role::Responder
            })
            .returning(|_, _| Ok(()));
        repo.expect_attach_invitation().returning(|_, _| Ok(()));

        let manager = build_manager(
            repo,
            MockFakeMediationRepo::new(),
            MockFakeWallet::new(),
            MockFakeStorage::new(),
            Settings::default(),
        );

        let invitation = Invitation::new_inline(
            Some("alice".to_string()),
            vec![THEIR_VERKEY.to_string()],
            "https://a.example/in".to_string(),
            vec![],
        );
        let record = manager
            .receive_invitation(invitation, Some(false), None)
            .await
            .unwrap();

        assert_eq!(record.get_state(), State::Invitation);
        assert_eq!(record.get_accept(), Accept::Manual);
        assert_eq!(record.get_their_label(), Some("alice".to_string()));
        assert_eq!(record.get_invitation_key(), Some(THEIR_VERKEY.to_string()))
    }

    #[tokio::test]
    async fn test_receive_invitation_auto_sends_request() {
        let mut repo = MockFakeRepo::new();
        repo.expect_save().returning(|_, _| Ok(()));
        repo.expect_attach_invitation().returning(|_, _| Ok(()));

        let mut wallet = MockFakeWallet::new();
        wallet.expect_create_local_did().returning(|_, _| {
            Ok(DIDKey::new("did:sov:bob".to_string(), MY_VERKEY.to_string()))
        });

        let mut responder = MockFakeResponder::new();
        responder
            .expect_send()
            .withf(|message, _| message.get("connection").is_some())
            .times(1)
            .returning(|_, _| Ok(()));

        let settings = Settings {
            default_endpoint: Some("https://b.example/in".to_string()),
            ..Default::default()
        };
        let manager = build_manager(
            repo,
            MockFakeMediationRepo::new(),
            wallet,
            MockFakeStorage::new(),
            settings,
        )
        .with_responder(responder);

        let invitation = Invitation::new_inline(
            None,
            vec![THEIR_VERKEY.to_string()],
            "https://a.example/in".to_string(),
            vec![],
        );
        let record = manager
            .receive_invitation(invitation, Some(true), None)
            .await
            .unwrap();

        assert_eq!(record.get_state(), State::Request);
        assert_eq!(record.get_my_did(), Some("did:sov:bob".to_string()))
    }

    #[tokio::test]
    async fn test_create_request_builds_own_document() {
        let mut repo = MockFakeRepo::new();
        repo.expect_save()
            .withf(|record, _| record.get_state() == State::Request)
            .returning(|_, _| Ok(()));

        let mut wallet = MockFakeWallet::new();
        wallet.expect_create_local_did().returning(|_, _| {
            Ok(DIDKey::new("did:sov:bob".to_string(), MY_VERKEY.to_string()))
        });

        let manager = build_manager(
            repo,
            MockFakeMediationRepo::new(),
            wallet,
            MockFakeStorage::new(),
            Settings::default(),
        );

        let mut record = ConnRecord::builder()
            .with_their_role(Role::Responder)
            .with_state(State::Invitation)
            .with_invitation_key(THEIR_VERKEY.to_string())
            .build()
            .unwrap();

        let request = manager
            .create_request(
                &mut record,
                Some("bob".to_string()),
                Some("https://b.example/in".to_string()),
                None,
            )
            .await
            .unwrap();

        assert_eq!(request.get_label(), "bob");
        let doc = &request.get_connection().did_doc;
        assert_eq!(doc.did, "did:sov:bob");
        assert_eq!(doc.public_key.len(), 1);
        assert_eq!(doc.service.len(), 1);
        assert_eq!(doc.service[0].endpoint, "https://b.example/in");
        assert_eq!(record.get_request_id(), Some(request.get_id().to_owned()))
    }

    #[tokio::test]
    async fn test_create_request_with_granted_mediation() {
        let mut repo = MockFakeRepo::new();
        repo.expect_save().returning(|_, _| Ok(()));

        let mut mediation = MediationRecord::new(
            MediationRole::Client,
            "mediator-conn".to_string(),
            vec![],
            vec![],
        );
        mediation.grant(
            vec!["5Fg2bqn5gRLTevQQ9zyrNrdWqpAQ6K8RpA7AwG72ejPT".to_string()],
            "https://mediator.example/in".to_string(),
        );
        let mediation_id: String = mediation.get_mediation_id().into();

        let mut mediation_repo = MockFakeMediationRepo::new();
        mediation_repo
            .expect_retrieve_by_id()
            .with(eq(mediation_id.to_owned()))
            .return_once(move |_| Ok(mediation));

        let mut wallet = MockFakeWallet::new();
        wallet.expect_create_local_did().returning(|_, _| {
            Ok(DIDKey::new("did:sov:bob".to_string(), MY_VERKEY.to_string()))
        });

        let manager = build_manager(
            repo,
            mediation_repo,
            wallet,
            MockFakeStorage::new(),
            Settings::default(),
        );

        let mut record = ConnRecord::builder()
            .with_their_role(Role::Responder)
            .with_state(State::Invitation)
            .build()
            .unwrap();

        let request = manager
            .create_request(&mut record, None, None, Some(mediation_id))
            .await
            .unwrap();

        let doc = &request.get_connection().did_doc;
        assert_eq!(doc.service[0].endpoint, "https://mediator.example/in");
        assert_eq!(
            doc.service[0].routing_keys,
            vec!["5Fg2bqn5gRLTevQQ9zyrNrdWqpAQ6K8RpA7AwG72ejPT".to_string()]
        )
    }

    #[tokio::test]
    async fn test_receive_request_from_invitation() {
        let invitation_record = ConnRecord::builder()
            .with_their_role(Role::Requester)
            .with_state(State::Invitation)
            .with_invitation_key(MY_VERKEY.to_string())
            .build()
            .unwrap();

        let mut repo = MockFakeRepo::new();
        repo.expect_retrieve_by_invitation_key()
            .with(eq(MY_VERKEY.to_string()), eq(Role::Requester))
            .return_once(move |_, _| Ok(invitation_record));
        repo.expect_save()
            .withf(|record, _| {
                record.get_state() == State::Request
                    && record.get_their_did() == Some("did:sov:alice".to_string())
                    && record.get_their_label() == Some("alice".to_string())
            })
            .returning(|_, _| Ok(()));
        repo.expect_attach_request().returning(|_, _| Ok(()));

        let manager = build_manager(
            repo,
            MockFakeMediationRepo::new(),
            MockFakeWallet::new(),
            storing_storage(),
            Settings::default(),
        );

        let request = ConnectionRequest::new(
            "alice".to_string(),
            ConnectionDetail::new("did:sov:alice".to_string(), their_doc()),
        );
        let receipt = MessageReceipt::new(
            Some(THEIR_VERKEY.to_string()),
            Some(MY_VERKEY.to_string()),
        );

        let record = manager.receive_request(request, &receipt).await.unwrap();
        assert_eq!(record.get_state(), State::Request)
    }

    #[tokio::test]
    async fn test_receive_request_multiuse_spawns_fresh_record() {
        let invitation_record = ConnRecord::builder()
            .with_their_role(Role::Requester)
            .with_state(State::Invitation)
            .with_invitation_key(MY_VERKEY.to_string())
            .with_invitation_mode(InvitationMode::Multi)
            .build()
            .unwrap();
        let original_id: String = invitation_record.get_connection_id().into();
        let original_invitation = Invitation::new_inline(
            None,
            vec![MY_VERKEY.to_string()],
            "https://b.example/in".to_string(),
            vec![],
        );

        let mut repo = MockFakeRepo::new();
        repo.expect_retrieve_by_invitation_key()
            .return_once(move |_, _| Ok(invitation_record));
        repo.expect_retrieve_invitation()
            .with(eq(original_id.to_owned()))
            .return_once(move |_| Ok(original_invitation));
        repo.expect_attach_invitation().returning(|_, _| Ok(()));
        repo.expect_save().returning(|_, _| Ok(()));
        repo.expect_attach_request().returning(|_, _| Ok(()));

        let manager = build_manager(
            repo,
            MockFakeMediationRepo::new(),
            MockFakeWallet::new(),
            storing_storage(),
            Settings::default(),
        );

        let request = ConnectionRequest::new(
            "alice".to_string(),
            ConnectionDetail::new("did:sov:alice".to_string(), their_doc()),
        );
        let receipt = MessageReceipt::new(
            Some(THEIR_VERKEY.to_string()),
            Some(MY_VERKEY.to_string()),
        );

        let record = manager.receive_request(request, &receipt).await.unwrap();
        let record_id: String = record.get_connection_id().into();
        assert_ne!(record_id, original_id);
        assert_eq!(record.get_invitation_key(), Some(MY_VERKEY.to_string()))
    }

    #[tokio::test]
    async fn test_receive_request_rejects_did_mismatch() {
        let mut repo = MockFakeRepo::new();
        repo.expect_retrieve_by_invitation_key()
            .returning(|key, _| Err(ConnectionError::NotFound(key)));

        let settings = Settings {
            public_invites: true,
            ..Default::default()
        };
        let manager = build_manager(
            repo,
            MockFakeMediationRepo::new(),
            MockFakeWallet::new(),
            MockFakeStorage::new(),
            settings,
        );

        let request = ConnectionRequest::new(
            "alice".to_string(),
            ConnectionDetail::new("did:sov:someone-else".to_string(), their_doc()),
        );
        let receipt = MessageReceipt::new(
            Some(THEIR_VERKEY.to_string()),
            Some(MY_VERKEY.to_string()),
        );

        let out = manager.receive_request(request, &receipt).await;
        assert!(matches!(
            out.unwrap_err(),
            ConnectionError::Management {
                reason: Some(ProblemReportReason::RequestNotAccepted),
                ..
            }
        ))
    }

    #[tokio::test]
    async fn test_receive_request_without_invitation_needs_public_invites() {
        let mut repo = MockFakeRepo::new();
        repo.expect_retrieve_by_invitation_key()
            .returning(|key, _| Err(ConnectionError::NotFound(key)));

        let manager = build_manager(
            repo,
            MockFakeMediationRepo::new(),
            MockFakeWallet::new(),
            storing_storage(),
            Settings::default(),
        );

        let request = ConnectionRequest::new(
            "alice".to_string(),
            ConnectionDetail::new("did:sov:alice".to_string(), their_doc()),
        );
        let receipt = MessageReceipt::new(
            Some(THEIR_VERKEY.to_string()),
            Some(MY_VERKEY.to_string()),
        );

        let out = manager.receive_request(request, &receipt).await;
        assert!(matches!(
            out.unwrap_err(),
            ConnectionError::Management {
                reason: Some(ProblemReportReason::RequestNotAccepted),
                ..
            }
        ))
    }

    #[tokio::test]
    async fn test_create_response_signs_with_invitation_key() {
        let mut repo = MockFakeRepo::new();
        repo.expect_save()
            .withf(|record, _| record.get_state() == State::Response)
            .returning(|_, _| Ok(()));

        let mut wallet = MockFakeWallet::new();
        wallet.expect_get_local_did().returning(|did| {
            Ok(DIDKey::new(did, MY_VERKEY.to_string()))
        });
        wallet
            .expect_sign_message()
            .withf(|_, verkey| verkey == MY_VERKEY)
            .returning(|_, _| Ok(vec![7u8; 64]));

        let settings = Settings {
            default_endpoint: Some("https://b.example/in".to_string()),
            ..Default::default()
        };
        let manager = build_manager(
            repo,
            MockFakeMediationRepo::new(),
            wallet,
            MockFakeStorage::new(),
            settings,
        );

        let mut record = ConnRecord::builder()
            .with_their_role(Role::Requester)
            .with_state(State::Request)
            .with_my_did("did:sov:bob".to_string())
            .with_invitation_key(MY_VERKEY.to_string())
            .with_request_id("request-1".to_string())
            .build()
            .unwrap();

        let response = manager.create_response(&mut record, None).await.unwrap();

        assert_eq!(response.get_thread_id(), Some("request-1".to_string()));
        let signature = response.get_signature().unwrap();
        assert_eq!(signature.signer, MY_VERKEY);
        assert_eq!(signature.signature, BASE64.encode(vec![7u8; 64]));
        assert_eq!(record.get_state(), State::Response)
    }

    #[tokio::test]
    async fn test_create_response_rejects_wrong_state() {
        let manager = build_manager(
            MockFakeRepo::new(),
            MockFakeMediationRepo::new(),
            MockFakeWallet::new(),
            MockFakeStorage::new(),
            Settings::default(),
        );

        let mut record = ConnRecord::builder()
            .with_their_role(Role::Requester)
            .with_state(State::Invitation)
            .build()
            .unwrap();

        let out = manager.create_response(&mut record, None).await;
        assert!(matches!(
            out.unwrap_err(),
            ConnectionError::Management { .. }
        ))
    }

    #[tokio::test]
    async fn test_accept_response_by_thread_reference() {
        let pending = ConnRecord::builder()
            .with_their_role(Role::Responder)
            .with_state(State::Request)
            .with_my_did("did:sov:bob".to_string())
            .with_request_id("request-1".to_string())
            .build()
            .unwrap();

        let mut repo = MockFakeRepo::new();
        repo.expect_retrieve_by_request_id()
            .with(eq("request-1".to_string()))
            .return_once(move |_| Ok(pending));
        repo.expect_save()
            .withf(|record, _| {
                record.get_state() == State::Response
                    && record.get_their_did() == Some("did:sov:alice".to_string())
            })
            .returning(|_, _| Ok(()));

        let manager = build_manager(
            repo,
            MockFakeMediationRepo::new(),
            MockFakeWallet::new(),
            storing_storage(),
            Settings::default(),
        );

        let mut response = ConnectionResponse::new(ConnectionDetail::new(
            "did:sov:alice".to_string(),
            their_doc(),
        ));
        response.assign_thread_id("request-1".to_string());

        let receipt = MessageReceipt::new(
            Some(THEIR_VERKEY.to_string()),
            Some(MY_VERKEY.to_string()),
        );
        let record = manager.accept_response(response, &receipt).await.unwrap();

        assert_eq!(record.get_state(), State::Response)
    }

    #[tokio::test]
    async fn test_accept_response_without_matching_request() {
        let mut repo = MockFakeRepo::new();
        repo.expect_retrieve_by_request_id()
            .returning(|id| Err(ConnectionError::NotFound(id)));

        let manager = build_manager(
            repo,
            MockFakeMediationRepo::new(),
            MockFakeWallet::new(),
            MockFakeStorage::new(),
            Settings::default(),
        );

        let mut response = ConnectionResponse::new(ConnectionDetail::new(
            "did:sov:alice".to_string(),
            their_doc(),
        ));
        response.assign_thread_id("unknown".to_string());

        let receipt = MessageReceipt::new(None, None);
        let out = manager.accept_response(response, &receipt).await;
        assert!(matches!(
            out.unwrap_err(),
            ConnectionError::Management {
                reason: Some(ProblemReportReason::ResponseNotAccepted),
                ..
            }
        ))
    }

    #[tokio::test]
    async fn test_static_connection_derives_their_identity() {
        let mut repo = MockFakeRepo::new();
        repo.expect_save()
            .withf(|record, _| {
                record.get_state() == State::Completed
                    && record.get_invitation_mode() == InvitationMode::Static
            })
            .returning(|_, _| Ok(()));

        let mut wallet = MockFakeWallet::new();
        wallet
            .expect_create_local_did()
            .withf(|seed, _| seed == &Some("my-seed-000000000000000000000000".to_string()))
            .returning(|_, _| {
                Ok(DIDKey::new("did:sov:bob".to_string(), MY_VERKEY.to_string()))
            });

        let manager = build_manager(
            repo,
            MockFakeMediationRepo::new(),
            wallet,
            storing_storage(),
            Settings::default(),
        );

        let (my_info, their_info, record) = manager
            .create_static_connection(StaticConnectionArgs {
                my_seed: Some("my-seed-000000000000000000000000".to_string()),
                their_seed: Some("their-seed-00000000000000000000".to_string()),
                their_endpoint: Some("https://a.example/in".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(my_info.did, "did:sov:bob");
        // the derivation is deterministic
        let again = derive_did_key("their-seed-00000000000000000000");
        assert_eq!(their_info, again);
        assert_eq!(record.get_their_did(), Some(their_info.did))
    }

    #[tokio::test]
    async fn test_static_connection_requires_their_identity() {
        let mut wallet = MockFakeWallet::new();
        wallet.expect_create_local_did().returning(|_, _| {
            Ok(DIDKey::new("did:sov:bob".to_string(), MY_VERKEY.to_string()))
        });

        let manager = build_manager(
            MockFakeRepo::new(),
            MockFakeMediationRepo::new(),
            wallet,
            MockFakeStorage::new(),
            Settings::default(),
        );

        let out = manager
            .create_static_connection(StaticConnectionArgs::default())
            .await;
        assert!(matches!(
            out.unwrap_err(),
            ConnectionError::Management { .. }
        ))
    }

    #[tokio::test]
    async fn test_keylist_update_failure_does_not_fail_invitation() {
        use crate::base::responder::ResponderError;

        let mut repo = MockFakeRepo::new();
        repo.expect_save().returning(|_, _| Ok(()));
        repo.expect_attach_invitation().returning(|_, _| Ok(()));

        let mut mediation = MediationRecord::new(
            MediationRole::Client,
            "mediator-conn".to_string(),
            vec![],
            vec![],
        );
        mediation.grant(
            vec!["5Fg2bqn5gRLTevQQ9zyrNrdWqpAQ6K8RpA7AwG72ejPT".to_string()],
            "https://mediator.example/in".to_string(),
        );
        let mediation_id: String = mediation.get_mediation_id().into();

        let mut mediation_repo = MockFakeMediationRepo::new();
        mediation_repo
            .expect_retrieve_by_id()
            .return_once(move |_| Ok(mediation));

        let mut responder = MockFakeResponder::new();
        responder
            .expect_send()
            .returning(|_, _| Err(ResponderError::SendFailure("mediator offline".to_string())));

        let settings = Settings {
            auto_send_keylist_update_in_create_invitation: true,
            ..Default::default()
        };
        let manager = build_manager(
            repo,
            mediation_repo,
            signing_wallet(),
            MockFakeStorage::new(),
            settings,
        )
        .with_responder(responder);

        let out = manager
            .create_invitation(CreateInvitationArgs {
                mediation_id: Some(mediation_id),
                ..Default::default()
            })
            .await;

        // the invitation itself must survive the failed keylist update
        assert!(!out.is_err());
        let (_, invitation) = out.unwrap();
        assert_eq!(
            invitation.get_kind(),
            &InvitationKind::Inline {
                recipient_keys: vec![MY_VERKEY.to_string()],
                endpoint: "https://mediator.example/in".to_string(),
                routing_keys: vec!["5Fg2bqn5gRLTevQQ9zyrNrdWqpAQ6K8RpA7AwG72ejPT".to_string()],
            }
        )
    }

    // Two managers exchanging invitation, request and response against real
    // in-memory collaborators, both sides advancing through the protocol states
    #[tokio::test]
    async fn test_full_exchange_between_two_agents() {
        let inviter = ConnectionManager::<_, _, _, _, MockFakeResponder>::new(
            InMemoryRepo::default(),
            MockFakeMediationRepo::new(),
            StaticWallet {
                did: "did:sov:alice",
                verkey: MY_VERKEY,
            },
            DocumentStore::new(InMemoryStorage::default()),
            Settings {
                default_endpoint: Some("https://a.example/in".to_string()),
                ..Default::default()
            },
        );
        let invitee = ConnectionManager::<_, _, _, _, MockFakeResponder>::new(
            InMemoryRepo::default(),
            MockFakeMediationRepo::new(),
            StaticWallet {
                did: "did:sov:bob",
                verkey: THEIR_VERKEY,
            },
            DocumentStore::new(InMemoryStorage::default()),
            Settings {
                default_endpoint: Some("https://b.example/in".to_string()),
                ..Default::default()
            },
        );

        let (record, invitation) = inviter
            .create_invitation(CreateInvitationArgs::default())
            .await
            .unwrap();
        let inviter_id: String = record.unwrap().get_connection_id().into();
        let invitation_key = invitation.get_invitation_key().unwrap();
        assert_eq!(invitation_key, MY_VERKEY);

        let mut invitee_record = invitee
            .receive_invitation(invitation, Some(false), None)
            .await
            .unwrap();
        assert_eq!(invitee_record.get_state(), State::Invitation);

        let request = invitee
            .create_request(&mut invitee_record, None, None, None)
            .await
            .unwrap();
        assert_eq!(invitee_record.get_state(), State::Request);
        let own_doc = &request.get_connection().did_doc;
        assert_eq!(own_doc.public_key.len(), 1);
        assert_eq!(own_doc.service[0].endpoint, "https://b.example/in");

        let receipt = MessageReceipt::new(
            Some(THEIR_VERKEY.to_string()),
            Some(invitation_key.to_owned()),
        );
        let mut inviter_record = inviter.receive_request(request, &receipt).await.unwrap();
        assert_eq!(inviter_record.get_state(), State::Request);
        // the invitation key leads back to the record the invitation created
        assert_eq!(String::from(inviter_record.get_connection_id()), inviter_id);
        assert_eq!(
            inviter_record.get_their_did(),
            Some("did:sov:bob".to_string())
        );

        let response = inviter
            .create_response(&mut inviter_record, None)
            .await
            .unwrap();
        assert_eq!(inviter_record.get_state(), State::Response);
        assert_eq!(response.get_signature().unwrap().signer, invitation_key);
        assert_eq!(response.get_connection().did, "did:sov:alice");

        let receipt = MessageReceipt::new(
            Some(MY_VERKEY.to_string()),
            Some(THEIR_VERKEY.to_string()),
        );
        let accepted = invitee.accept_response(response, &receipt).await.unwrap();
        assert_eq!(accepted.get_state(), State::Response);
        assert_eq!(
            accepted.get_their_did(),
            Some("did:sov:alice".to_string())
        );
        assert_eq!(
            String::from(accepted.get_connection_id()),
            String::from(invitee_record.get_connection_id())
        )
    }
}

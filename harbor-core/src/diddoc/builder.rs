use std::collections::HashSet;

use crate::base::wallet::DIDKey;
use crate::connections::types::{
    ConnectionEntityAccessor, ConnectionError, RepoBuilder, State,
};

use super::doc::{DIDDocument, PublicKey, Service};
use super::store::DocumentStore;

use crate::base::storage::StorageBuilder;

/// `DocumentBuilder` constructs the `DID Document` describing one of our local
/// identities, resolving routing indirection through chained router connections
///
/// Borrowed collaborators keep the builder free to be constructed per call
/// from whichever component already owns the repository and store
pub struct DocumentBuilder<'a, TRepo, TStorage>
where
    TRepo: RepoBuilder,
    TStorage: StorageBuilder,
{
    repo: &'a TRepo,
    store: &'a DocumentStore<TStorage>,
}

impl<'a, TRepo, TStorage> DocumentBuilder<'a, TRepo, TStorage>
where
    TRepo: RepoBuilder,
    TStorage: StorageBuilder,
{
    pub fn new(repo: &'a TRepo, store: &'a DocumentStore<TStorage>) -> Self {
        Self { repo, store }
    }

    /// Build the document for `did_key`, walking the router chain rooted at
    /// `inbound_connection_id`
    ///
    /// Each hop must be a completed connection whose stored document carries a
    /// service with an endpoint and at least one recipient key; that recipient
    /// key becomes one of our routing keys and the innermost router's endpoint
    /// replaces the caller-supplied ones. The walk keeps a visited set so a
    /// corrupted chain that loops back on itself fails instead of spinning
    pub async fn create_did_document(
        &self,
        did_key: &DIDKey,
        inbound_connection_id: Option<String>,
        endpoints: Vec<String>,
    ) -> Result<DIDDocument, ConnectionError> {
        let mut doc = DIDDocument::new(did_key.did.to_owned());
        doc.set_public_key(PublicKey::new(
            &did_key.did,
            "1",
            &did_key.verkey,
            &did_key.did,
            true,
        ));

        let mut endpoints = endpoints;
        let mut routing_keys: Vec<String> = Vec::new();
        let mut router_idx = 1;
        let mut visited: HashSet<String> = HashSet::new();

        let mut router_id = inbound_connection_id;
        while let Some(current_id) = router_id {
            if !visited.insert(current_id.to_owned()) {
                return Err(ConnectionError::management(format!(
                    "router connection chain loops through: {}",
                    current_id
                )));
            }

            let router = self.repo.retrieve_by_id(current_id.to_owned()).await?;
            if router.get_state() != State::Completed {
                return Err(ConnectionError::management(format!(
                    "router connection not completed: {}",
                    current_id
                )));
            }

            // the router's published service lives in its remote party's
            // stored document; the store only ever holds peer documents
            let router_did = router.get_their_did().ok_or(ConnectionError::management(
                format!("router connection has no remote DID: {}", current_id),
            ))?;
            let routing_doc = self.store.fetch(router_did).await?;

            let service = routing_doc
                .service
                .first()
                .ok_or(ConnectionError::management(format!(
                    "no services defined by routing document: {}",
                    current_id
                )))?;
            if service.endpoint.is_empty() {
                return Err(ConnectionError::management(
                    "routing document service has no endpoint",
                ));
            }
            let recipient_key =
                service
                    .recipient_keys
                    .first()
                    .ok_or(ConnectionError::management(
                        "routing document service has no recipient keys",
                    ))?;

            doc.set_public_key(PublicKey::new(
                &did_key.did,
                &format!("routing-{}", router_idx),
                recipient_key,
                &did_key.did,
                false,
            ));
            routing_keys.push(recipient_key.to_owned());
            endpoints = vec![service.endpoint.to_owned()];
            router_idx += 1;

            router_id = router.get_inbound_connection_id();
        }

        for (index, endpoint) in endpoints.iter().enumerate() {
            let ident = match index {
                0 => "indy".to_string(),
                n => format!("indy{}", n),
            };
            doc.set_service(Service::new(
                &did_key.did,
                &ident,
                vec![did_key.verkey.to_owned()],
                routing_keys.to_owned(),
                endpoint,
            ));
        }

        Ok(doc)
    }

    /// Build a document whose routing keys came from a mediation grant instead
    /// of a router connection chain
    ///
    /// The granted keys are carried as non-authenticating entries owned by our
    /// own `DID` and the mediator's endpoint is the only service endpoint
    pub fn create_routing_keys_did_document(
        &self,
        did_key: &DIDKey,
        routing_keys: Vec<String>,
        endpoint: String,
    ) -> DIDDocument {
        let mut doc = DIDDocument::new(did_key.did.to_owned());
        doc.set_public_key(PublicKey::new(
            &did_key.did,
            "1",
            &did_key.verkey,
            &did_key.did,
            true,
        ));

        for (index, routing_key) in routing_keys.iter().enumerate() {
            doc.set_public_key(PublicKey::new(
                &did_key.did,
                &format!("routing-{}", index + 1),
                routing_key,
                &did_key.did,
                false,
            ));
        }

        doc.set_service(Service::new(
            &did_key.did,
            "indy",
            vec![did_key.verkey.to_owned()],
            routing_keys,
            &endpoint,
        ));

        doc
    }
}

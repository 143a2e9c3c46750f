use rst_common::standard::serde::{self, Deserialize, Serialize};
use rst_common::standard::serde_json;
use rst_common::with_logging::log::{debug, warn};

use crate::base::cache::{CacheBuilder, CACHE_TTL_SECS};
use crate::base::ledger::LedgerBuilder;
use crate::base::storage::StorageBuilder;
use crate::base::wallet::WalletBuilder;
use crate::diddoc::doc::DIDDocument;
use crate::diddoc::store::DocumentStore;

use super::messages::InvitationKind;
use super::types::{ConnectionEntityAccessor, ConnectionError, RepoBuilder, Role, State};

/// `ConnectionTarget` is one resolved delivery address for a connection: where
/// to send, which keys receive and route, and which of our keys signs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct ConnectionTarget {
    pub did: Option<String>,

    pub endpoint: Option<String>,

    pub label: Option<String>,

    pub recipient_keys: Vec<String>,

    pub routing_keys: Vec<String>,

    /// Our verification key the outbound message is signed with
    pub sender_key: Option<String>,
}

/// `TargetResolver` answers "where do messages for this connection go"
///
/// Before the other party's document arrived, targets come from the invitation
/// (inline keys, or a ledger lookup for a public `DID` invitation); once their
/// document is stored, targets come from its service blocks. Resolution results
/// are cached per connection id through the single-flight cache when one is
/// configured
pub struct TargetResolver<'a, TRepo, TWallet, TStorage, TLedger, TCache>
where
    TRepo: RepoBuilder,
    TWallet: WalletBuilder,
    TStorage: StorageBuilder,
    TLedger: LedgerBuilder,
    TCache: CacheBuilder,
{
    repo: &'a TRepo,
    wallet: &'a TWallet,
    store: &'a DocumentStore<TStorage>,
    ledger: Option<&'a TLedger>,
    cache: Option<&'a TCache>,
}

impl<'a, TRepo, TWallet, TStorage, TLedger, TCache>
    TargetResolver<'a, TRepo, TWallet, TStorage, TLedger, TCache>
where
    TRepo: RepoBuilder,
    TWallet: WalletBuilder,
    TStorage: StorageBuilder,
    TLedger: LedgerBuilder,
    TCache: CacheBuilder,
{
    pub fn new(
        repo: &'a TRepo,
        wallet: &'a TWallet,
        store: &'a DocumentStore<TStorage>,
        ledger: Option<&'a TLedger>,
        cache: Option<&'a TCache>,
    ) -> Self {
        Self {
            repo,
            wallet,
            store,
            ledger,
            cache,
        }
    }

    /// Resolve delivery targets for `record`, going through the cache when one
    /// is configured
    pub async fn get_connection_targets(
        &self,
        record: &TRepo::EntityAccessor,
    ) -> Result<Vec<ConnectionTarget>, ConnectionError> {
        let cache = match self.cache {
            Some(cache) => cache,
            None => return self.fetch_connection_targets(record).await,
        };

        let connection_id: String = record.get_connection_id().into();
        let cache_key = format!("connection_target::{}", connection_id);

        match cache.acquire(cache_key.to_owned()).await? {
            Some(value) => {
                cache.release(cache_key).await?;
                serde_json::from_value(value)
                    .map_err(|err| ConnectionError::EntityError(err.to_string()))
            }
            None => {
                let targets = match self.fetch_connection_targets(record).await {
                    Ok(targets) => targets,
                    Err(err) => {
                        if let Err(release_err) = cache.release(cache_key).await {
                            warn!("unable to release cache slot: {}", release_err);
                        }
                        return Err(err);
                    }
                };

                let value = serde_json::to_value(&targets)
                    .map_err(|err| ConnectionError::EntityError(err.to_string()))?;
                cache.set_result(cache_key, value, CACHE_TTL_SECS).await?;
                Ok(targets)
            }
        }
    }

    /// Compute delivery targets for `record` without consulting the cache
    pub async fn fetch_connection_targets(
        &self,
        record: &TRepo::EntityAccessor,
    ) -> Result<Vec<ConnectionTarget>, ConnectionError> {
        let my_did = match record.get_my_did() {
            Some(did) => did,
            None => {
                debug!("connection has no local DID, no targets");
                return Ok(Vec::new());
            }
        };
        let my_info = self.wallet.get_local_did(my_did).await?;

        // before their document arrived, the invitation is all we have
        let early_state = matches!(record.get_state(), State::Invitation | State::Request);
        if early_state && record.get_their_role() == Role::Responder {
            let connection_id: String = record.get_connection_id().into();
            let invitation = self.repo.retrieve_invitation(connection_id).await?;

            return match invitation.get_kind() {
                InvitationKind::Did { did } => {
                    self.resolve_public_targets(did.to_owned(), invitation.get_label(), my_info.verkey)
                        .await
                }
                InvitationKind::Inline {
                    recipient_keys,
                    endpoint,
                    routing_keys,
                } => Ok(vec![ConnectionTarget {
                    did: record.get_their_did(),
                    endpoint: Some(endpoint.to_owned()),
                    label: invitation.get_label(),
                    recipient_keys: recipient_keys.to_owned(),
                    routing_keys: routing_keys.to_owned(),
                    sender_key: Some(my_info.verkey),
                }]),
            };
        }

        let their_did = match record.get_their_did() {
            Some(did) => did,
            None => {
                debug!("connection has no remote DID, no targets");
                return Ok(Vec::new());
            }
        };
        let doc = self.store.fetch(their_did).await?;

        self.diddoc_connection_targets(&doc, my_info.verkey, record.get_their_label())
    }

    /// Map a stored document's service blocks to delivery targets
    pub fn diddoc_connection_targets(
        &self,
        doc: &DIDDocument,
        sender_verkey: String,
        their_label: Option<String>,
    ) -> Result<Vec<ConnectionTarget>, ConnectionError> {
        if doc.did.is_empty() {
            return Err(ConnectionError::management(
                "DID document has no DID",
            ));
        }
        if doc.service.is_empty() {
            return Err(ConnectionError::management(
                "no services defined by DID document",
            ));
        }

        let targets = doc
            .service
            .iter()
            .filter(|service| !service.recipient_keys.is_empty())
            .map(|service| ConnectionTarget {
                did: Some(doc.did.to_owned()),
                endpoint: Some(service.endpoint.to_owned()),
                label: their_label.to_owned(),
                recipient_keys: service.recipient_keys.to_owned(),
                routing_keys: service.routing_keys.to_owned(),
                sender_key: Some(sender_verkey.to_owned()),
            })
            .collect();

        Ok(targets)
    }

    async fn resolve_public_targets(
        &self,
        did: String,
        label: Option<String>,
        sender_verkey: String,
    ) -> Result<Vec<ConnectionTarget>, ConnectionError> {
        let ledger = self.ledger.ok_or(ConnectionError::ConfigError(
            "no ledger configured to resolve public invitation".to_string(),
        ))?;

        let recipient_key = ledger
            .get_key_for_did(did.to_owned())
            .await?
            .ok_or(ConnectionError::management(format!(
                "unable to resolve key for DID: {}",
                did
            )))?;
        let endpoint = ledger.get_endpoint_for_did(did.to_owned()).await?;

        Ok(vec![ConnectionTarget {
            did: Some(did),
            endpoint,
            label,
            recipient_keys: vec![recipient_key],
            routing_keys: Vec::new(),
            sender_key: Some(sender_verkey),
        }])
    }
}

use rst_common::standard::serde::{self, Deserialize, Serialize};
use rst_common::standard::serde_json;
use rst_common::with_logging::log::{debug, warn};

use crate::base::cache::{CacheBuilder, CACHE_TTL_SECS};
use crate::base::storage::{StorageBuilder, StorageError};
use crate::base::wallet::{WalletBuilder, WalletError};
use crate::diddoc::store::DocumentStore;

use super::receipt::MessageReceipt;
use super::record::ConnRecord;
use super::types::{ConnectionEntityAccessor, ConnectionError, RepoBuilder, Role, State};

/// Cached resolution result for a (sender, recipient) verkey pair
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
struct InboundCacheEntry {
    connection_id: String,
    sender_did: Option<String>,
    recipient_did: Option<String>,
    recipient_did_public: bool,
}

/// `InboundResolver` maps an unpacked inbound message back to the connection
/// record it belongs to
///
/// The sender's verification key resolves to their `DID` through the document
/// store index; the recipient's key resolves to our `DID` through the wallet.
/// A record found at [`State::Response`] is promoted to [`State::Completed`]:
/// traffic from the other party proves they accepted our response
pub struct InboundResolver<'a, TRepo, TWallet, TStorage, TCache>
where
    TRepo: RepoBuilder<EntityAccessor = ConnRecord>,
    TWallet: WalletBuilder,
    TStorage: StorageBuilder,
    TCache: CacheBuilder,
{
    repo: &'a TRepo,
    wallet: &'a TWallet,
    store: &'a DocumentStore<TStorage>,
    cache: Option<&'a TCache>,
}

impl<'a, TRepo, TWallet, TStorage, TCache> InboundResolver<'a, TRepo, TWallet, TStorage, TCache>
where
    TRepo: RepoBuilder<EntityAccessor = ConnRecord>,
    TWallet: WalletBuilder,
    TStorage: StorageBuilder,
    TCache: CacheBuilder,
{
    pub fn new(
        repo: &'a TRepo,
        wallet: &'a TWallet,
        store: &'a DocumentStore<TStorage>,
        cache: Option<&'a TCache>,
    ) -> Self {
        Self {
            repo,
            wallet,
            store,
            cache,
        }
    }

    /// Resolve the connection behind `receipt`, going through the cache when
    /// one is configured and both verification keys are present
    pub async fn find_inbound_connection(
        &self,
        receipt: &mut MessageReceipt,
    ) -> Result<Option<ConnRecord>, ConnectionError> {
        let cache = match self.cache {
            Some(cache) => cache,
            None => return self.resolve_inbound_connection(receipt).await,
        };
        let (sender_verkey, recipient_verkey) =
            match (receipt.get_sender_verkey(), receipt.get_recipient_verkey()) {
                (Some(sender), Some(recipient)) => (sender, recipient),
                _ => return self.resolve_inbound_connection(receipt).await,
            };

        let cache_key = format!("connection_by_verkey::{}::{}", sender_verkey, recipient_verkey);

        match cache.acquire(cache_key.to_owned()).await? {
            Some(value) => {
                cache.release(cache_key).await?;
                let entry: InboundCacheEntry = serde_json::from_value(value)
                    .map_err(|err| ConnectionError::EntityError(err.to_string()))?;

                if let Some(did) = entry.sender_did.to_owned() {
                    receipt.set_sender_did(did);
                }
                if let Some(did) = entry.recipient_did.to_owned() {
                    receipt.set_recipient_did(did);
                }
                receipt.set_recipient_did_public(entry.recipient_did_public);

                let record = self.repo.retrieve_by_id(entry.connection_id).await?;
                Ok(Some(record))
            }
            None => {
                let resolved = match self.resolve_inbound_connection(receipt).await {
                    Ok(resolved) => resolved,
                    Err(err) => {
                        if let Err(release_err) = cache.release(cache_key).await {
                            warn!("unable to release cache slot: {}", release_err);
                        }
                        return Err(err);
                    }
                };

                match &resolved {
                    Some(record) => {
                        let entry = InboundCacheEntry {
                            connection_id: record.get_connection_id().into(),
                            sender_did: receipt.get_sender_did(),
                            recipient_did: receipt.get_recipient_did(),
                            recipient_did_public: receipt.is_recipient_did_public(),
                        };
                        let value = serde_json::to_value(&entry)
                            .map_err(|err| ConnectionError::EntityError(err.to_string()))?;
                        cache.set_result(cache_key, value, CACHE_TTL_SECS).await?;
                    }
                    None => {
                        cache.release(cache_key).await?;
                    }
                }

                Ok(resolved)
            }
        }
    }

    /// Resolve the receipt's verification keys to `DID`s and look the
    /// connection up with whatever resolved
    ///
    /// An unresolved sender `DID` is tolerated: before the other party's
    /// document arrived, the only handle on the record is the invitation key,
    /// which [`InboundResolver::find_connection`] falls back to
    pub async fn resolve_inbound_connection(
        &self,
        receipt: &mut MessageReceipt,
    ) -> Result<Option<ConnRecord>, ConnectionError> {
        if let Some(sender_verkey) = receipt.get_sender_verkey() {
            match self.store.find_did_for_key(sender_verkey).await {
                Ok(did) => receipt.set_sender_did(did),
                Err(StorageError::NotFound(_)) => {
                    debug!("no DID found for sender verkey");
                }
                Err(err) => return Err(err.into()),
            }
        }

        if let Some(recipient_verkey) = receipt.get_recipient_verkey() {
            match self.wallet.get_local_did_for_verkey(recipient_verkey).await {
                Ok(my_info) => {
                    receipt.set_recipient_did(my_info.did);
                    receipt.set_recipient_did_public(my_info.public);
                }
                Err(WalletError::NotFound(_)) => {
                    debug!("no local DID found for recipient verkey");
                }
                Err(err) => return Err(err.into()),
            }
        }

        self.find_connection(
            receipt.get_sender_did(),
            receipt.get_recipient_did(),
            receipt.get_recipient_verkey(),
            true,
        )
        .await
    }

    /// Look a connection up by `DID` pair, falling back to the invitation key
    /// when the pair resolves nothing
    ///
    /// With `auto_complete`, a record found at [`State::Response`] is promoted
    /// to [`State::Completed`] and saved
    pub async fn find_connection(
        &self,
        their_did: Option<String>,
        my_did: Option<String>,
        my_verkey: Option<String>,
        auto_complete: bool,
    ) -> Result<Option<ConnRecord>, ConnectionError> {
        let mut connection = None;
        if let Some(their_did) = their_did {
            match self.repo.retrieve_by_did(their_did, my_did).await {
                Ok(record) => connection = Some(record),
                Err(ConnectionError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }

        if let Some(record) = &mut connection {
            if record.get_state() == State::Response && auto_complete {
                record.transition(State::Completed)?;
                self.repo
                    .save(record, "Connection promoted to completed".to_string())
                    .await?;
            }
        }

        if connection.is_none() {
            if let Some(verkey) = my_verkey {
                match self
                    .repo
                    .retrieve_by_invitation_key(verkey, Role::Requester)
                    .await
                {
                    Ok(record) => connection = Some(record),
                    Err(ConnectionError::NotFound(_)) => {}
                    Err(err) => return Err(err),
                }
            }
        }

        Ok(connection)
    }
}

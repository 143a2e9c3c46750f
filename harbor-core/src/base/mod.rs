//! `base` collects the trait contracts for every external capability the domain
//! logic consumes: the wallet (key and `DID` storage), the generic tagged-record
//! storage, the ledger client, the cache and the outbound responder, plus the
//! static [`settings::Settings`] that gate optional behaviors.
//!
//! Implementations live outside this crate. Each contract carries its own error
//! type with a distinct `NotFound` variant so resolution paths can treat absence
//! as "no result" while precondition checks escalate it.
pub mod cache;
pub mod ledger;
pub mod responder;
pub mod settings;
pub mod storage;
pub mod wallet;

pub use cache::{CacheBuilder, CacheError};
pub use ledger::{LedgerBuilder, LedgerError};
pub use responder::{ResponderBuilder, ResponderError};
pub use settings::Settings;
pub use storage::{StorageBuilder, StorageError, StorageRecord};
pub use wallet::{DIDKey, WalletBuilder, WalletError};

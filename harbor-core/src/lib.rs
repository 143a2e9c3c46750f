//! `harbor-core` holds the domain logic of the `Harbor` agent, a decentralized
//! identity agent that establishes pairwise channels between peers through the
//! `DIDComm` connections protocol: `invitation -> request -> response -> completed`
//!
//! The crate is organized into three domains:
//!
//! - [`diddoc`] maintains `DID Document` construction, persistence and the reverse
//!   index from verification keys to their owning `DID`
//! - [`connections`] drives the connection-establishment state machine, resolves
//!   delivery targets for a connection and maps inbound messages back to their
//!   connection records
//! - [`mediation`] coordinates third-party message routing (mediators), tracking
//!   route activation and mediation grants and denials
//!
//! Every external capability the domains rely on, such as the persistent record
//! store, the wallet, the ledger client, the cache and the outbound responder, is
//! expressed as a trait contract in [`base`] and injected explicitly when a
//! component is constructed. The crate owns no storage, transport or cryptographic
//! implementation of its own.
pub mod base;
pub mod connections;
pub mod diddoc;
pub mod mediation;

//! `diddoc` maintains the `DID Document` model: building a self-describing
//! document for a local identity (including routing indirection through chained
//! router connections), persisting peer documents, and keeping the reverse index
//! from verification key to owning `DID`
pub mod builder;
pub mod doc;
pub mod store;

pub use builder::DocumentBuilder;
pub use doc::{DIDDocument, PublicKey, Service};
pub use store::DocumentStore;

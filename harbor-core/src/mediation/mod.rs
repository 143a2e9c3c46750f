//! `mediation` coordinates third-party message routing: activating inbound
//! routes through established router connections and handling the mediation
//! request/grant/deny exchange on both sides
pub mod coordinator;
pub mod messages;
pub mod record;
pub mod types;

pub use coordinator::RouteCoordinator;
pub use messages::{
    KeylistUpdate, KeylistUpdateAction, KeylistUpdateRule, MediationDeny, MediationGrant,
    MediationRequest,
};
pub use record::{MediationID, MediationRecord};
pub use types::{MediationError, MediationRepoBuilder, MediationRole, MediationState};

//! `connections` drives the pairwise connection-establishment state machine:
//! issuing and receiving invitations, exchanging requests and responses, and
//! promoting records to completion; plus the read paths that resolve delivery
//! targets for a connection and map inbound messages back to their records
pub mod inbound;
pub mod manager;
pub mod messages;
pub mod receipt;
pub mod record;
pub mod target;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use inbound::InboundResolver;
pub use manager::{ConnectionManager, CreateInvitationArgs, StaticConnectionArgs};
pub use messages::{
    ConnectionDetail, ConnectionRequest, ConnectionResponse, ConnectionSignature, Invitation,
    InvitationKind, ProblemReport, Thread,
};
pub use receipt::MessageReceipt;
pub use record::{ConnRecord, ConnRecordBuilder, ConnectionID};
pub use target::{ConnectionTarget, TargetResolver};
pub use types::{
    Accept, ConnectionEntityAccessor, ConnectionError, InvitationMode, ProblemReportReason,
    RepoBuilder, Role, RoutingState, State,
};

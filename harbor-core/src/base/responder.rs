use rst_common::standard::async_trait::async_trait;
use rst_common::standard::serde_json::Value;
use rst_common::with_errors::thiserror::{self, Error};

/// `ResponderError` covers outbound delivery failures
#[derive(Debug, PartialEq, Error, Clone)]
pub enum ResponderError {
    #[error("unable to send message: {0}")]
    SendFailure(String),
}

/// `ResponderBuilder` is the outbound message contract
///
/// Delivery is fire-and-forget from the domain's perspective; guarantees belong
/// to the transport layer. Messages are already-serialized protocol payloads
#[async_trait]
pub trait ResponderBuilder: Send + Sync {
    async fn send(&self, message: Value, connection_id: String) -> Result<(), ResponderError>;

    /// Send as a reply within the current exchange; when `connection_id` is
    /// absent the transport routes on the active inbound session
    async fn send_reply(
        &self,
        message: Value,
        connection_id: Option<String>,
    ) -> Result<(), ResponderError>;
}

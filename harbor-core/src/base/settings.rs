use rst_common::standard::serde::{self, Deserialize};

/// `Settings` are the static agent options gating optional protocol behavior
///
/// This replaces dynamic per-session setting lookups: the struct is built once
/// from configuration and injected into the components that need it
#[derive(Deserialize, Debug, Clone)]
#[serde(crate = "self::serde", default)]
pub struct Settings {
    /// Label attached to invitations and requests when no explicit one is given
    pub default_label: String,

    /// Endpoint advertised when the caller supplies none
    pub default_endpoint: Option<String>,

    /// Extra endpoints advertised alongside the default one
    pub additional_endpoints: Vec<String>,

    /// Allow invitations (and anonymous requests) against the public DID
    pub public_invites: bool,

    /// Automatically accept received invitations by creating a request
    pub auto_accept_invites: bool,

    /// Automatically accept received requests by creating a response
    pub auto_accept_requests: bool,

    /// Send a keylist update to the mediator when an invitation key is created
    pub auto_send_keylist_update_in_create_invitation: bool,

    /// Send a keylist update to the mediator when a request creates a local DID
    pub auto_send_keylist_update_in_requests: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_label: "harbor-agent".to_string(),
            default_endpoint: None,
            additional_endpoints: Vec::new(),
            public_invites: false,
            auto_accept_invites: false,
            auto_accept_requests: false,
            auto_send_keylist_update_in_create_invitation: false,
            auto_send_keylist_update_in_requests: false,
        }
    }
}

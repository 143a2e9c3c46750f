use rst_common::standard::serde::{self, Deserialize, Serialize};

/// `MessageReceipt` is the delivery context the transport layer attaches to an
/// unpacked inbound message: which verification keys it traveled between and,
/// once resolution ran, which `DID`s those keys belong to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct MessageReceipt {
    sender_verkey: Option<String>,

    recipient_verkey: Option<String>,

    sender_did: Option<String>,

    recipient_did: Option<String>,

    recipient_did_public: bool,
}

impl MessageReceipt {
    pub fn new(sender_verkey: Option<String>, recipient_verkey: Option<String>) -> Self {
        Self {
            sender_verkey,
            recipient_verkey,
            sender_did: None,
            recipient_did: None,
            recipient_did_public: false,
        }
    }

    pub fn get_sender_verkey(&self) -> Option<String> {
        self.sender_verkey.to_owned()
    }

    pub fn get_recipient_verkey(&self) -> Option<String> {
        self.recipient_verkey.to_owned()
    }

    pub fn get_sender_did(&self) -> Option<String> {
        self.sender_did.to_owned()
    }

    pub fn get_recipient_did(&self) -> Option<String> {
        self.recipient_did.to_owned()
    }

    pub fn is_recipient_did_public(&self) -> bool {
        self.recipient_did_public
    }

    pub fn set_sender_did(&mut self, did: String) {
        self.sender_did = Some(did);
    }

    pub fn set_recipient_did(&mut self, did: String) {
        self.recipient_did = Some(did);
    }

    pub fn set_recipient_did_public(&mut self, public: bool) {
        self.recipient_did_public = public;
    }
}

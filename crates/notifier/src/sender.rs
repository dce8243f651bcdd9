use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Wire encoding an address needs at the transport boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressClass {
    /// Person or group chat: plain text message.
    Direct,
    /// Broadcast channel: pre-encoded message frame.
    Broadcast,
}

impl AddressClass {
    pub fn classify(address: &str) -> Self {
        if address.ends_with("@newsletter") {
            AddressClass::Broadcast
        } else {
            AddressClass::Direct
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AddressClass::Direct => "direct",
            AddressClass::Broadcast => "broadcast",
        }
    }
}

/// Outbound side of the chat transport.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, address: &str, text: &str) -> Result<(), DeliveryError>;

    async fn send_encoded(
        &self,
        address: &str,
        payload: &[u8],
        class: AddressClass,
    ) -> Result<(), DeliveryError>;
}

/// Protobuf `Message { string conversation = 1; }` carrying `text`.
pub fn encode_conversation(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() + 6);
    // field 1, wire type 2 (length-delimited)
    out.push(0x0a);
    let mut len = bytes.len() as u64;
    loop {
        let byte = (len & 0x7f) as u8;
        len >>= 7;
        if len == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
    out.extend_from_slice(bytes);
    out
}

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;
use tracing::{debug, info};

use crate::{AddressClass, DeliveryError, MessageSender};

/// Sends through an HTTP bridge in front of the chat connection.
///
/// `POST {base}/send` with `{"to", "text"}` and `POST {base}/send-encoded`
/// with `{"to", "class", "payload"}` (payload base64).
pub struct HttpGatewaySender {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct PlainBody<'a> {
    to: &'a str,
    text: &'a str,
}

#[derive(Serialize)]
struct EncodedBody<'a> {
    to: &'a str,
    class: AddressClass,
    payload: String,
}

impl HttpGatewaySender {
    pub fn new(base_url: &str) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| DeliveryError::Transport(format!("failed to build http client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn post<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<(), DeliveryError> {
        let url = format!("{}/{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(format!("gateway request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        debug!(%url, "gateway accepted message");
        Ok(())
    }
}

#[async_trait]
impl MessageSender for HttpGatewaySender {
    async fn send(&self, address: &str, text: &str) -> Result<(), DeliveryError> {
        self.post("send", &PlainBody { to: address, text }).await
    }

    async fn send_encoded(
        &self,
        address: &str,
        payload: &[u8],
        class: AddressClass,
    ) -> Result<(), DeliveryError> {
        let body = EncodedBody {
            to: address,
            class,
            payload: BASE64.encode(payload),
        };
        self.post("send-encoded", &body).await
    }
}

/// Logs messages instead of sending them.
#[derive(Debug, Default)]
pub struct DryRunSender;

#[async_trait]
impl MessageSender for DryRunSender {
    async fn send(&self, address: &str, text: &str) -> Result<(), DeliveryError> {
        info!(%address, chars = text.chars().count(), "dry-run: would send message");
        Ok(())
    }

    async fn send_encoded(
        &self,
        address: &str,
        payload: &[u8],
        class: AddressClass,
    ) -> Result<(), DeliveryError> {
        info!(%address, bytes = payload.len(), class = class.as_str(), "dry-run: would send encoded frame");
        Ok(())
    }
}

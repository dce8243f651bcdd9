use std::time::Duration;

use futures::future::join_all;
use tracing::{error, info};

use crate::{encode_conversation, AddressClass, DeliveryError, MessageSender, Outgoing};

pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    /// `(address, error)` for every failed delivery.
    pub failed: Vec<(String, String)>,
}

/// Sends one message, choosing the wire encoding from the address class.
pub async fn deliver(
    sender: &dyn MessageSender,
    address: &str,
    text: &str,
    timeout: Duration,
) -> Result<(), DeliveryError> {
    let class = AddressClass::classify(address);
    let attempt = async {
        match class {
            AddressClass::Direct => sender.send(address, text).await,
            AddressClass::Broadcast => {
                let payload = encode_conversation(text);
                sender.send_encoded(address, &payload, class).await
            }
        }
    };
    tokio::time::timeout(timeout, attempt)
        .await
        .map_err(|_| DeliveryError::Timeout(timeout))?
}

/// Delivers the whole batch concurrently. A failure is logged and recorded
/// for its subscriber only.
pub async fn deliver_all(
    sender: &dyn MessageSender,
    batch: Vec<Outgoing>,
    timeout: Duration,
) -> DeliveryReport {
    let attempts = batch.iter().map(|message| async move {
        let result = deliver(sender, &message.address, &message.text, timeout).await;
        (message, result)
    });

    let mut report = DeliveryReport::default();
    for (message, result) in join_all(attempts).await {
        match result {
            Ok(()) => {
                info!(address = %message.address, items = message.item_count, "notification sent");
                report.delivered += 1;
            }
            Err(err) => {
                error!(address = %message.address, error = %err, "notification failed");
                report.failed.push((message.address.clone(), err.to_string()));
            }
        }
    }
    report
}

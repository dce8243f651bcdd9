//! Turns changed categories into per-subscriber messages and delivers them.

mod composer;
mod fanout;
mod gateway;
mod sender;

pub use composer::{is_interested, render_line, Composer, Outgoing, BANNER, FOOTER_PREFIX};
pub use fanout::{deliver, deliver_all, DeliveryReport, DEFAULT_DELIVERY_TIMEOUT};
pub use gateway::{DryRunSender, HttpGatewaySender};
pub use sender::{encode_conversation, AddressClass, DeliveryError, MessageSender};

//! Transport seam between the connection manager and the wire.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// Something that happened on an open link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportFrame {
    /// A text frame from the server.
    Text(String),
    /// The link reported an error. A `Closed` frame or the end of the stream
    /// follows.
    Error(String),
    /// The link closed.
    Closed(Option<String>),
}

/// An open, bidirectional link.
///
/// Dropping `outbound` closes the writing half; the transport ends the
/// `inbound` stream when the link goes away.
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<TransportFrame>,
}

impl TransportLink {
    /// Build a link together with the far-side ends of its channels.
    pub fn pair() -> (
        Self,
        mpsc::UnboundedSender<TransportFrame>,
        mpsc::UnboundedReceiver<String>,
    ) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        (Self { outbound, inbound }, inbound_tx, outbound_rx)
    }
}

/// Opens links to a push-event endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the handshake. An error means the handshake failed.
    async fn open(&self, url: &str) -> Result<TransportLink>;
}

//! WebSocket transport backed by tokio-tungstenite.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, warn};

use super::transport::{Transport, TransportFrame, TransportLink};
use crate::error::Result;

/// Opens WebSocket links. Text frames are forwarded as-is; binary frames are
/// forwarded when they are valid UTF-8. Ping/pong is answered by tungstenite.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, url: &str) -> Result<TransportLink> {
        let (ws_stream, _) = connect_async(url).await?;
        let (mut sink, mut stream) = ws_stream.split();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound) = mpsc::unbounded_channel::<TransportFrame>();

        // Writer: runs until the manager drops its sender.
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    warn!(error = %e, "Failed to send frame");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Reader: runs until the server closes or the manager drops its
        // receiver, which releases the read half straight away.
        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = inbound_tx.closed() => {
                        debug!("Link dropped, stopping reader");
                        return;
                    }
                    next = stream.next() => next,
                };
                let Some(result) = next else {
                    break;
                };
                let frame = match result {
                    Ok(Message::Text(text)) => TransportFrame::Text(text),
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => TransportFrame::Text(text),
                        Err(_) => {
                            debug!("Ignoring non-UTF-8 binary frame");
                            continue;
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        let reason = frame.map(|f| f.reason.to_string());
                        let _ = inbound_tx.send(TransportFrame::Closed(reason));
                        return;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = inbound_tx.send(TransportFrame::Error(e.to_string()));
                        break;
                    }
                };

                if inbound_tx.send(frame).is_err() {
                    return;
                }
            }
            let _ = inbound_tx.send(TransportFrame::Closed(None));
        });

        Ok(TransportLink { outbound, inbound })
    }
}

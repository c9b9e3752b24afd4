//! Scripted in-memory transport for tests and demos.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::transport::{Transport, TransportFrame, TransportLink};
use crate::error::{PipelineError, Result};

/// Outcome of one handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockOutcome {
    Accept,
    Refuse(String),
}

/// Far side of an accepted mock link.
pub struct MockPeer {
    to_client: mpsc::UnboundedSender<TransportFrame>,
    from_client: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl MockPeer {
    /// Push a text frame to the client. Returns false if the client is gone.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.to_client.send(TransportFrame::Text(text.into())).is_ok()
    }

    /// Report a link error to the client.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.to_client
            .send(TransportFrame::Error(reason.into()))
            .is_ok()
    }

    /// Close the link from the server side.
    pub fn close(&self) -> bool {
        self.to_client.send(TransportFrame::Closed(None)).is_ok()
    }

    /// Next message the client sent, if any.
    pub fn try_recv_sent(&self) -> Option<String> {
        self.from_client.lock().try_recv().ok()
    }
}

#[derive(Default)]
struct MockState {
    script: VecDeque<MockOutcome>,
    opens: Vec<Instant>,
    peers: Vec<Arc<MockPeer>>,
}

/// In-memory transport whose handshakes follow a script.
///
/// Outcomes are consumed in order; once the script runs out every handshake
/// gets `fallback`. Each open records the (Tokio) instant it happened so
/// tests can assert on backoff timing.
pub struct MockTransport {
    state: Mutex<MockState>,
    fallback: MockOutcome,
    handshake_delay: Duration,
}

impl MockTransport {
    /// Every handshake succeeds.
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self::with_fallback(MockOutcome::Accept))
    }

    /// Every handshake fails.
    pub fn refusing() -> Arc<Self> {
        Arc::new(Self::with_fallback(MockOutcome::Refuse(
            "connection refused".to_string(),
        )))
    }

    /// Follow `script`, then fall back to `fallback`.
    pub fn scripted(script: Vec<MockOutcome>, fallback: MockOutcome) -> Arc<Self> {
        let transport = Self::with_fallback(fallback);
        transport.state.lock().script = script.into();
        Arc::new(transport)
    }

    /// Every handshake succeeds after `delay`.
    pub fn slow(delay: Duration) -> Arc<Self> {
        let mut transport = Self::with_fallback(MockOutcome::Accept);
        transport.handshake_delay = delay;
        Arc::new(transport)
    }

    fn with_fallback(fallback: MockOutcome) -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            fallback,
            handshake_delay: Duration::ZERO,
        }
    }

    /// Number of handshakes attempted so far.
    pub fn open_count(&self) -> usize {
        self.state.lock().opens.len()
    }

    /// Instants at which handshakes were attempted.
    pub fn open_times(&self) -> Vec<Instant> {
        self.state.lock().opens.clone()
    }

    /// Peer of the most recently accepted link.
    pub fn last_peer(&self) -> Option<Arc<MockPeer>> {
        self.state.lock().peers.last().cloned()
    }

    /// Number of accepted links.
    pub fn peer_count(&self) -> usize {
        self.state.lock().peers.len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, _url: &str) -> Result<TransportLink> {
        let outcome = {
            let mut state = self.state.lock();
            state.opens.push(Instant::now());
            state
                .script
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone())
        };

        if !self.handshake_delay.is_zero() {
            tokio::time::sleep(self.handshake_delay).await;
        }

        match outcome {
            MockOutcome::Accept => {
                let (link, to_client, from_client) = TransportLink::pair();
                self.state.lock().peers.push(Arc::new(MockPeer {
                    to_client,
                    from_client: Mutex::new(from_client),
                }));
                Ok(link)
            }
            MockOutcome::Refuse(reason) => Err(PipelineError::Transport(reason)),
        }
    }
}

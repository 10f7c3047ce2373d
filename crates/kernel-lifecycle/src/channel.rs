//! Bidirectional message channel to a running kernel.
//!
//! A `KernelChannel` is the handle the coordinator holds: it can subscribe to
//! the inbound message sequence and enqueue outbound requests. The transport
//! (ZeroMQ bridge, in-memory fake) owns the matching `KernelSide`, delivering
//! inbound messages and draining outbound ones.

use std::sync::{Arc, OnceLock};

use log::warn;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};

use crate::error::ChannelError;
use crate::message::ProtocolMessage;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
enum Inbound {
    Message(ProtocolMessage),
    /// Terminal marker; `Some` carries a transport error.
    Closed(Option<String>),
}

struct InboundShared {
    tx: broadcast::Sender<Inbound>,
    terminal: OnceLock<Option<String>>,
}

/// Coordinator-side handle to one kernel's channel. Cheap to clone.
#[derive(Clone)]
pub struct KernelChannel {
    inbound: Arc<InboundShared>,
    outbound: mpsc::UnboundedSender<ProtocolMessage>,
}

/// Transport-side half of a channel.
pub struct KernelSide {
    pub inbound: InboundSender,
    pub outbound: OutboundReceiver,
}

impl KernelChannel {
    /// Create a connected channel handle and its transport half.
    pub fn pair(capacity: usize) -> (KernelChannel, KernelSide) {
        let (tx, _) = broadcast::channel(capacity.max(1));
        let inbound = Arc::new(InboundShared {
            tx,
            terminal: OnceLock::new(),
        });
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        let channel = KernelChannel {
            inbound: inbound.clone(),
            outbound: out_tx,
        };
        let side = KernelSide {
            inbound: InboundSender { shared: inbound },
            outbound: OutboundReceiver { rx: out_rx },
        };
        (channel, side)
    }

    /// Subscribe to inbound messages delivered from now on.
    ///
    /// The subscription is live as soon as this returns, so a request sent
    /// afterwards cannot have its reply slip past the listener.
    pub fn subscribe(&self) -> MessageStream {
        let rx = self.inbound.tx.subscribe();
        let done = self.inbound.terminal.get().is_some();
        MessageStream { rx, done }
    }

    /// Enqueue a message for the kernel.
    pub fn send(&self, message: ProtocolMessage) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Disconnected);
        }
        self.outbound
            .send(message)
            .map_err(|_| ChannelError::Disconnected)
    }

    pub fn is_closed(&self) -> bool {
        self.inbound.terminal.get().is_some()
    }

    /// Whether two handles point at the same underlying channel.
    pub fn same_channel(&self, other: &KernelChannel) -> bool {
        Arc::ptr_eq(&self.inbound, &other.inbound)
    }
}

impl std::fmt::Debug for KernelChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelChannel")
            .field("subscribers", &self.inbound.tx.receiver_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Delivers inbound messages to every current subscriber.
#[derive(Clone)]
pub struct InboundSender {
    shared: Arc<InboundShared>,
}

impl InboundSender {
    pub fn deliver(&self, message: ProtocolMessage) {
        if self.shared.terminal.get().is_some() {
            return;
        }
        // No subscribers is not an error; the message is simply unobserved.
        let _ = self.shared.tx.send(Inbound::Message(message));
    }

    /// Terminate the inbound sequence. Subsequent calls are ignored.
    pub fn close(&self, error: Option<String>) {
        if self.shared.terminal.set(error.clone()).is_ok() {
            let _ = self.shared.tx.send(Inbound::Closed(error));
        }
    }
}

/// Outbound queue drained by the transport.
pub struct OutboundReceiver {
    rx: mpsc::UnboundedReceiver<ProtocolMessage>,
}

impl OutboundReceiver {
    /// Next outbound message; `None` once every channel handle is dropped.
    pub async fn recv(&mut self) -> Option<ProtocolMessage> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ProtocolMessage> {
        self.rx.try_recv().ok()
    }
}

/// One subscriber's view of the inbound sequence.
pub struct MessageStream {
    rx: broadcast::Receiver<Inbound>,
    done: bool,
}

impl MessageStream {
    /// Next inbound message.
    ///
    /// Yields `Some(Err(_))` once if the transport failed, then `None`.
    pub async fn next(&mut self) -> Option<Result<ProtocolMessage, ChannelError>> {
        if self.done {
            return None;
        }
        loop {
            match self.rx.recv().await {
                Ok(Inbound::Message(message)) => return Some(Ok(message)),
                Ok(Inbound::Closed(error)) => {
                    self.done = true;
                    return error.map(|e| Err(ChannelError::Transport(e)));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("[channel] Subscriber lagged, skipped {} messages", skipped);
                }
                Err(RecvError::Closed) => {
                    self.done = true;
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::STATUS;
    use serde_json::json;

    #[tokio::test]
    async fn test_subscribers_receive_delivered_messages() {
        let (channel, side) = KernelChannel::pair(16);
        let mut a = channel.subscribe();
        let mut b = channel.subscribe();

        let msg = ProtocolMessage::request(STATUS, json!({"execution_state": "idle"}));
        side.inbound.deliver(msg.clone());

        assert_eq!(a.next().await.unwrap().unwrap(), msg);
        assert_eq!(b.next().await.unwrap().unwrap(), msg);
    }

    #[tokio::test]
    async fn test_send_reaches_outbound_queue() {
        let (channel, mut side) = KernelChannel::pair(16);
        let request = ProtocolMessage::kernel_info_request();
        channel.send(request.clone()).unwrap();
        assert_eq!(side.outbound.recv().await, Some(request));
    }

    #[tokio::test]
    async fn test_clean_close_ends_stream() {
        let (channel, side) = KernelChannel::pair(16);
        let mut stream = channel.subscribe();
        side.inbound.close(None);

        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
        assert!(channel.is_closed());
        assert_eq!(
            channel.send(ProtocolMessage::kernel_info_request()),
            Err(ChannelError::Disconnected)
        );
    }

    #[tokio::test]
    async fn test_transport_error_surfaces_once() {
        let (channel, side) = KernelChannel::pair(16);
        let mut stream = channel.subscribe();
        side.inbound.close(Some("socket reset".to_string()));

        assert_eq!(
            stream.next().await,
            Some(Err(ChannelError::Transport("socket reset".to_string())))
        );
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_subscribe_after_close_is_empty() {
        let (channel, side) = KernelChannel::pair(16);
        side.inbound.close(None);
        side.inbound.deliver(ProtocolMessage::kernel_info_request());

        let mut late = channel.subscribe();
        assert!(late.next().await.is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber_skips_ahead() {
        let (channel, side) = KernelChannel::pair(2);
        let mut stream = channel.subscribe();
        for state in ["busy", "idle", "busy", "idle"] {
            side.inbound
                .deliver(ProtocolMessage::request(STATUS, json!({"execution_state": state})));
        }

        let next = stream.next().await.unwrap().unwrap();
        assert_eq!(next.execution_state(), Some("busy"));
        let next = stream.next().await.unwrap().unwrap();
        assert_eq!(next.execution_state(), Some("idle"));
    }

    #[test]
    fn test_same_channel() {
        let (a, _side_a) = KernelChannel::pair(4);
        let (b, _side_b) = KernelChannel::pair(4);
        assert!(a.same_channel(&a.clone()));
        assert!(!a.same_channel(&b));
    }
}

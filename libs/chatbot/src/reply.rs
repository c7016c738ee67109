use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use wab_core::CanonicalId;

/// A chatbot reply headed back out through the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundReply {
    pub instance: String,
    pub participant: CanonicalId,
    /// Already converted to transport markup.
    pub text: String,
}

/// Where the coordinator hands chatbot replies for re-injection as outbound
/// transport events.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send(&self, reply: OutboundReply) -> Result<()>;
}

/// Channel-backed reply sink; the consumer side feeds the transport's
/// outbound path.
pub struct ChannelReplySink {
    tx: mpsc::UnboundedSender<OutboundReply>,
}

impl ChannelReplySink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundReply>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ReplySink for ChannelReplySink {
    async fn send(&self, reply: OutboundReply) -> Result<()> {
        self.tx
            .send(reply)
            .map_err(|_| anyhow::anyhow!("outbound reply channel closed"))
    }
}

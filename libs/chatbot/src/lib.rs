//! Chatbot integration layer: the backend contract implemented by each
//! external chatbot, a registry of live backends keyed by integration kind,
//! and the coordinator that drives the per-conversation session state
//! machine.

mod coordinator;
mod http;
mod registry;
mod reply;
mod settings;

use anyhow::Result;
use async_trait::async_trait;

pub use coordinator::{CoordinatorError, SessionCoordinator, TurnOutcome};
pub use http::HttpChatbotBackend;
pub use registry::IntegrationRegistry;
pub use reply::{ChannelReplySink, OutboundReply, ReplySink};
pub use settings::ChatbotSettings;

/// Contract implemented by every external chatbot backend.
///
/// One implementation exists per integration kind; the coordinator selects
/// it from the [`IntegrationRegistry`] at dispatch time. The backend owns
/// its own wire protocol; the gateway only relies on this surface.
///
/// Message text crossing this boundary is in the helpdesk markdown dialect,
/// for every integration kind: the coordinator converts inbound transport
/// markup before calling these methods and converts replies back before
/// re-injection. A backend whose native dialect differs converts internally.
#[async_trait]
pub trait ChatbotBackend: Send + Sync {
    /// Opens a new conversation for the participant and delivers the first
    /// message. Returns the backend's conversation reference.
    async fn start_conversation(
        &self,
        instance: &str,
        participant: &str,
        message: &str,
    ) -> Result<String>;

    /// Delivers a message into an existing conversation. Returns the
    /// backend's immediate reply, if it produced one.
    async fn continue_conversation(
        &self,
        external_ref: &str,
        message: &str,
    ) -> Result<Option<String>>;

    /// Tells the backend the conversation is over.
    async fn close_conversation(&self, external_ref: &str) -> Result<()>;
}

//! Canonical participant identifier resolution.
//!
//! Raw transport payloads carry up to three addressing fields, each of which
//! may be absent:
//!
//! - `key.remoteJid`: the source identifier of the conversation;
//! - `sender`: the sender identifier;
//! - `senderPhone`: a bare phone number, possibly with a leading `+`.
//!
//! The precedence below is load-bearing: a qualified address must always win
//! over a bare phone number, otherwise the same human ends up split across
//! two session records.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::RoutingError;

static QUALIFIED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9A-Za-z_.:-]+@(g\.us|lid|s\.whatsapp\.net)$").unwrap()
});
static PHONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?[0-9]{5,}$").unwrap());

/// Address family of a canonical identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddressKind {
    Group,
    LinkedDevice,
    Direct,
    Phone,
}

/// The preferred routable address for a conversation participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalId(String);

impl CanonicalId {
    /// Wraps an already-normalized identifier, e.g. one read back from
    /// storage. Event intake should go through [`canonical_participant`].
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> AddressKind {
        if self.0.ends_with("@g.us") {
            AddressKind::Group
        } else if self.0.ends_with("@lid") {
            AddressKind::LinkedDevice
        } else if self.0.ends_with("@s.whatsapp.net") {
            AddressKind::Direct
        } else {
            AddressKind::Phone
        }
    }
}

impl std::fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves the canonical routable identifier from a raw event payload.
///
/// Fixed precedence, first match wins:
/// 1. `key.remoteJid` when it is a qualified address (group, linked device,
///    or direct session);
/// 2. `sender` when it is a qualified address;
/// 3. `senderPhone` with any leading `+` stripped;
/// 4. otherwise [`RoutingError::Unroutable`]: the event is dropped from
///    chatbot routing but still offered to the other sinks.
pub fn canonical_participant(payload: &Value) -> Result<CanonicalId, RoutingError> {
    let source = payload
        .get("key")
        .and_then(|k| k.get("remoteJid"))
        .and_then(|v| v.as_str());
    if let Some(id) = source.filter(|s| QUALIFIED.is_match(s)) {
        return Ok(CanonicalId(id.to_string()));
    }

    let sender = payload.get("sender").and_then(|v| v.as_str());
    if let Some(id) = sender.filter(|s| QUALIFIED.is_match(s)) {
        return Ok(CanonicalId(id.to_string()));
    }

    let phone = payload.get("senderPhone").and_then(|v| v.as_str());
    if let Some(number) = phone.filter(|p| PHONE.is_match(p)) {
        return Ok(CanonicalId(number.trim_start_matches('+').to_string()));
    }

    Err(RoutingError::Unroutable)
}

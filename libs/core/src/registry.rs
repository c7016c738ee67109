use anyhow::{bail, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::info;

use crate::types::{InstanceState, SinkConfig, SinkKind, TransportKind};

/// One tenant's WhatsApp connection context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    pub transport: TransportKind,
    pub state: InstanceState,
    pub sinks: Vec<SinkConfig>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen: OffsetDateTime,
}

impl Instance {
    /// Sinks the dispatcher should attempt on the next fan-out.
    pub fn enabled_sinks(&self) -> Vec<SinkConfig> {
        self.sinks.iter().filter(|s| s.enabled).cloned().collect()
    }

    pub fn sink(&self, kind: SinkKind) -> Option<&SinkConfig> {
        self.sinks.iter().find(|s| s.kind == kind)
    }
}

/// Shared registry of provisioned instances.
#[derive(Default)]
pub struct InstanceRegistry {
    instances: DashMap<String, Instance>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new instance in `Connecting` state.
    pub fn provision(
        &self,
        name: impl Into<String>,
        transport: TransportKind,
        sinks: Vec<SinkConfig>,
    ) -> Result<Instance> {
        let name = name.into();
        if self.instances.contains_key(&name) {
            bail!("instance {name} already provisioned");
        }
        let now = OffsetDateTime::now_utc();
        let instance = Instance {
            name: name.clone(),
            transport,
            state: InstanceState::Connecting,
            sinks,
            created_at: now,
            last_seen: now,
        };
        self.instances.insert(name.clone(), instance.clone());
        info!(instance = %name, transport = %transport.as_str(), "instance provisioned");
        Ok(instance)
    }

    pub fn get(&self, name: &str) -> Option<Instance> {
        self.instances.get(name).map(|entry| entry.value().clone())
    }

    /// Whether the instance should accept new events. Disconnecting an
    /// instance stops intake while in-flight deliveries finish on their own.
    pub fn accepting(&self, name: &str) -> bool {
        self.instances
            .get(name)
            .map(|entry| entry.state == InstanceState::Connected)
            .unwrap_or(false)
    }

    pub fn set_state(&self, name: &str, state: InstanceState) {
        if let Some(mut entry) = self.instances.get_mut(name) {
            entry.state = state;
            entry.last_seen = OffsetDateTime::now_utc();
        }
    }

    /// Replaces the sink set; takes effect on the next dispatch.
    pub fn set_sinks(&self, name: &str, sinks: Vec<SinkConfig>) {
        if let Some(mut entry) = self.instances.get_mut(name) {
            entry.sinks = sinks;
        }
    }

    /// Removes the instance, returning it so callers can tear down sessions.
    pub fn remove(&self, name: &str) -> Option<Instance> {
        self.instances.remove(name).map(|(_, instance)| instance)
    }

    /// Marks instances disconnected for longer than `ttl` as expired and
    /// removes them, returning the expired set.
    pub fn sweep_expired(&self, now: OffsetDateTime, ttl: Duration) -> Vec<Instance> {
        let expired: Vec<String> = self
            .instances
            .iter()
            .filter(|entry| {
                entry.state == InstanceState::Disconnected && now - entry.last_seen > ttl
            })
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = Vec::with_capacity(expired.len());
        for name in expired {
            if let Some(mut entry) = self.instances.get_mut(&name) {
                entry.state = InstanceState::Expired;
            }
            if let Some((_, instance)) = self.instances.remove(&name) {
                info!(instance = %name, "instance expired");
                removed.push(instance);
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webhook_sink() -> SinkConfig {
        let mut cfg = SinkConfig::new(SinkKind::Webhook);
        cfg.endpoint = Some("https://example.com/hook".into());
        cfg
    }

    #[test]
    fn provision_rejects_duplicates() {
        let registry = InstanceRegistry::new();
        registry
            .provision("acme", TransportKind::WebSession, vec![])
            .unwrap();
        assert!(registry
            .provision("acme", TransportKind::BusinessApi, vec![])
            .is_err());
    }

    #[test]
    fn accepting_requires_connected_state() {
        let registry = InstanceRegistry::new();
        registry
            .provision("acme", TransportKind::WebSession, vec![webhook_sink()])
            .unwrap();
        assert!(!registry.accepting("acme"));
        registry.set_state("acme", InstanceState::Connected);
        assert!(registry.accepting("acme"));
        registry.set_state("acme", InstanceState::Disconnected);
        assert!(!registry.accepting("acme"));
    }

    #[test]
    fn enabled_sinks_filters_disabled() {
        let mut disabled = SinkConfig::new(SinkKind::Queue);
        disabled.enabled = false;
        let registry = InstanceRegistry::new();
        let instance = registry
            .provision("acme", TransportKind::WebSession, vec![webhook_sink(), disabled])
            .unwrap();
        let enabled = instance.enabled_sinks();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].kind, SinkKind::Webhook);
    }

    #[test]
    fn sweep_removes_long_disconnected_instances() {
        let registry = InstanceRegistry::new();
        registry
            .provision("stale", TransportKind::WebSession, vec![])
            .unwrap();
        registry.set_state("stale", InstanceState::Disconnected);

        let later = OffsetDateTime::now_utc() + Duration::hours(2);
        let expired = registry.sweep_expired(later, Duration::hours(1));
        assert_eq!(expired.len(), 1);
        assert!(registry.get("stale").is_none());
    }

    #[test]
    fn sweep_keeps_recently_seen_instances() {
        let registry = InstanceRegistry::new();
        registry
            .provision("fresh", TransportKind::WebSession, vec![])
            .unwrap();
        registry.set_state("fresh", InstanceState::Disconnected);

        let soon = OffsetDateTime::now_utc() + Duration::minutes(5);
        let expired = registry.sweep_expired(soon, Duration::hours(1));
        assert!(expired.is_empty());
        assert!(registry.get("fresh").is_some());
    }
}

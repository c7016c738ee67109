//! Core types shared across the wabridge gateway: the routed event envelope,
//! sink configuration, the canonical participant identifier, and the
//! per-tenant instance registry.

mod canonical;
mod errors;
mod registry;
mod subjects;
mod types;

pub use canonical::{canonical_participant, AddressKind, CanonicalId};
pub use errors::RoutingError;
pub use registry::{Instance, InstanceRegistry};
pub use subjects::event_subject;
pub use types::{
    EventKind, IntegrationKind, RoutedEvent, SinkConfig, SinkKind, TransportKind,
};
pub use types::InstanceState;

use thiserror::Error;

/// Errors raised while deciding where an event may be routed.
#[derive(Debug, Error)]
pub enum RoutingError {
    /// No canonical identifier could be derived from the payload. The event
    /// is dropped from chatbot routing but still offered to the other sinks.
    #[error("no routable participant identifier in event payload")]
    Unroutable,

    /// The session store cannot be read or written at all. Fatal for this
    /// event's chatbot routing only.
    #[error("session store unavailable: {0}")]
    StoreUnavailable(String),

    /// The target instance does not exist or is not accepting events.
    #[error("instance {0} is not accepting events")]
    InstanceUnavailable(String),
}

use crate::types::EventKind;

/// Queue subject for routed events: `wab.evt.{instance}.{kind}`.
///
/// ```
/// use wab_core::{event_subject, EventKind};
///
/// assert_eq!(
///     event_subject("acme", EventKind::MessageReceived),
///     "wab.evt.acme.message_received"
/// );
/// ```
pub fn event_subject(instance: &str, kind: EventKind) -> String {
    format!("wab.evt.{}.{}", instance, kind.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_embeds_instance_and_kind() {
        assert_eq!(
            event_subject("tenant-1", EventKind::ConnectionUpdate),
            "wab.evt.tenant-1.connection_update"
        );
    }
}

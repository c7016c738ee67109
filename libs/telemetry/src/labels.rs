/// Label set attached to every metric emitted by the gateway.
#[derive(Debug, Clone)]
pub struct TelemetryLabels {
    pub instance: String,
    pub sink: Option<String>,
    pub participant: Option<String>,
    pub event_id: Option<String>,
    pub extra: Vec<(String, String)>,
}

impl TelemetryLabels {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            sink: None,
            participant: None,
            event_id: None,
            extra: Vec::new(),
        }
    }

    pub fn tags(&self) -> Vec<(String, String)> {
        let mut tags = Vec::with_capacity(4 + self.extra.len());
        tags.push(("instance".into(), self.instance.clone()));
        if let Some(sink) = &self.sink {
            tags.push(("sink".into(), sink.clone()));
        }
        if let Some(participant) = &self.participant {
            tags.push(("participant".into(), participant.clone()));
        }
        if let Some(event_id) = &self.event_id {
            tags.push(("event_id".into(), event_id.clone()));
        }
        for (key, value) in &self.extra {
            tags.push((key.clone(), value.clone()));
        }
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_include_optional_fields_in_order() {
        let mut labels = TelemetryLabels::new("acme");
        labels.sink = Some("queue".into());
        labels.extra.push(("stage".into(), "dispatch".into()));
        let tags = labels.tags();
        assert_eq!(tags[0], ("instance".into(), "acme".into()));
        assert_eq!(tags[1], ("sink".into(), "queue".into()));
        assert_eq!(tags[2], ("stage".into(), "dispatch".into()));
    }
}

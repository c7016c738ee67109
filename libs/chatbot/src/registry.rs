use std::sync::Arc;

use dashmap::DashMap;
use wab_core::IntegrationKind;

use crate::ChatbotBackend;

/// Registry of live chatbot backends keyed by integration kind.
///
/// Integrations are independent variant types behind the
/// [`ChatbotBackend`](crate::ChatbotBackend) trait; there is no inheritance
/// hierarchy to walk, only this lookup.
#[derive(Default, Clone)]
pub struct IntegrationRegistry {
    backends: Arc<DashMap<IntegrationKind, Arc<dyn ChatbotBackend>>>,
}

impl IntegrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, kind: IntegrationKind, backend: Arc<dyn ChatbotBackend>) {
        self.backends.insert(kind, backend);
    }

    pub fn get(&self, kind: IntegrationKind) -> Option<Arc<dyn ChatbotBackend>> {
        self.backends.get(&kind).map(|entry| entry.value().clone())
    }

    pub fn kinds(&self) -> Vec<IntegrationKind> {
        self.backends.iter().map(|entry| *entry.key()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

use crate::core::metadata::InterceptorMetadata;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Process-wide table of interceptor types, keyed by name.
///
/// Append-only: a name is registered once and never replaced or removed.
/// The registry is an explicit object, shared through an `Arc` with every
/// [`EndpointInvoker`](crate::core::invoker::EndpointInvoker) that assembles
/// chains from it.
#[derive(Debug, Default)]
pub struct InterceptorRegistry {
    interceptors: RwLock<HashMap<String, Arc<InterceptorMetadata>>>,
}

impl InterceptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an interceptor type.
    ///
    /// Returns `false`, leaving the first registration in place, when the
    /// name is already taken.
    pub fn register(&self, metadata: InterceptorMetadata) -> bool {
        let mut interceptors = self.interceptors.write();
        if interceptors.contains_key(metadata.name()) {
            log::warn!(
                "duplicated interceptor definition '{}' ignored",
                metadata.name()
            );
            return false;
        }
        log::debug!(
            "registered interceptor '{}' ({})",
            metadata.name(),
            metadata.interaction_style()
        );
        interceptors.insert(metadata.name().to_string(), Arc::new(metadata));
        true
    }

    pub fn get(&self, name: &str) -> Option<Arc<InterceptorMetadata>> {
        let found = self.interceptors.read().get(name).cloned();
        if found.is_none() {
            log::debug!("missing interceptor '{}' in registry", name);
        }
        found
    }

    pub fn contains(&self, name: &str) -> bool {
        self.interceptors.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.interceptors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.read().is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.interceptors.read().keys().cloned().collect();
        names.sort();
        names
    }
}

//! Runtime response overrides.

use crate::endpoint::HttpMethod;
use crate::response::CompiledResponse;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Identifies the (server, url, method) triple a substitution replaces.
///
/// `url` is either a concrete request path or an endpoint's URL pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubstitutionKey {
    pub server_name: String,
    pub url: String,
    pub method: HttpMethod,
}

impl SubstitutionKey {
    pub fn new(server_name: impl Into<String>, url: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            server_name: server_name.into(),
            url: url.into(),
            method,
        }
    }
}

impl fmt::Display for SubstitutionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} on {}", self.method, self.url, self.server_name)
    }
}

#[derive(Debug, Default)]
pub struct SubstitutionStore {
    entries: RwLock<HashMap<SubstitutionKey, Arc<CompiledResponse>>>,
}

impl SubstitutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the substitution for `key`
    pub fn add(&self, key: SubstitutionKey, response: CompiledResponse) {
        info!("Substitution added for {}", key);
        self.entries.write().insert(key, Arc::new(response));
    }

    pub fn get(&self, key: &SubstitutionKey) -> Option<Arc<CompiledResponse>> {
        self.entries.read().get(key).cloned()
    }

    /// Remove the substitution for `key`; returns whether one existed
    pub fn delete(&self, key: &SubstitutionKey) -> bool {
        let removed = self.entries.write().remove(key).is_some();
        if removed {
            info!("Substitution removed for {}", key);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

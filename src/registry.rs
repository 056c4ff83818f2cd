//! Process-wide document registry.
//!
//! Populated once per document while it is built and read-only afterwards.
//! The registry exists for diagnostics and lookup by declaration-time
//! tooling; compilation never consults it, since the graph carries direct
//! references.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::document::Document;

static REGISTRY: OnceLock<RwLock<BTreeMap<String, Arc<Document>>>> = OnceLock::new();

fn store() -> &'static RwLock<BTreeMap<String, Arc<Document>>> {
    REGISTRY.get_or_init(|| RwLock::new(BTreeMap::new()))
}

/// Insert-or-replace a freshly built document under its qualified name.
///
/// The strong reference held here also keeps declared documents alive for
/// the lifetime of the process, so the weak links inside document
/// reference fields stay resolvable.
pub(crate) fn register(document: &Arc<Document>) {
    let mut map = store().write().unwrap_or_else(|e| e.into_inner());
    map.insert(document.qualified_name(), Arc::clone(document));
}

/// Look up a document by module and name.
pub fn lookup(module: &str, name: &str) -> Option<Arc<Document>> {
    lookup_qualified(&format!("{}.{}", module, name))
}

/// Look up a document by qualified name (`<module>.<name>`).
pub fn lookup_qualified(qualified_name: &str) -> Option<Arc<Document>> {
    let map = store().read().unwrap_or_else(|e| e.into_inner());
    map.get(qualified_name).cloned()
}

/// Every registered document, ordered by qualified name.
pub fn documents() -> Vec<Arc<Document>> {
    let map = store().read().unwrap_or_else(|e| e.into_inner());
    map.values().cloned().collect()
}

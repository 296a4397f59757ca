use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use crate::schema::types::{Schema, TypeDefinition};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("namespace not found: {0}")]
    NotFound(String),
    #[error("namespace lookup failed: {0}")]
    Internal(String),
}

/// Looks up namespace definitions by name.
///
/// A traversal may resolve the same namespace many times, so lookups must be
/// idempotent reads.
pub trait NamespaceResolver: Send + Sync {
    fn lookup_namespace(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Arc<TypeDefinition>, ResolveError>> + Send;
}

/// Resolves namespaces from an already-parsed schema.
#[derive(Debug, Clone)]
pub struct SchemaResolver {
    definitions: HashMap<String, Arc<TypeDefinition>>,
}

impl SchemaResolver {
    pub fn new(schema: &Schema) -> Self {
        Self {
            definitions: schema
                .types
                .iter()
                .map(|t| (t.name.clone(), Arc::new(t.clone())))
                .collect(),
        }
    }
}

impl NamespaceResolver for SchemaResolver {
    async fn lookup_namespace(&self, name: &str) -> Result<Arc<TypeDefinition>, ResolveError> {
        self.definitions
            .get(name)
            .cloned()
            .ok_or_else(|| ResolveError::NotFound(name.to_string()))
    }
}

/// Memoizes successful lookups of an inner resolver by namespace name.
///
/// Failed lookups are not cached.
#[derive(Debug)]
pub struct CachingResolver<R> {
    inner: R,
    cache: Mutex<HashMap<String, Arc<TypeDefinition>>>,
}

impl<R: NamespaceResolver> CachingResolver<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached_count(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn cached(&self, name: &str) -> Option<Arc<TypeDefinition>> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn store(&self, name: &str, definition: &Arc<TypeDefinition>) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Arc::clone(definition));
    }
}

impl<R: NamespaceResolver> NamespaceResolver for CachingResolver<R> {
    async fn lookup_namespace(&self, name: &str) -> Result<Arc<TypeDefinition>, ResolveError> {
        if let Some(definition) = self.cached(name) {
            return Ok(definition);
        }

        let definition = self.inner.lookup_namespace(name).await?;
        self.store(name, &definition);
        tracing::trace!(namespace = name, "cached namespace definition");
        Ok(definition)
    }
}

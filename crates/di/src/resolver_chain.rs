//! ResolverChain - перебор стратегий в фиксированном порядке

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::{
    container::DIContainer,
    errors::DIError,
    registry::ServiceRegistry,
    resolvers::{
        ConstructorResolver, FactoryResolver, Resolved, ServiceResolverStrategy,
        SingletonResolver,
    },
    types::ServiceKey,
};

/// Цепочка стратегий. Встроенный порядок: Singleton -> Constructor -> Factory,
/// пользовательские стратегии только добавляются в конец.
pub struct ResolverChain {
    resolvers: RwLock<Vec<Arc<dyn ServiceResolverStrategy>>>,
}

impl ResolverChain {
    pub fn new() -> Self {
        let builtin: Vec<Arc<dyn ServiceResolverStrategy>> = vec![
            Arc::new(SingletonResolver),
            Arc::new(ConstructorResolver),
            Arc::new(FactoryResolver),
        ];

        Self {
            resolvers: RwLock::new(builtin),
        }
    }

    /// Append-only расширение цепочки
    pub fn add_resolver(&self, resolver: Arc<dyn ServiceResolverStrategy>) {
        debug!("Appending resolver '{}' to chain", resolver.name());
        self.resolvers.write().push(resolver);
    }

    /// OR по всем стратегиям
    pub fn can_resolve(&self, key: &ServiceKey, registry: &ServiceRegistry) -> bool {
        self.snapshot()
            .iter()
            .any(|resolver| resolver.can_resolve(key, registry))
    }

    /// Первый успешный результат или `Ok(None)`, если никто не справился
    pub fn resolve(
        &self,
        key: &ServiceKey,
        registry: &ServiceRegistry,
        container: &DIContainer,
    ) -> Result<Option<Resolved>, DIError> {
        // Снимок, чтобы не держать lock во время рекурсивного разрешения
        for resolver in self.snapshot() {
            if !resolver.can_resolve(key, registry) {
                continue;
            }

            trace!("Resolver '{}' handles {}", resolver.name(), key);
            if let Some(resolved) = resolver.resolve(key, registry, container)? {
                return Ok(Some(resolved));
            }
        }

        Ok(None)
    }

    pub fn resolver_names(&self) -> Vec<&'static str> {
        self.resolvers.read().iter().map(|r| r.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.resolvers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.read().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<dyn ServiceResolverStrategy>> {
        self.resolvers.read().clone()
    }
}

impl Default for ResolverChain {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResolverChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverChain")
            .field("resolvers", &self.resolver_names())
            .finish()
    }
}

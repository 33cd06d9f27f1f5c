//! Стратегии разрешения (Strategy pattern)
//!
//! Каждая стратегия отвечает на два вопроса: может ли она удовлетворить тип
//! при текущем состоянии registry и как получить экземпляр. Порядок в цепочке
//! фиксирован: Singleton -> Constructor -> Factory.

use std::fmt;
use tracing::{debug, trace};

use crate::{
    container::DIContainer,
    descriptor::{
        Built, CleanupFn, Dependencies, FactoryRegistration, ImplementationBinding, Injection,
    },
    errors::DIError,
    registry::ServiceRegistry,
    types::{ServiceInstance, ServiceKey},
};

/// Откуда взялся экземпляр
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOrigin {
    /// Уже материализованный singleton
    Cached,
    /// Сконструирован и закэширован как singleton
    ConstructedSingleton,
    /// Новый экземпляр (transient, scoped или фабрика)
    ConstructedTransient,
    /// Пользовательский resolver
    External,
}

/// Результат успешной стратегии
pub struct Resolved {
    pub instance: ServiceInstance,
    pub origin: ResolutionOrigin,
    pub(crate) disposer: Option<CleanupFn>,
}

impl Resolved {
    pub fn new(instance: ServiceInstance, origin: ResolutionOrigin) -> Self {
        Self {
            instance,
            origin,
            disposer: None,
        }
    }

    /// Cleanup handler, который lifecycle manager зарегистрирует для экземпляра
    pub fn with_cleanup<F>(mut self, cleanup: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.disposer = Some(Box::new(cleanup));
        self
    }

    fn from_built(built: Built, origin: ResolutionOrigin) -> Self {
        Self {
            instance: built.instance,
            origin,
            disposer: built.disposer,
        }
    }
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolved")
            .field("instance", &self.instance)
            .field("origin", &self.origin)
            .field("has_disposer", &self.disposer.is_some())
            .finish()
    }
}

/// Общий контракт стратегии разрешения
pub trait ServiceResolverStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_resolve(&self, key: &ServiceKey, registry: &ServiceRegistry) -> bool;

    /// `Ok(None)` - стратегия не смогла удовлетворить тип, цепочка идет дальше
    fn resolve(
        &self,
        key: &ServiceKey,
        registry: &ServiceRegistry,
        container: &DIContainer,
    ) -> Result<Option<Resolved>, DIError>;
}

/// Возвращает закэшированный singleton без конструирования
#[derive(Debug, Default)]
pub struct SingletonResolver;

impl ServiceResolverStrategy for SingletonResolver {
    fn name(&self) -> &'static str {
        "singleton"
    }

    fn can_resolve(&self, key: &ServiceKey, registry: &ServiceRegistry) -> bool {
        registry.has_singleton_instance(key)
    }

    fn resolve(
        &self,
        key: &ServiceKey,
        registry: &ServiceRegistry,
        _container: &DIContainer,
    ) -> Result<Option<Resolved>, DIError> {
        Ok(registry
            .get_singleton_instance(key)
            .map(|instance| Resolved::new(instance, ResolutionOrigin::Cached)))
    }
}

/// Constructor injection для singleton регистраций, еще не материализованных.
/// Единственная стратегия, которая кэширует результат как singleton.
#[derive(Debug, Default)]
pub struct ConstructorResolver;

impl ServiceResolverStrategy for ConstructorResolver {
    fn name(&self) -> &'static str {
        "constructor"
    }

    fn can_resolve(&self, key: &ServiceKey, registry: &ServiceRegistry) -> bool {
        registry.has_service_registration(key)
    }

    fn resolve(
        &self,
        key: &ServiceKey,
        registry: &ServiceRegistry,
        container: &DIContainer,
    ) -> Result<Option<Resolved>, DIError> {
        let Some(binding) = registry.get_service_implementation(key) else {
            return Ok(None);
        };

        let built = construct_with_injection(key, &binding, container)?;
        let stored = registry.set_singleton_instance(*key, built.instance.clone());

        if stored.ptr_eq(&built.instance) {
            debug!("Materialized singleton {} ({})", key, binding.implementation);
            Ok(Some(Resolved::from_built(
                built,
                ResolutionOrigin::ConstructedSingleton,
            )))
        } else {
            // Другой путь успел сохранить экземпляр раньше, наш отбрасывается
            Ok(Some(Resolved::new(stored, ResolutionOrigin::Cached)))
        }
    }
}

/// Фабрики и transient реализации: новый экземпляр на каждый вызов
#[derive(Debug, Default)]
pub struct FactoryResolver;

impl ServiceResolverStrategy for FactoryResolver {
    fn name(&self) -> &'static str {
        "factory"
    }

    fn can_resolve(&self, key: &ServiceKey, registry: &ServiceRegistry) -> bool {
        registry.has_factory_registration(key)
    }

    fn resolve(
        &self,
        key: &ServiceKey,
        registry: &ServiceRegistry,
        container: &DIContainer,
    ) -> Result<Option<Resolved>, DIError> {
        let Some(registration) = registry.get_factory_or_implementation(key) else {
            return Ok(None);
        };

        let resolved = match registration {
            FactoryRegistration::Callable(factory) => {
                trace!("Invoking factory for {}", key);
                let instance =
                    factory().map_err(|e| DIError::from_construction(key.name(), e))?;
                Resolved::new(instance, ResolutionOrigin::ConstructedTransient)
            }
            FactoryRegistration::Implementation(binding) => {
                let built = construct_with_injection(key, &binding, container)?;
                Resolved::from_built(built, ResolutionOrigin::ConstructedTransient)
            }
        };

        Ok(Some(resolved))
    }
}

/// Обойти параметры конструктора в порядке объявления, разрешить сервисные,
/// пропустить примитивы и параметры с default, затем вызвать конструктор.
pub(crate) fn construct_with_injection(
    key: &ServiceKey,
    binding: &ImplementationBinding,
    container: &DIContainer,
) -> Result<Built, DIError> {
    let mut deps = Dependencies::new(binding.implementation.name());

    for parameter in binding.constructor.parameters() {
        match parameter.injection() {
            Injection::Resolve => {
                let dependency = container.resolve_key(&parameter.declared)?;
                deps.insert(parameter.name, dependency);
            }
            skip => {
                trace!(
                    "Skipping parameter '{}' of {} ({:?})",
                    parameter.name,
                    binding.implementation,
                    skip
                );
                deps.skip(*parameter);
            }
        }
    }

    binding
        .activate(&deps)
        .map_err(|e| DIError::from_construction(key.name(), e))
}

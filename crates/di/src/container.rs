//! DIContainer - фасад над registry, цепочкой resolver-ов и lifecycle manager
//!
//! # Locking discipline
//!
//! Таблицы registry защищены `parking_lot::RwLock`. Стек разрешения живет под
//! `ReentrantMutex`, который удерживается весь top-level `resolve()`:
//! параллельные resolve на одном контейнере сериализуются, а рекурсивные
//! resolve в том же потоке входят повторно. Регистрация во время resolve не
//! нарушает memory safety, но логически регистрация идет до разрешения.

use chrono::{DateTime, Utc};
use parking_lot::ReentrantMutex;
use std::{cell::RefCell, sync::Arc, time::Instant};
use tracing::{debug, info, trace, warn};

use crate::{
    config::ContainerConfig,
    dependency_graph::DependencyGraph,
    descriptor::{
        FactoryFn, FactoryRegistration, ImplementationBinding, Implements, Injectable,
        RegistrationKind, ServiceScope,
    },
    diagnostics::DiagnosticReport,
    errors::{DIError, DIResult},
    lazy::Lazy,
    lifecycle::{CleanupReport, LifecycleManager},
    metrics::{MetricsCollector, PerformanceMetrics},
    registry::{RegistrationInfo, ServiceRegistry},
    resolver_chain::ResolverChain,
    resolvers::{ResolutionOrigin, ServiceResolverStrategy},
    types::{ServiceInstance, ServiceKey},
    validation::{RegistrationRequest, ValidationEngine, ValidationReport},
};

type ResolutionStack = RefCell<Vec<ServiceKey>>;

/// Кадр стека разрешения; снимается при drop, в том числе при ошибке и панике
struct StackFrame<'a> {
    stack: &'a ResolutionStack,
}

impl<'a> StackFrame<'a> {
    fn push(stack: &'a ResolutionStack, key: ServiceKey) -> Self {
        stack.borrow_mut().push(key);
        Self { stack }
    }
}

impl Drop for StackFrame<'_> {
    fn drop(&mut self) {
        self.stack.borrow_mut().pop();
    }
}

/// Восстанавливает предыдущий активный scope
struct ScopeOverride<'a> {
    lifecycle: &'a LifecycleManager,
    previous: Option<String>,
}

impl Drop for ScopeOverride<'_> {
    fn drop(&mut self) {
        self.lifecycle.swap_active_scope(self.previous.take());
    }
}

pub struct DIContainer {
    config: ContainerConfig,
    registry: Arc<ServiceRegistry>,
    chain: ResolverChain,
    lifecycle: LifecycleManager,
    validator: ValidationEngine,
    metrics: MetricsCollector,
    resolution: ReentrantMutex<ResolutionStack>,
    created_at: DateTime<Utc>,
}

impl DIContainer {
    pub fn new(config: ContainerConfig) -> Self {
        let registry = Arc::new(ServiceRegistry::new());

        debug!(
            "Creating DI container '{}' (max depth {}, metrics {})",
            config.name, config.max_resolution_depth, config.enable_metrics
        );

        Self {
            chain: ResolverChain::new(),
            lifecycle: LifecycleManager::new(Arc::clone(&registry)),
            validator: ValidationEngine::new(
                config.allow_reregistration,
                config.max_registrations,
            ),
            metrics: MetricsCollector::new(config.enable_metrics),
            resolution: ReentrantMutex::new(RefCell::new(Vec::new())),
            created_at: Utc::now(),
            registry,
            config,
        }
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Прямой доступ к таблицам (для пользовательских resolver-ов)
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    // === registration ===

    pub fn register_singleton<I, Impl>(&self) -> DIResult<()>
    where
        I: ?Sized + Send + Sync + 'static,
        Impl: Injectable + Implements<I>,
    {
        self.register_binding(
            ServiceKey::of::<I>(),
            ImplementationBinding::of::<I, Impl>(),
            ServiceScope::Singleton,
            false,
        )
    }

    pub fn register_transient<I, Impl>(&self) -> DIResult<()>
    where
        I: ?Sized + Send + Sync + 'static,
        Impl: Injectable + Implements<I>,
    {
        self.register_binding(
            ServiceKey::of::<I>(),
            ImplementationBinding::of::<I, Impl>(),
            ServiceScope::Transient,
            false,
        )
    }

    pub fn register_scoped<I, Impl>(&self, scope: ServiceScope) -> DIResult<()>
    where
        I: ?Sized + Send + Sync + 'static,
        Impl: Injectable + Implements<I>,
    {
        self.register_binding(
            ServiceKey::of::<I>(),
            ImplementationBinding::of::<I, Impl>(),
            scope,
            false,
        )
    }

    /// Singleton, который не материализуется в `warm_up`/`validate_all_registrations`
    pub fn register_lazy<I, Impl>(&self) -> DIResult<()>
    where
        I: ?Sized + Send + Sync + 'static,
        Impl: Injectable + Implements<I>,
    {
        self.register_binding(
            ServiceKey::of::<I>(),
            ImplementationBinding::of::<I, Impl>(),
            ServiceScope::Singleton,
            true,
        )
    }

    /// Готовый экземпляр. Контейнер не регистрирует для него cleanup.
    pub fn register_instance<I>(&self, instance: Arc<I>) -> DIResult<()>
    where
        I: ?Sized + Send + Sync + 'static,
    {
        let interface = ServiceKey::of::<I>();
        self.validator.validate_registration(
            &self.registry,
            &RegistrationRequest {
                interface,
                implementation: None,
                constructor: None,
                scope: ServiceScope::Singleton,
            },
        )?;

        self.registry
            .register_instance(interface, ServiceInstance::new(instance));
        Ok(())
    }

    /// Фабрика без аргументов, вызывается на каждый resolve (transient)
    pub fn register_factory<I, F>(&self, factory: F) -> DIResult<()>
    where
        I: ?Sized + Send + Sync + 'static,
        F: Fn() -> anyhow::Result<Arc<I>> + Send + Sync + 'static,
    {
        let interface = ServiceKey::of::<I>();
        self.validator.validate_registration(
            &self.registry,
            &RegistrationRequest {
                interface,
                implementation: None,
                constructor: None,
                scope: ServiceScope::Transient,
            },
        )?;

        let factory: FactoryFn = Arc::new(move || factory().map(ServiceInstance::new));
        self.registry
            .register_factory(interface, FactoryRegistration::Callable(factory));
        Ok(())
    }

    fn register_binding(
        &self,
        interface: ServiceKey,
        binding: ImplementationBinding,
        scope: ServiceScope,
        lazy: bool,
    ) -> DIResult<()> {
        self.validator.validate_registration(
            &self.registry,
            &RegistrationRequest {
                interface,
                implementation: Some(binding.implementation),
                constructor: Some(&binding.constructor),
                scope,
            },
        )?;

        match (scope, lazy) {
            (ServiceScope::Singleton, true) => self.registry.register_lazy(interface, binding),
            (ServiceScope::Singleton, false) => {
                self.registry.register_singleton(interface, binding)
            }
            (scope, _) => self.registry.register_scoped(interface, binding, scope),
        }
        Ok(())
    }

    /// Пользовательское правило регистрации
    pub fn add_registration_rule<F>(&self, name: impl Into<String>, rule: F)
    where
        F: Fn(&RegistrationRequest<'_>) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validator.add_rule(name, rule);
    }

    /// Добавить стратегию в конец цепочки
    pub fn add_resolver(&self, resolver: Arc<dyn ServiceResolverStrategy>) {
        self.chain.add_resolver(resolver);
    }

    pub fn is_registered<I>(&self) -> bool
    where
        I: ?Sized + 'static,
    {
        self.registry.is_registered(&ServiceKey::of::<I>())
    }

    /// Может ли хотя бы одна стратегия удовлетворить тип
    pub fn can_resolve<I>(&self) -> bool
    where
        I: ?Sized + 'static,
    {
        self.chain
            .can_resolve(&ServiceKey::of::<I>(), &self.registry)
    }

    // === resolution ===

    pub fn resolve<I>(&self) -> DIResult<Arc<I>>
    where
        I: ?Sized + Send + Sync + 'static,
    {
        let key = ServiceKey::of::<I>();
        let instance = self.resolve_key(&key)?;

        instance.downcast::<I>().ok_or_else(|| DIError::TypeMismatch {
            name: instance.type_name().to_string(),
            expected: key.name().to_string(),
        })
    }

    pub fn try_resolve<I>(&self) -> Option<Arc<I>>
    where
        I: ?Sized + Send + Sync + 'static,
    {
        match self.resolve::<I>() {
            Ok(service) => Some(service),
            Err(e) => {
                trace!("try_resolve failed: {}", e);
                None
            }
        }
    }

    /// Разрешение по ключу: проверка цикла, кадр стека, цепочка стратегий,
    /// политика scope. Кадр снимается при любом исходе.
    pub fn resolve_key(&self, key: &ServiceKey) -> DIResult<ServiceInstance> {
        let started = Instant::now();
        let stack = self.resolution.lock();
        let result = self.resolve_on_stack(&stack, key);
        let elapsed = started.elapsed();

        match &result {
            Ok((_, from_cache)) => self.metrics.record_success(key, elapsed, *from_cache),
            Err(e) => {
                debug!("Resolution of {} failed: {}", key, e);
                self.metrics.record_failure(key, elapsed, e.category());
            }
        }

        result.map(|(instance, _)| instance)
    }

    fn resolve_on_stack(
        &self,
        stack: &ResolutionStack,
        key: &ServiceKey,
    ) -> DIResult<(ServiceInstance, bool)> {
        {
            let current = stack.borrow();
            if let Some(start) = current.iter().position(|k| k == key) {
                let mut chain: Vec<String> = current[start..]
                    .iter()
                    .map(|k| k.name().to_string())
                    .collect();
                chain.push(key.name().to_string());
                warn!("Circular dependency detected: {}", chain.join(" -> "));
                return Err(DIError::CircularDependency { chain });
            }

            if current.len() >= self.config.max_resolution_depth {
                return Err(DIError::resolution_failed(
                    key.name(),
                    format!(
                        "maximum resolution depth of {} exceeded",
                        self.config.max_resolution_depth
                    ),
                ));
            }
        }

        let _frame = StackFrame::push(stack, *key);
        if self.config.verbose_logging {
            debug!(depth = stack.borrow().len(), "Resolving {}", key);
        } else {
            trace!(depth = stack.borrow().len(), "Resolving {}", key);
        }

        let scope = self
            .registry
            .get_descriptor(key)
            .map(|descriptor| descriptor.scope)
            .unwrap_or_default();

        if scope.is_scoped() {
            if let Some(cached) = self.lifecycle.lookup_scoped(key, scope)? {
                return Ok((cached, true));
            }
        }

        let Some(resolved) = self.chain.resolve(key, &self.registry, self)? else {
            return Err(DIError::not_registered(
                key.name(),
                self.registry.registered_names(),
            ));
        };

        let from_cache = resolved.origin == ResolutionOrigin::Cached;
        let instance = self.lifecycle.create_with_lifecycle(key, scope, resolved)?;
        Ok((instance, from_cache))
    }

    /// Прокси, который разрешит сервис при первом `get()`
    pub fn resolve_lazy<I>(self: &Arc<Self>) -> Lazy<I>
    where
        I: ?Sized + Send + Sync + 'static,
    {
        Lazy::new(Arc::clone(self))
    }

    /// Разрешить в указанном scope, не меняя активный scope для остальных вызовов
    pub fn resolve_in_scope<I>(&self, scope_id: &str) -> DIResult<Arc<I>>
    where
        I: ?Sized + Send + Sync + 'static,
    {
        if !self.registry.has_scope(scope_id) {
            return Err(crate::di_error!(scope_not_found: scope_id));
        }

        let _stack = self.resolution.lock();
        let _restore = ScopeOverride {
            lifecycle: &self.lifecycle,
            previous: self
                .lifecycle
                .swap_active_scope(Some(scope_id.to_string())),
        };
        self.resolve::<I>()
    }

    /// Текущий стек разрешения (пустой вне resolve)
    pub fn resolution_stack(&self) -> Vec<String> {
        self.resolution
            .lock()
            .borrow()
            .iter()
            .map(|key| key.name().to_string())
            .collect()
    }

    // === scopes & cleanup ===

    pub fn create_scope(&self, scope_id: &str) {
        self.lifecycle.create_scope(scope_id);
    }

    pub fn create_anonymous_scope(&self) -> String {
        self.lifecycle.create_anonymous_scope()
    }

    pub fn enter_scope(&self, scope_id: &str) -> DIResult<()> {
        self.lifecycle.enter_scope(scope_id)
    }

    pub fn exit_scope(&self) -> Option<String> {
        self.lifecycle.exit_scope()
    }

    pub fn active_scope(&self) -> Option<String> {
        self.lifecycle.active_scope()
    }

    pub fn dispose_scope(&self, scope_id: &str) -> DIResult<CleanupReport> {
        let _stack = self.resolution.lock();
        self.lifecycle.dispose_scope(scope_id)
    }

    pub fn add_cleanup_handler<F>(&self, name: impl Into<String>, handler: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.lifecycle.add_cleanup_handler(name, handler);
    }

    pub fn add_scope_cleanup_handler<F>(
        &self,
        scope_id: &str,
        name: impl Into<String>,
        handler: F,
    ) -> DIResult<()>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.lifecycle
            .add_scope_cleanup_handler(scope_id, name, handler)
    }

    /// Выполнить все cleanup handler-ы, удалить все scopes и отпустить
    /// сконструированные singleton-ы: следующий resolve создаст их заново.
    /// Регистрации и готовые экземпляры (`register_instance`) сохраняются.
    pub fn cleanup_all(&self) -> CleanupReport {
        let _stack = self.resolution.lock();
        self.lifecycle.cleanup_all()
    }

    // === validation & warm-up ===

    /// Статический анализ графа без конструирования. Зависимость без
    /// регистрации допустима, если её удовлетворяет цепочка resolver-ов.
    pub fn validate_graph(&self) -> ValidationReport {
        self.validator.validate_graph_with(&self.registry, |key| {
            self.chain.can_resolve(key, &self.registry)
        })
    }

    /// Fail-fast проверка при старте: статический анализ, затем resolve каждой
    /// не-lazy регистрации в порядке имен. Scoped регистрации и всё, что
    /// транзитивно от них зависит, проверяются только статически: вне scope
    /// их не разрешить. Первая ошибка побеждает.
    pub fn validate_all_registrations(&self) -> DIResult<()> {
        self.validate_graph().into_result()?;

        let graph = self.get_dependency_graph();
        let mut resolved = 0usize;
        for key in self.registry.registered_keys() {
            let Some(descriptor) = self.registry.get_descriptor(&key) else {
                continue;
            };
            if descriptor.is_lazy
                || descriptor.scope.is_scoped()
                || self.depends_on_scoped(&graph, &key)
            {
                trace!("Skipping {} during validation", key);
                continue;
            }

            self.resolve_key(&key)?;
            resolved += 1;
        }

        info!(
            "✅ Container '{}' validated: {} services resolved",
            self.config.name, resolved
        );
        Ok(())
    }

    /// Материализовать все не-lazy singleton-ы, не зависящие от scoped
    /// сервисов. Возвращает число созданных.
    pub fn warm_up(&self) -> DIResult<usize> {
        let graph = self.get_dependency_graph();
        let mut created = 0usize;

        for key in self.registry.registered_keys() {
            let Some(descriptor) = self.registry.get_descriptor(&key) else {
                continue;
            };
            let pending = descriptor.scope == ServiceScope::Singleton
                && descriptor.kind == RegistrationKind::Implementation
                && !descriptor.is_lazy
                && !self.registry.has_singleton_instance(&key)
                && !self.depends_on_scoped(&graph, &key);

            if pending {
                self.resolve_key(&key)?;
                created += 1;
            }
        }

        info!("🔥 Warm-up of '{}': {} singletons created", self.config.name, created);
        Ok(created)
    }

    fn depends_on_scoped(&self, graph: &DependencyGraph<ServiceKey>, key: &ServiceKey) -> bool {
        graph.transitive_dependencies(key).iter().any(|dependency| {
            self.registry
                .get_descriptor(dependency)
                .is_some_and(|descriptor| descriptor.scope.is_scoped())
        })
    }

    // === introspection ===

    pub fn get_all_registrations(&self) -> Vec<RegistrationInfo> {
        self.registry.get_all_registrations()
    }

    pub fn get_dependency_graph(&self) -> DependencyGraph<ServiceKey> {
        self.validator.build_graph(&self.registry)
    }

    pub fn get_performance_metrics(&self) -> PerformanceMetrics {
        self.metrics.snapshot()
    }

    pub fn resolver_names(&self) -> Vec<&'static str> {
        self.chain.resolver_names()
    }

    pub fn diagnostics(&self) -> DiagnosticReport {
        DiagnosticReport::collect(self)
    }

    pub fn generate_diagnostic_report(&self) -> String {
        self.diagnostics().render()
    }

    /// Вернуть контейнер в исходное состояние. Cleanup handler-ы выполняются
    /// до удаления регистраций.
    pub fn reset(&self) -> CleanupReport {
        let _stack = self.resolution.lock();
        let report = self.lifecycle.cleanup_all();
        self.registry.clear_all();
        self.metrics.reset();

        info!("Container '{}' reset", self.config.name);
        report
    }
}

impl Default for DIContainer {
    fn default() -> Self {
        Self::new(ContainerConfig::default())
    }
}

impl std::fmt::Debug for DIContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DIContainer")
            .field("name", &self.config.name)
            .field("registry", &self.registry)
            .field("lifecycle", &self.lifecycle)
            .field("resolvers", &self.chain)
            .finish()
    }
}

//! Lifecycle Manager - scopes, кэширование scoped экземпляров и cleanup
//!
//! Правила регистрации cleanup handler-ов:
//! - сконструированный singleton -> глобальный список (выполняется в `cleanup_all`)
//! - scoped экземпляр -> список своего scope (выполняется в `dispose_scope`)
//! - transient -> никогда, контейнер не владеет экземпляром
//!
//! Handler-ы выполняются в порядке регистрации, ошибки логируются и
//! собираются в [`CleanupReport`], но не прерывают teardown.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    descriptor::{CleanupFn, ServiceScope},
    errors::{DIError, DIResult},
    registry::ServiceRegistry,
    resolvers::{ResolutionOrigin, Resolved},
    types::{ServiceInstance, ServiceKey},
};

struct CleanupEntry {
    name: String,
    scope: Option<String>,
    handler: CleanupFn,
}

/// Один упавший cleanup handler
#[derive(Debug, Clone, Serialize)]
pub struct CleanupFailure {
    pub name: String,
    pub scope: Option<String>,
    pub error: String,
}

/// Итог teardown
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub invoked: usize,
    pub failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.invoked - self.failures.len()
    }
}

pub struct LifecycleManager {
    registry: Arc<ServiceRegistry>,
    active_scope: RwLock<Option<String>>,
    handlers: Mutex<Vec<CleanupEntry>>,
}

impl LifecycleManager {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self {
            registry,
            active_scope: RwLock::new(None),
            handlers: Mutex::new(Vec::new()),
        }
    }

    // === scopes ===

    /// Создать scope и сделать его активным. Повторное создание только активирует.
    pub fn create_scope(&self, scope_id: &str) {
        if self.registry.create_scope_table(scope_id) {
            debug!("Created scope '{}'", scope_id);
        } else {
            debug!("Scope '{}' already exists, activating", scope_id);
        }
        *self.active_scope.write() = Some(scope_id.to_string());
    }

    /// Scope со сгенерированным id
    pub fn create_anonymous_scope(&self) -> String {
        let scope_id = format!("scope-{}", Uuid::new_v4());
        self.create_scope(&scope_id);
        scope_id
    }

    /// Сделать существующий scope активным
    pub fn enter_scope(&self, scope_id: &str) -> DIResult<()> {
        if !self.registry.has_scope(scope_id) {
            return Err(crate::di_error!(scope_not_found: scope_id));
        }
        *self.active_scope.write() = Some(scope_id.to_string());
        Ok(())
    }

    /// Снять активный scope (сам scope и его экземпляры остаются)
    pub fn exit_scope(&self) -> Option<String> {
        self.active_scope.write().take()
    }

    /// Заменить активный scope, вернув предыдущее значение
    pub(crate) fn swap_active_scope(&self, scope: Option<String>) -> Option<String> {
        std::mem::replace(&mut *self.active_scope.write(), scope)
    }

    pub fn active_scope(&self) -> Option<String> {
        self.active_scope.read().clone()
    }

    pub fn scope_ids(&self) -> Vec<String> {
        self.registry.scope_ids()
    }

    /// Выполнить cleanup handler-ы scope, удалить его экземпляры и снять
    /// активность, если scope был активным.
    pub fn dispose_scope(&self, scope_id: &str) -> DIResult<CleanupReport> {
        if !self.registry.has_scope(scope_id) {
            return Err(crate::di_error!(scope_not_found: scope_id));
        }

        let scoped: Vec<CleanupEntry> = {
            let mut handlers = self.handlers.lock();
            let (scoped, rest): (Vec<_>, Vec<_>) = handlers
                .drain(..)
                .partition(|entry| entry.scope.as_deref() == Some(scope_id));
            *handlers = rest;
            scoped
        };

        let report = run_handlers(scoped);
        let removed = self.registry.remove_scope(scope_id).unwrap_or(0);

        {
            let mut active = self.active_scope.write();
            if active.as_deref() == Some(scope_id) {
                *active = None;
            }
        }

        info!(
            "Disposed scope '{}': {} instances, {} handlers ({} failed)",
            scope_id,
            removed,
            report.invoked,
            report.failures.len()
        );
        Ok(report)
    }

    // === resolution support ===

    /// Закэшированный экземпляр для scoped регистрации в активном scope.
    /// Без активного scope - `ScopeNotActive`.
    pub fn lookup_scoped(
        &self,
        key: &ServiceKey,
        scope: ServiceScope,
    ) -> DIResult<Option<ServiceInstance>> {
        let scope_id = self.require_active_scope(key, scope)?;
        Ok(self.registry.get_scoped_instance(&scope_id, key))
    }

    /// Применить политику scope к результату стратегии и зарегистрировать cleanup
    pub fn create_with_lifecycle(
        &self,
        key: &ServiceKey,
        scope: ServiceScope,
        resolved: Resolved,
    ) -> DIResult<ServiceInstance> {
        let Resolved {
            instance,
            origin,
            disposer,
        } = resolved;

        match origin {
            ResolutionOrigin::Cached => Ok(instance),
            ResolutionOrigin::ConstructedSingleton | ResolutionOrigin::External => {
                if let Some(disposer) = disposer {
                    self.push_handler(key.name().to_string(), None, disposer);
                }
                Ok(instance)
            }
            ResolutionOrigin::ConstructedTransient if scope.is_scoped() => {
                let scope_id = self.require_active_scope(key, scope)?;
                let stored = self
                    .registry
                    .set_scoped_instance(&scope_id, *key, instance.clone());

                if stored.ptr_eq(&instance) {
                    if let Some(disposer) = disposer {
                        self.push_handler(key.name().to_string(), Some(scope_id), disposer);
                    }
                }
                Ok(stored)
            }
            ResolutionOrigin::ConstructedTransient => Ok(instance),
        }
    }

    fn require_active_scope(&self, key: &ServiceKey, scope: ServiceScope) -> DIResult<String> {
        self.active_scope().ok_or_else(|| DIError::ScopeNotActive {
            interface: key.name().to_string(),
            scope: scope.to_string(),
        })
    }

    // === cleanup ===

    pub fn add_cleanup_handler<F>(&self, name: impl Into<String>, handler: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.push_handler(name.into(), None, Box::new(handler));
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
        if !self.registry.has_scope(scope_id) {
            return Err(crate::di_error!(scope_not_found: scope_id));
        }
        self.push_handler(name.into(), Some(scope_id.to_string()), Box::new(handler));
        Ok(())
    }

    fn push_handler(&self, name: String, scope: Option<String>, handler: CleanupFn) {
        debug!("Cleanup handler '{}' registered (scope: {:?})", name, scope);
        self.handlers.lock().push(CleanupEntry {
            name,
            scope,
            handler,
        });
    }

    pub fn pending_handlers(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Выполнить все handler-ы (глобальные и всех scope) в порядке регистрации,
    /// удалить все scopes и сбросить сконструированные singleton-ы.
    /// Регистрации не трогаются.
    pub fn cleanup_all(&self) -> CleanupReport {
        let entries: Vec<CleanupEntry> = std::mem::take(&mut *self.handlers.lock());
        let report = run_handlers(entries);

        for scope_id in self.registry.scope_ids() {
            self.registry.remove_scope(&scope_id);
        }
        *self.active_scope.write() = None;
        let dropped = self.registry.clear_materialized_singletons();

        info!(
            "🧹 Cleanup: {} handlers ({} failed), {} singletons released",
            report.invoked,
            report.failures.len(),
            dropped
        );
        report
    }
}

fn run_handlers(entries: Vec<CleanupEntry>) -> CleanupReport {
    let mut report = CleanupReport::default();

    for entry in entries {
        report.invoked += 1;
        if let Err(e) = (entry.handler)() {
            warn!("Cleanup handler '{}' failed: {:#}", entry.name, e);
            report.failures.push(CleanupFailure {
                name: entry.name,
                scope: entry.scope,
                error: format!("{e:#}"),
            });
        }
    }

    report
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("active_scope", &self.active_scope())
            .field("pending_handlers", &self.pending_handlers())
            .finish()
    }
}

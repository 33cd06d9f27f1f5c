//! Service Registry - таблицы регистраций контейнера
//!
//! Отвечает ТОЛЬКО за хранение: регистрации, материализованные singleton-ы и
//! scoped экземпляры. Никакой логики разрешения. Для неизвестных типов
//! методы возвращают `None`/`false`, а не ошибки.
//!
//! Инвариант: интерфейс находится не более чем в одной из таблиц
//! `services`/`factories`; `singletons` дополнительно кэширует экземпляры,
//! материализованные из `services`, и хранит `register_instance`.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::{
    descriptor::{
        FactoryRegistration, ImplementationBinding, RegistrationKind, ServiceDescriptor,
        ServiceScope,
    },
    types::{ServiceInstance, ServiceKey},
};

/// Снимок одной регистрации для introspection
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationInfo {
    pub interface: String,
    pub implementation: String,
    pub scope: ServiceScope,
    pub kind: RegistrationKind,
    pub is_lazy: bool,
    /// Есть ли уже материализованный singleton
    pub materialized: bool,
    pub dependencies: Vec<String>,
}

/// Статистика registry
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistryStats {
    pub total_registrations: usize,
    pub singleton_count: usize,
    pub transient_count: usize,
    pub request_count: usize,
    pub session_count: usize,
    pub lazy_count: usize,
    pub materialized_singletons: usize,
    pub active_scopes: usize,
    pub scoped_instances: usize,
}

#[derive(Default)]
pub struct ServiceRegistry {
    /// Singleton регистрации, еще не материализованные
    services: RwLock<HashMap<ServiceKey, ImplementationBinding>>,
    /// Материализованные singleton-ы и готовые экземпляры
    singletons: RwLock<HashMap<ServiceKey, ServiceInstance>>,
    /// Transient, scoped и фабричные регистрации
    factories: RwLock<HashMap<ServiceKey, FactoryRegistration>>,
    /// Метаданные всех регистраций
    descriptors: RwLock<HashMap<ServiceKey, ServiceDescriptor>>,
    /// scope id -> интерфейс -> экземпляр
    scoped_instances: RwLock<HashMap<String, HashMap<ServiceKey, ServiceInstance>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_singleton(&self, interface: ServiceKey, binding: ImplementationBinding) {
        let descriptor = ServiceDescriptor::new(
            interface,
            binding.implementation.name(),
            ServiceScope::Singleton,
            RegistrationKind::Implementation,
        );
        self.bind_service(interface, binding, descriptor);
    }

    pub fn register_lazy(&self, interface: ServiceKey, binding: ImplementationBinding) {
        let descriptor = ServiceDescriptor::new(
            interface,
            binding.implementation.name(),
            ServiceScope::Singleton,
            RegistrationKind::Implementation,
        )
        .lazy();
        self.bind_service(interface, binding, descriptor);
    }

    pub fn register_transient(&self, interface: ServiceKey, binding: ImplementationBinding) {
        self.register_scoped(interface, binding, ServiceScope::Transient);
    }

    /// Регистрация с явным scope. Singleton уходит в `services`,
    /// остальные - в `factories`.
    pub fn register_scoped(
        &self,
        interface: ServiceKey,
        binding: ImplementationBinding,
        scope: ServiceScope,
    ) {
        if scope == ServiceScope::Singleton {
            self.register_singleton(interface, binding);
            return;
        }

        let descriptor = ServiceDescriptor::new(
            interface,
            binding.implementation.name(),
            scope,
            RegistrationKind::Implementation,
        );
        self.bind_factory(
            interface,
            FactoryRegistration::Implementation(binding),
            descriptor,
        );
    }

    pub fn register_instance(&self, interface: ServiceKey, instance: ServiceInstance) {
        let descriptor = ServiceDescriptor::new(
            interface,
            instance.type_name(),
            ServiceScope::Singleton,
            RegistrationKind::Instance,
        );

        self.services.write().remove(&interface);
        self.factories.write().remove(&interface);
        self.singletons.write().insert(interface, instance);
        self.descriptors.write().insert(interface, descriptor);

        debug!("Registered instance for {}", interface);
    }

    pub fn register_factory(&self, interface: ServiceKey, factory: FactoryRegistration) {
        let descriptor = ServiceDescriptor::new(
            interface,
            interface.name(),
            ServiceScope::Transient,
            RegistrationKind::Factory,
        );
        self.bind_factory(interface, factory, descriptor);
    }

    fn bind_service(
        &self,
        interface: ServiceKey,
        binding: ImplementationBinding,
        descriptor: ServiceDescriptor,
    ) {
        debug!(
            "Registered singleton {} -> {}",
            interface, binding.implementation
        );
        self.services.write().insert(interface, binding);
        self.factories.write().remove(&interface);
        self.singletons.write().remove(&interface);
        self.descriptors.write().insert(interface, descriptor);
    }

    fn bind_factory(
        &self,
        interface: ServiceKey,
        factory: FactoryRegistration,
        descriptor: ServiceDescriptor,
    ) {
        debug!(
            "Registered {} {} -> {}",
            descriptor.scope, interface, descriptor.implementation
        );
        self.services.write().remove(&interface);
        self.factories.write().insert(interface, factory);
        self.singletons.write().remove(&interface);
        self.descriptors.write().insert(interface, descriptor);
    }

    pub fn is_registered(&self, interface: &ServiceKey) -> bool {
        self.descriptors.read().contains_key(interface)
    }

    pub fn has_singleton_instance(&self, interface: &ServiceKey) -> bool {
        self.singletons.read().contains_key(interface)
    }

    pub fn get_singleton_instance(&self, interface: &ServiceKey) -> Option<ServiceInstance> {
        self.singletons.read().get(interface).cloned()
    }

    /// Сохранить материализованный singleton.
    ///
    /// Если другой путь разрешения уже успел сохранить экземпляр, остается
    /// первый, и возвращается именно он.
    pub fn set_singleton_instance(
        &self,
        interface: ServiceKey,
        instance: ServiceInstance,
    ) -> ServiceInstance {
        self.singletons
            .write()
            .entry(interface)
            .or_insert(instance)
            .clone()
    }

    pub fn has_factory_registration(&self, interface: &ServiceKey) -> bool {
        self.factories.read().contains_key(interface)
    }

    pub fn has_service_registration(&self, interface: &ServiceKey) -> bool {
        self.services.read().contains_key(interface)
    }

    pub fn get_service_implementation(
        &self,
        interface: &ServiceKey,
    ) -> Option<ImplementationBinding> {
        self.services.read().get(interface).cloned()
    }

    pub fn get_factory_or_implementation(
        &self,
        interface: &ServiceKey,
    ) -> Option<FactoryRegistration> {
        self.factories.read().get(interface).cloned()
    }

    pub fn get_descriptor(&self, interface: &ServiceKey) -> Option<ServiceDescriptor> {
        self.descriptors.read().get(interface).cloned()
    }

    /// Все зарегистрированные интерфейсы, отсортированные по имени
    pub fn registered_keys(&self) -> Vec<ServiceKey> {
        let mut keys: Vec<_> = self.descriptors.read().keys().copied().collect();
        keys.sort();
        keys
    }

    pub fn registered_names(&self) -> Vec<String> {
        self.registered_keys()
            .into_iter()
            .map(|key| key.name().to_string())
            .collect()
    }

    pub fn registration_count(&self) -> usize {
        self.descriptors.read().len()
    }

    /// Объявленные сервисные зависимости регистрации (пусто для фабрик и экземпляров)
    pub fn dependencies_of(&self, interface: &ServiceKey) -> Vec<ServiceKey> {
        if let Some(binding) = self.services.read().get(interface) {
            return binding.constructor.service_dependencies().collect();
        }
        self.factories
            .read()
            .get(interface)
            .and_then(FactoryRegistration::constructor)
            .map(|ctor| ctor.service_dependencies().collect())
            .unwrap_or_default()
    }

    /// Снимок всех регистраций (debug/introspection)
    pub fn get_all_registrations(&self) -> Vec<RegistrationInfo> {
        let descriptors: Vec<ServiceDescriptor> = {
            let guard = self.descriptors.read();
            let mut all: Vec<_> = guard.values().cloned().collect();
            all.sort_by(|a, b| a.interface.cmp(&b.interface));
            all
        };

        descriptors
            .into_iter()
            .map(|descriptor| RegistrationInfo {
                interface: descriptor.interface.name().to_string(),
                implementation: descriptor.implementation.to_string(),
                scope: descriptor.scope,
                kind: descriptor.kind,
                is_lazy: descriptor.is_lazy,
                materialized: self.has_singleton_instance(&descriptor.interface),
                dependencies: self
                    .dependencies_of(&descriptor.interface)
                    .into_iter()
                    .map(|key| key.name().to_string())
                    .collect(),
            })
            .collect()
    }

    // === scoped instances ===

    /// Завести пустую таблицу для scope; `false`, если scope уже существует
    pub fn create_scope_table(&self, scope_id: &str) -> bool {
        let mut scopes = self.scoped_instances.write();
        if scopes.contains_key(scope_id) {
            return false;
        }
        scopes.insert(scope_id.to_string(), HashMap::new());
        true
    }

    pub fn has_scope(&self, scope_id: &str) -> bool {
        self.scoped_instances.read().contains_key(scope_id)
    }

    pub fn get_scoped_instance(
        &self,
        scope_id: &str,
        interface: &ServiceKey,
    ) -> Option<ServiceInstance> {
        self.scoped_instances
            .read()
            .get(scope_id)
            .and_then(|instances| instances.get(interface))
            .cloned()
    }

    /// Сохранить scoped экземпляр; при гонке возвращается уже сохраненный
    pub fn set_scoped_instance(
        &self,
        scope_id: &str,
        interface: ServiceKey,
        instance: ServiceInstance,
    ) -> ServiceInstance {
        self.scoped_instances
            .write()
            .entry(scope_id.to_string())
            .or_default()
            .entry(interface)
            .or_insert(instance)
            .clone()
    }

    /// Удалить scope вместе с экземплярами; возвращает число удаленных экземпляров
    pub fn remove_scope(&self, scope_id: &str) -> Option<usize> {
        self.scoped_instances
            .write()
            .remove(scope_id)
            .map(|instances| instances.len())
    }

    pub fn scope_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.scoped_instances.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn scoped_instance_count(&self, scope_id: &str) -> usize {
        self.scoped_instances
            .read()
            .get(scope_id)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    /// Сбросить материализованные singleton-ы, полученные конструированием.
    /// Экземпляры из `register_instance` остаются.
    pub fn clear_materialized_singletons(&self) -> usize {
        let descriptors = self.descriptors.read();
        let mut singletons = self.singletons.write();
        let before = singletons.len();
        singletons.retain(|key, _| {
            descriptors
                .get(key)
                .map(|d| d.kind == RegistrationKind::Instance)
                .unwrap_or(false)
        });
        before - singletons.len()
    }

    pub fn clear_all(&self) {
        let count = self.registration_count();
        self.services.write().clear();
        self.factories.write().clear();
        self.singletons.write().clear();
        self.descriptors.write().clear();
        self.scoped_instances.write().clear();

        info!("🧹 Очищено {} регистраций из ServiceRegistry", count);
    }

    pub fn get_stats(&self) -> RegistryStats {
        let descriptors = self.descriptors.read();
        let mut stats = RegistryStats {
            total_registrations: descriptors.len(),
            ..Default::default()
        };

        for descriptor in descriptors.values() {
            match descriptor.scope {
                ServiceScope::Singleton => stats.singleton_count += 1,
                ServiceScope::Transient => stats.transient_count += 1,
                ServiceScope::Request => stats.request_count += 1,
                ServiceScope::Session => stats.session_count += 1,
            }
            if descriptor.is_lazy {
                stats.lazy_count += 1;
            }
        }
        drop(descriptors);

        stats.materialized_singletons = self.singletons.read().len();
        let scopes = self.scoped_instances.read();
        stats.active_scopes = scopes.len();
        stats.scoped_instances = scopes.values().map(HashMap::len).sum();

        stats
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("stats", &self.get_stats())
            .finish()
    }
}

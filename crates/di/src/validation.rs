//! ValidationEngine - проверки на этапе регистрации и статический анализ графа
//!
//! Регистрационные проверки синхронны и отклоняют регистрацию через
//! `DIError::Registration`. Анализ графа (циклы, отсутствующие зависимости,
//! captive dependencies) выполняется по требованию.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::{
    dependency_graph::DependencyGraph,
    descriptor::{ConstructorDescriptor, ServiceScope},
    errors::{DIError, DIResult},
    registry::ServiceRegistry,
    types::ServiceKey,
};

/// Что регистрируется - входные данные для проверок
#[derive(Debug, Clone, Copy)]
pub struct RegistrationRequest<'a> {
    pub interface: ServiceKey,
    pub implementation: Option<ServiceKey>,
    pub constructor: Option<&'a ConstructorDescriptor>,
    pub scope: ServiceScope,
}

/// Пользовательское правило регистрации (соглашения проекта, запрет
/// определенных scope для интерфейса и т.п.). `Err(message)` отклоняет регистрацию.
pub type RegistrationRule =
    Arc<dyn Fn(&RegistrationRequest<'_>) -> Result<(), String> + Send + Sync>;

/// Singleton, захвативший короткоживущую зависимость
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptiveDependency {
    pub service: String,
    pub service_scope: ServiceScope,
    pub dependency: String,
    pub dependency_scope: ServiceScope,
}

/// Результат статического анализа графа
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    /// Замкнутые циклы: `[A, B, A]`
    pub cycles: Vec<Vec<String>>,
    /// (сервис, отсутствующая зависимость)
    pub missing: Vec<(String, String)>,
    pub captive: Vec<CaptiveDependency>,
    /// Все известные интерфейсы, для сообщений об ошибках
    #[serde(skip)]
    registered: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.cycles.is_empty() && self.missing.is_empty()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.captive
            .iter()
            .map(|c| {
                format!(
                    "{} ({}) captures {} ({})",
                    c.service, c.service_scope, c.dependency, c.dependency_scope
                )
            })
            .collect()
    }

    /// Первая ошибка: сначала циклы, затем отсутствующие зависимости
    pub fn into_result(self) -> DIResult<()> {
        if let Some(chain) = self.cycles.into_iter().next() {
            return Err(DIError::CircularDependency { chain });
        }
        if let Some((_, dependency)) = self.missing.into_iter().next() {
            return Err(DIError::not_registered(dependency, self.registered));
        }
        Ok(())
    }
}

pub struct ValidationEngine {
    allow_reregistration: bool,
    max_registrations: usize,
    rules: RwLock<Vec<(String, RegistrationRule)>>,
}

impl ValidationEngine {
    pub fn new(allow_reregistration: bool, max_registrations: usize) -> Self {
        Self {
            allow_reregistration,
            max_registrations,
            rules: RwLock::new(Vec::new()),
        }
    }

    pub fn add_rule<F>(&self, name: impl Into<String>, rule: F)
    where
        F: Fn(&RegistrationRequest<'_>) -> Result<(), String> + Send + Sync + 'static,
    {
        self.rules.write().push((name.into(), Arc::new(rule)));
    }

    /// Проверки перед записью в registry
    pub fn validate_registration(
        &self,
        registry: &ServiceRegistry,
        request: &RegistrationRequest<'_>,
    ) -> DIResult<()> {
        let interface = request.interface;

        if interface.is_primitive() {
            return Err(DIError::registration(
                interface.name(),
                "primitive types cannot be registered as services",
            ));
        }

        match registry.get_descriptor(&interface) {
            Some(existing) if existing.scope != request.scope => {
                return Err(DIError::registration(
                    interface.name(),
                    format!(
                        "already registered as {} and cannot be rebound as {}",
                        existing.scope, request.scope
                    ),
                ));
            }
            Some(existing) if !self.allow_reregistration => {
                return Err(DIError::registration(
                    interface.name(),
                    format!("already registered ({})", existing.implementation),
                ));
            }
            Some(existing) => {
                warn!(
                    "Overwriting registration of {} ({} -> {})",
                    interface,
                    existing.implementation,
                    request
                        .implementation
                        .map(|key| key.name())
                        .unwrap_or(interface.name())
                );
            }
            None if registry.registration_count() >= self.max_registrations => {
                return Err(DIError::registration(
                    interface.name(),
                    format!("registration limit of {} reached", self.max_registrations),
                ));
            }
            None => {}
        }

        if let Some(constructor) = request.constructor {
            validate_constructor(request, constructor)?;
        }

        for (name, rule) in self.rules.read().iter() {
            rule(request).map_err(|message| {
                DIError::registration(interface.name(), format!("rule '{name}': {message}"))
            })?;
        }

        debug!("Registration of {} passed validation", interface);
        Ok(())
    }

    /// Граф по объявленным сервисным зависимостям всех регистраций
    pub fn build_graph(&self, registry: &ServiceRegistry) -> DependencyGraph<ServiceKey> {
        let mut graph = DependencyGraph::new();
        for key in registry.registered_keys() {
            graph.add_node(key);
            for dependency in registry.dependencies_of(&key) {
                graph.add_dependency(key, dependency);
            }
        }
        graph
    }

    /// Статический анализ: циклы, отсутствующие зависимости, captive dependencies
    pub fn validate_graph(&self, registry: &ServiceRegistry) -> ValidationReport {
        self.validate_graph_with(registry, |_| false)
    }

    /// То же, но зависимость без регистрации не считается отсутствующей,
    /// если её удовлетворяет `resolvable` (например, пользовательский resolver)
    pub fn validate_graph_with<F>(
        &self,
        registry: &ServiceRegistry,
        resolvable: F,
    ) -> ValidationReport
    where
        F: Fn(&ServiceKey) -> bool,
    {
        let graph = self.build_graph(registry);
        let mut report = ValidationReport {
            cycles: graph
                .find_cycles()
                .into_iter()
                .map(|cycle| cycle.iter().map(|key| key.name().to_string()).collect())
                .collect(),
            registered: registry.registered_names(),
            ..Default::default()
        };

        let mut missing = BTreeSet::new();
        for key in registry.registered_keys() {
            let Some(descriptor) = registry.get_descriptor(&key) else {
                continue;
            };

            for dependency in graph.get_dependencies(&key) {
                match registry.get_descriptor(&dependency) {
                    None if resolvable(&dependency) => {
                        trace!("{} is provided outside the registry", dependency);
                    }
                    None => {
                        missing.insert((key.name().to_string(), dependency.name().to_string()));
                    }
                    Some(dep) if captures(descriptor.scope, dep.scope) => {
                        report.captive.push(CaptiveDependency {
                            service: key.name().to_string(),
                            service_scope: descriptor.scope,
                            dependency: dependency.name().to_string(),
                            dependency_scope: dep.scope,
                        });
                    }
                    Some(_) => {}
                }
            }
        }
        report.missing = missing.into_iter().collect();

        for warning in report.warnings() {
            warn!("Captive dependency: {}", warning);
        }
        report
    }
}

impl Default for ValidationEngine {
    fn default() -> Self {
        Self::new(true, usize::MAX)
    }
}

impl std::fmt::Debug for ValidationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationEngine")
            .field("allow_reregistration", &self.allow_reregistration)
            .field("max_registrations", &self.max_registrations)
            .field("rules", &self.rules.read().len())
            .finish()
    }
}

fn validate_constructor(
    request: &RegistrationRequest<'_>,
    constructor: &ConstructorDescriptor,
) -> DIResult<()> {
    let mut seen = BTreeSet::new();

    for parameter in constructor.parameters() {
        if !seen.insert(parameter.name) {
            return Err(DIError::registration(
                request.interface.name(),
                format!("duplicate constructor parameter '{}'", parameter.name),
            ));
        }

        let self_reference = parameter.declared == request.interface
            || request.implementation == Some(parameter.declared);
        if self_reference && !parameter.has_default {
            return Err(DIError::registration(
                request.interface.name(),
                format!("parameter '{}' depends on the service itself", parameter.name),
            ));
        }
    }

    Ok(())
}

/// Долгоживущий сервис держит ссылку на короткоживущий
fn captures(service: ServiceScope, dependency: ServiceScope) -> bool {
    lifetime_rank(service) > lifetime_rank(dependency)
}

fn lifetime_rank(scope: ServiceScope) -> u8 {
    match scope {
        ServiceScope::Singleton => 3,
        ServiceScope::Session => 2,
        ServiceScope::Request => 1,
        ServiceScope::Transient => 0,
    }
}

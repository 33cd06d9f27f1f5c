//! Dependency injection runtime
//!
//! Сервисы регистрируются по интерфейсу (обычно `dyn Trait`) с реализацией,
//! готовым экземпляром или фабрикой и одним из scope: singleton, transient,
//! request, session. `resolve` проходит цепочку стратегий
//! Singleton -> Constructor -> Factory, рекурсивно разрешая зависимости
//! конструктора и обнаруживая циклы по стеку разрешения.
//!
//! ```ignore
//! use di::{implements, ConstructorDescriptor, DIContainer, Dependencies, Injectable};
//!
//! trait Logger: Send + Sync { fn log(&self, msg: &str); }
//! trait Repo: Send + Sync {}
//!
//! struct ConsoleLogger;
//! impl Logger for ConsoleLogger { fn log(&self, msg: &str) { println!("{msg}") } }
//! implements!(ConsoleLogger => dyn Logger);
//! impl Injectable for ConsoleLogger {
//!     fn construct(_: &Dependencies) -> anyhow::Result<Self> { Ok(ConsoleLogger) }
//! }
//!
//! struct SqlRepo { logger: std::sync::Arc<dyn Logger> }
//! impl Repo for SqlRepo {}
//! implements!(SqlRepo => dyn Repo);
//! impl Injectable for SqlRepo {
//!     fn constructor() -> ConstructorDescriptor {
//!         ConstructorDescriptor::new().param::<dyn Logger>("logger")
//!     }
//!     fn construct(deps: &Dependencies) -> anyhow::Result<Self> {
//!         Ok(SqlRepo { logger: deps.get("logger")? })
//!     }
//! }
//!
//! let container = DIContainer::default();
//! container.register_singleton::<dyn Logger, ConsoleLogger>()?;
//! container.register_singleton::<dyn Repo, SqlRepo>()?;
//! let repo = container.resolve::<dyn Repo>()?;
//! ```

pub mod config;
pub mod container;
pub mod dependency_graph;
pub mod descriptor;
pub mod diagnostics;
pub mod errors;
pub mod global;
pub mod lazy;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
pub mod registry;
pub mod resolver_chain;
pub mod resolvers;
pub mod types;
pub mod validation;

pub use config::ContainerConfig;
pub use container::DIContainer;
pub use dependency_graph::{DependencyGraph, DependencyGraphStats};
pub use descriptor::{
    ConstructorDescriptor, Dependencies, Implements, Injectable, Injection, Parameter,
    RegistrationKind, ServiceDescriptor, ServiceScope,
};
pub use diagnostics::DiagnosticReport;
pub use errors::{DIContextExt, DIError, DIResult};
pub use lazy::Lazy;
pub use lifecycle::{CleanupFailure, CleanupReport, LifecycleManager};
pub use metrics::{InterfaceMetrics, PerformanceMetrics};
pub use registry::{RegistrationInfo, RegistryStats, ServiceRegistry};
pub use resolver_chain::ResolverChain;
pub use resolvers::{
    ConstructorResolver, FactoryResolver, ResolutionOrigin, Resolved, ServiceResolverStrategy,
    SingletonResolver,
};
pub use types::{ServiceInstance, ServiceKey};
pub use validation::{
    CaptiveDependency, RegistrationRequest, ValidationEngine, ValidationReport,
};

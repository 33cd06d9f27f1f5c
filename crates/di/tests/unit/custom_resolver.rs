use di::{
    implements, ConstructorDescriptor, DIContainer, DIError, Dependencies, Injectable,
    ResolutionOrigin, Resolved, ServiceInstance, ServiceKey, ServiceRegistry,
    ServiceResolverStrategy,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crate::common::{container, ConsoleLogger, ILogger};

trait IClock: Send + Sync {
    fn now(&self) -> u64;
    fn logger(&self) -> Arc<dyn ILogger>;
}

struct FixedClock {
    at: u64,
    logger: Arc<dyn ILogger>,
}

impl IClock for FixedClock {
    fn now(&self) -> u64 {
        self.at
    }

    fn logger(&self) -> Arc<dyn ILogger> {
        Arc::clone(&self.logger)
    }
}

trait IScheduler: Send + Sync {
    fn clock(&self) -> Arc<dyn IClock>;
}

/// Зарегистрированный сервис, чья зависимость приходит из `ClockResolver`
struct Scheduler {
    clock: Arc<dyn IClock>,
}

impl IScheduler for Scheduler {
    fn clock(&self) -> Arc<dyn IClock> {
        Arc::clone(&self.clock)
    }
}

implements!(Scheduler => dyn IScheduler);

impl Injectable for Scheduler {
    fn constructor() -> ConstructorDescriptor {
        ConstructorDescriptor::new().param::<dyn IClock>("clock")
    }

    fn construct(deps: &Dependencies) -> anyhow::Result<Self> {
        Ok(Scheduler {
            clock: deps.get::<dyn IClock>("clock")?,
        })
    }
}

/// Отдает `dyn IClock` без регистрации, зависимости берет из контейнера
struct ClockResolver {
    released: Arc<AtomicUsize>,
}

impl ServiceResolverStrategy for ClockResolver {
    fn name(&self) -> &'static str {
        "clock"
    }

    fn can_resolve(&self, key: &ServiceKey, _registry: &ServiceRegistry) -> bool {
        *key == ServiceKey::of::<dyn IClock>()
    }

    fn resolve(
        &self,
        key: &ServiceKey,
        registry: &ServiceRegistry,
        container: &DIContainer,
    ) -> Result<Option<Resolved>, DIError> {
        if !self.can_resolve(key, registry) {
            return Ok(None);
        }

        let clock: Arc<dyn IClock> = Arc::new(FixedClock {
            at: 1_700_000_000,
            logger: container.resolve::<dyn ILogger>()?,
        });
        let released = Arc::clone(&self.released);

        Ok(Some(
            Resolved::new(ServiceInstance::new(clock), ResolutionOrigin::External).with_cleanup(
                move || {
                    released.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
            ),
        ))
    }
}

#[test]
fn custom_resolver_is_appended_after_builtins() {
    let container = container();
    let released = Arc::new(AtomicUsize::new(0));

    assert!(!container.can_resolve::<dyn IClock>());
    container.add_resolver(Arc::new(ClockResolver {
        released: Arc::clone(&released),
    }));

    assert_eq!(
        container.resolver_names(),
        vec!["singleton", "constructor", "factory", "clock"]
    );
    assert!(container.can_resolve::<dyn IClock>());
    assert!(!container.is_registered::<dyn IClock>());
}

#[test]
fn custom_resolver_uses_container_for_dependencies() {
    let container = container();
    let released = Arc::new(AtomicUsize::new(0));
    container
        .register_singleton::<dyn ILogger, ConsoleLogger>()
        .unwrap();
    container.add_resolver(Arc::new(ClockResolver {
        released: Arc::clone(&released),
    }));

    let clock = container.resolve::<dyn IClock>().unwrap();
    assert_eq!(clock.now(), 1_700_000_000);
    assert!(Arc::ptr_eq(
        &clock.logger(),
        &container.resolve::<dyn ILogger>().unwrap()
    ));

    let report = container.cleanup_all();
    // cleanup singleton-а ConsoleLogger не нужен, handler только у часов
    assert_eq!(report.invoked, 1);
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[test]
fn errors_from_custom_resolver_propagate() {
    let container = container();
    container.add_resolver(Arc::new(ClockResolver {
        released: Arc::new(AtomicUsize::new(0)),
    }));

    // ILogger не зарегистрирован - ошибка вложенного resolve
    match container.resolve::<dyn IClock>() {
        Err(DIError::ServiceNotRegistered { interface, .. }) => {
            assert!(interface.contains("ILogger"));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("resolved without logger"),
    }
    assert!(container.resolution_stack().is_empty());
}

#[test]
fn registrations_take_precedence_over_custom_resolver() {
    let container = container();
    container
        .register_singleton::<dyn ILogger, ConsoleLogger>()
        .unwrap();
    container
        .register_factory::<dyn IClock, _>(|| {
            Ok(Arc::new(FixedClock {
                at: 42,
                logger: Arc::new(ConsoleLogger::default()),
            }) as Arc<dyn IClock>)
        })
        .unwrap();
    container.add_resolver(Arc::new(ClockResolver {
        released: Arc::new(AtomicUsize::new(0)),
    }));

    assert_eq!(container.resolve::<dyn IClock>().unwrap().now(), 42);
}

#[test]
fn startup_validation_accepts_dependencies_from_custom_resolver() {
    let container = container();
    container
        .register_singleton::<dyn ILogger, ConsoleLogger>()
        .unwrap();
    container
        .register_singleton::<dyn IScheduler, Scheduler>()
        .unwrap();

    // без resolver-а зависимость действительно отсутствует
    assert!(matches!(
        container.validate_all_registrations(),
        Err(DIError::ServiceNotRegistered { .. })
    ));

    container.add_resolver(Arc::new(ClockResolver {
        released: Arc::new(AtomicUsize::new(0)),
    }));

    let report = container.validate_graph();
    assert!(report.missing.is_empty());
    container.validate_all_registrations().unwrap();

    let scheduler = container.resolve::<dyn IScheduler>().unwrap();
    assert_eq!(scheduler.clock().now(), 1_700_000_000);
}

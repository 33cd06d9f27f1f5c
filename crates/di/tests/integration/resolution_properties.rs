use di::{implements, ConstructorDescriptor, DIError, Dependencies, Injectable};
use proptest::prelude::*;
use std::{error::Error as _, sync::Arc};

use crate::common::{
    container, register_app_graph, AImpl, BImpl, BrokenDatabase, CImpl, IA, IB, IC, IFlaky,
    ILogger, IRepo, IService, ConsoleLogger,
};

trait IMailer: Send + Sync {
    fn port(&self) -> u16;
    fn logger(&self) -> Arc<dyn ILogger>;
}

/// Примитивный `port` без default плюс сервисный `logger`
struct SmtpMailer {
    logger: Arc<dyn ILogger>,
    port: u16,
}

impl IMailer for SmtpMailer {
    fn port(&self) -> u16 {
        self.port
    }

    fn logger(&self) -> Arc<dyn ILogger> {
        Arc::clone(&self.logger)
    }
}

implements!(SmtpMailer => dyn IMailer);

impl Injectable for SmtpMailer {
    fn constructor() -> ConstructorDescriptor {
        ConstructorDescriptor::new()
            .param::<dyn ILogger>("logger")
            .param::<u16>("port")
    }

    fn construct(deps: &Dependencies) -> anyhow::Result<Self> {
        assert!(deps.is_skipped("port"));
        let port = deps.optional::<u16>("port")?.map(|p| *p).unwrap_or(25);
        Ok(SmtpMailer {
            logger: deps.get::<dyn ILogger>("logger")?,
            port,
        })
    }
}

trait IStrictMailer: Send + Sync {}

/// Требует внедрения примитива - это ошибка конфигурации
struct StrictMailer;

impl IStrictMailer for StrictMailer {}

implements!(StrictMailer => dyn IStrictMailer);

impl Injectable for StrictMailer {
    fn constructor() -> ConstructorDescriptor {
        ConstructorDescriptor::new()
            .param::<dyn ILogger>("logger")
            .param::<String>("host")
    }

    fn construct(deps: &Dependencies) -> anyhow::Result<Self> {
        deps.get::<dyn ILogger>("logger")?;
        deps.get::<String>("host")?;
        Ok(StrictMailer)
    }
}

trait IExploding: Send + Sync {}

struct Exploding;

impl IExploding for Exploding {}

implements!(Exploding => dyn IExploding);

impl Injectable for Exploding {
    fn constructor() -> ConstructorDescriptor {
        ConstructorDescriptor::new().param::<dyn ILogger>("logger")
    }

    fn construct(_deps: &Dependencies) -> anyhow::Result<Self> {
        panic!("constructor panicked");
    }
}

fn register_cycle(container: &di::DIContainer) {
    container.register_singleton::<dyn IA, AImpl>().unwrap();
    container.register_singleton::<dyn IB, BImpl>().unwrap();
    container.register_singleton::<dyn IC, CImpl>().unwrap();
}

#[test]
fn singleton_identity() {
    let container = container();
    register_app_graph(&container);

    let first = container.resolve::<dyn IRepo>().unwrap();
    let second = container.resolve::<dyn IRepo>().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn transient_and_factory_freshness() {
    let container = container();
    register_app_graph(&container);
    container
        .register_factory::<ConsoleLogger, _>(|| Ok(Arc::new(ConsoleLogger::default())))
        .unwrap();

    let a = container.resolve::<dyn IService>().unwrap();
    let b = container.resolve::<dyn IService>().unwrap();
    assert!(!Arc::ptr_eq(&a, &b));

    let x = container.resolve::<ConsoleLogger>().unwrap();
    let y = container.resolve::<ConsoleLogger>().unwrap();
    assert!(!Arc::ptr_eq(&x, &y));
}

#[test]
fn cycle_is_detected_with_full_chain() {
    let container = container();
    register_cycle(&container);

    let error = container.resolve::<dyn IA>().err().unwrap();
    match error {
        DIError::CircularDependency { chain } => {
            let expected: Vec<String> = vec![
                std::any::type_name::<dyn IA>().to_string(),
                std::any::type_name::<dyn IB>().to_string(),
                std::any::type_name::<dyn IC>().to_string(),
                std::any::type_name::<dyn IA>().to_string(),
            ];
            assert_eq!(chain, expected);
        }
        other => panic!("expected cycle, got {other:?}"),
    }
}

#[test]
fn stack_is_restored_after_every_kind_of_failure() {
    let container = container();
    register_app_graph(&container);
    register_cycle(&container);
    container
        .register_transient::<dyn IFlaky, BrokenDatabase>()
        .unwrap();

    trait IUnknown: Send + Sync {}

    assert!(matches!(
        container.resolve::<dyn IUnknown>(),
        Err(DIError::ServiceNotRegistered { .. })
    ));
    assert!(container.resolve::<dyn ILogger>().is_ok());

    assert!(matches!(
        container.resolve::<dyn IB>(),
        Err(DIError::CircularDependency { .. })
    ));
    assert!(container.resolve::<dyn IRepo>().is_ok());

    assert!(matches!(
        container.resolve::<dyn IFlaky>(),
        Err(DIError::ResolutionFailed { .. })
    ));
    assert!(container.resolve::<dyn IService>().is_ok());
    assert!(container.resolution_stack().is_empty());
}

#[test]
fn stack_is_restored_after_constructor_panic() {
    let container = container();
    register_app_graph(&container);
    container
        .register_transient::<dyn IExploding, Exploding>()
        .unwrap();

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = container.resolve::<dyn IExploding>();
    }));
    assert!(outcome.is_err());

    assert!(container.resolution_stack().is_empty());
    assert!(container.resolve::<dyn IService>().is_ok());
}

#[test]
fn construction_errors_keep_cause_and_interface() {
    let container = container();
    container
        .register_transient::<dyn IFlaky, BrokenDatabase>()
        .unwrap();

    let error = container.resolve::<dyn IFlaky>().err().unwrap();
    assert_eq!(error.interface(), Some(std::any::type_name::<dyn IFlaky>()));
    assert!(error.to_string().contains("database unreachable"));

    let source = error.source().unwrap();
    assert!(source.to_string().contains("database unreachable"));
}

#[test]
fn primitives_are_never_injected() {
    let container = container();
    container
        .register_singleton::<dyn ILogger, ConsoleLogger>()
        .unwrap();
    container
        .register_singleton::<dyn IMailer, SmtpMailer>()
        .unwrap();
    container
        .register_singleton::<dyn IStrictMailer, StrictMailer>()
        .unwrap();

    let mailer = container.resolve::<dyn IMailer>().unwrap();
    assert_eq!(mailer.port(), 25);
    assert!(Arc::ptr_eq(
        &mailer.logger(),
        &container.resolve::<dyn ILogger>().unwrap()
    ));

    let error = container.resolve::<dyn IStrictMailer>().err().unwrap();
    match error {
        DIError::UninjectableParameter {
            parameter,
            declared_type,
            ..
        } => {
            assert_eq!(parameter, "host");
            assert!(declared_type.contains("String"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn not_registered_lists_every_known_interface() {
    let container = container();
    register_app_graph(&container);

    trait IZ: Send + Sync {}

    let message = container.resolve::<dyn IZ>().err().unwrap().to_string();
    assert!(message.contains("IZ"));
    for name in ["ILogger", "IRepo", "IService"] {
        assert!(message.contains(name), "{name} missing from: {message}");
    }
}

#[derive(Debug, Clone, Copy)]
enum Request {
    Logger,
    Repo,
    Service,
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_singletons_stay_identical_in_any_order(
        order in proptest::collection::vec(
            prop_oneof![Just(Request::Logger), Just(Request::Repo), Just(Request::Service)],
            1..24,
        )
    ) {
        let container = di::DIContainer::default();
        register_app_graph(&container);

        let logger = container.resolve::<dyn ILogger>().unwrap();
        let repo = container.resolve::<dyn IRepo>().unwrap();

        for request in order {
            match request {
                Request::Logger => {
                    prop_assert!(Arc::ptr_eq(&logger, &container.resolve::<dyn ILogger>().unwrap()));
                }
                Request::Repo => {
                    prop_assert!(Arc::ptr_eq(&repo, &container.resolve::<dyn IRepo>().unwrap()));
                }
                Request::Service => {
                    let service = container.resolve::<dyn IService>().unwrap();
                    prop_assert!(Arc::ptr_eq(&repo, &service.repo()));
                    prop_assert!(Arc::ptr_eq(&logger, &service.logger()));
                }
            }
        }
        prop_assert!(container.resolution_stack().is_empty());
    }
}

//! Common Test Utilities
//!
//! Общие сервисы-фикстуры для integration и unit тестов контейнера.

#![allow(dead_code)]

use di::{implements, ConstructorDescriptor, DIContainer, Dependencies, Injectable};
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

pub fn init_logging() {
    di::logging::init_test_logging();
}

pub fn container() -> DIContainer {
    init_logging();
    DIContainer::default()
}

// === logger / repo / service (E2E scenario 1) ===

pub trait ILogger: Send + Sync {
    fn log(&self, message: &str);
    fn lines(&self) -> Vec<String>;
}

#[derive(Default)]
pub struct ConsoleLogger {
    lines: Mutex<Vec<String>>,
}

impl ILogger for ConsoleLogger {
    fn log(&self, message: &str) {
        self.lines.lock().push(message.to_string());
    }

    fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

implements!(ConsoleLogger => dyn ILogger);

impl Injectable for ConsoleLogger {
    fn construct(_deps: &Dependencies) -> anyhow::Result<Self> {
        Ok(ConsoleLogger::default())
    }
}

pub trait IRepo: Send + Sync {
    fn logger(&self) -> Arc<dyn ILogger>;
}

pub struct SqlRepo {
    logger: Arc<dyn ILogger>,
}

impl IRepo for SqlRepo {
    fn logger(&self) -> Arc<dyn ILogger> {
        Arc::clone(&self.logger)
    }
}

implements!(SqlRepo => dyn IRepo);

impl Injectable for SqlRepo {
    fn constructor() -> ConstructorDescriptor {
        ConstructorDescriptor::new().param::<dyn ILogger>("logger")
    }

    fn construct(deps: &Dependencies) -> anyhow::Result<Self> {
        let logger = deps.get::<dyn ILogger>("logger")?;
        logger.log("SqlRepo created");
        Ok(SqlRepo { logger })
    }
}

pub trait IService: Send + Sync {
    fn repo(&self) -> Arc<dyn IRepo>;
    fn logger(&self) -> Arc<dyn ILogger>;
}

pub struct AppService {
    repo: Arc<dyn IRepo>,
    logger: Arc<dyn ILogger>,
}

impl IService for AppService {
    fn repo(&self) -> Arc<dyn IRepo> {
        Arc::clone(&self.repo)
    }

    fn logger(&self) -> Arc<dyn ILogger> {
        Arc::clone(&self.logger)
    }
}

implements!(AppService => dyn IService);

impl Injectable for AppService {
    fn constructor() -> ConstructorDescriptor {
        ConstructorDescriptor::new()
            .param::<dyn IRepo>("repo")
            .param::<dyn ILogger>("logger")
    }

    fn construct(deps: &Dependencies) -> anyhow::Result<Self> {
        Ok(AppService {
            repo: deps.get::<dyn IRepo>("repo")?,
            logger: deps.get::<dyn ILogger>("logger")?,
        })
    }
}

pub fn register_app_graph(container: &DIContainer) {
    container
        .register_singleton::<dyn ILogger, ConsoleLogger>()
        .unwrap();
    container.register_singleton::<dyn IRepo, SqlRepo>().unwrap();
    container
        .register_transient::<dyn IService, AppService>()
        .unwrap();
}

// === cycle A -> B -> C -> A ===

pub trait IA: Send + Sync {}
pub trait IB: Send + Sync {}
pub trait IC: Send + Sync {}

pub struct AImpl;
pub struct BImpl;
pub struct CImpl;

impl IA for AImpl {}
impl IB for BImpl {}
impl IC for CImpl {}

implements!(AImpl => dyn IA);
implements!(BImpl => dyn IB);
implements!(CImpl => dyn IC);

impl Injectable for AImpl {
    fn constructor() -> ConstructorDescriptor {
        ConstructorDescriptor::new().param::<dyn IB>("b")
    }

    fn construct(deps: &Dependencies) -> anyhow::Result<Self> {
        deps.get::<dyn IB>("b")?;
        Ok(AImpl)
    }
}

impl Injectable for BImpl {
    fn constructor() -> ConstructorDescriptor {
        ConstructorDescriptor::new().param::<dyn IC>("c")
    }

    fn construct(deps: &Dependencies) -> anyhow::Result<Self> {
        deps.get::<dyn IC>("c")?;
        Ok(BImpl)
    }
}

impl Injectable for CImpl {
    fn constructor() -> ConstructorDescriptor {
        ConstructorDescriptor::new().param::<dyn IA>("a")
    }

    fn construct(deps: &Dependencies) -> anyhow::Result<Self> {
        deps.get::<dyn IA>("a")?;
        Ok(CImpl)
    }
}

// === request-scoped service with cleanup ===

pub static REQUEST_CONTEXTS_DISPOSED: AtomicUsize = AtomicUsize::new(0);

pub trait IRequestContext: Send + Sync {
    fn id(&self) -> usize;
}

pub struct RequestContext {
    id: usize,
}

impl IRequestContext for RequestContext {
    fn id(&self) -> usize {
        self.id
    }
}

implements!(RequestContext => dyn IRequestContext);

impl Injectable for RequestContext {
    const NEEDS_CLEANUP: bool = true;

    fn construct(_deps: &Dependencies) -> anyhow::Result<Self> {
        static NEXT_ID: AtomicUsize = AtomicUsize::new(1);
        Ok(RequestContext {
            id: NEXT_ID.fetch_add(1, Ordering::SeqCst),
        })
    }

    fn dispose(&self) -> anyhow::Result<()> {
        REQUEST_CONTEXTS_DISPOSED.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// === failing constructor ===

pub trait IFlaky: Send + Sync {}

pub struct BrokenDatabase;

impl IFlaky for BrokenDatabase {}

implements!(BrokenDatabase => dyn IFlaky);

impl Injectable for BrokenDatabase {
    fn construct(_deps: &Dependencies) -> anyhow::Result<Self> {
        Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "database unreachable",
        )
        .into())
    }
}

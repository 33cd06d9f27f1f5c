use di::{implements, DIError, Dependencies, Injectable, ServiceScope};
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crate::common::{container, IRequestContext, RequestContext};

static POOLS_CLOSED: AtomicUsize = AtomicUsize::new(0);

trait IPool: Send + Sync {}

struct ConnectionPool;

impl IPool for ConnectionPool {}

implements!(ConnectionPool => dyn IPool);

impl Injectable for ConnectionPool {
    const NEEDS_CLEANUP: bool = true;

    fn construct(_deps: &Dependencies) -> anyhow::Result<Self> {
        Ok(ConnectionPool)
    }

    fn dispose(&self) -> anyhow::Result<()> {
        POOLS_CLOSED.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn singleton_cleanup_runs_once_on_cleanup_all() {
    let container = container();
    container
        .register_singleton::<dyn IPool, ConnectionPool>()
        .unwrap();

    let first = container.resolve::<dyn IPool>().unwrap();
    let _again = container.resolve::<dyn IPool>().unwrap();
    assert_eq!(container.lifecycle().pending_handlers(), 1);

    let report = container.cleanup_all();
    assert_eq!(report.invoked, 1);
    assert!(report.is_clean());
    assert_eq!(POOLS_CLOSED.load(Ordering::SeqCst), 1);

    // регистрация осталась, экземпляр создается заново
    assert!(container.is_registered::<dyn IPool>());
    let fresh = container.resolve::<dyn IPool>().unwrap();
    assert!(!Arc::ptr_eq(&first, &fresh));
    assert_eq!(container.lifecycle().pending_handlers(), 1);
}

#[test]
fn transient_instances_never_register_cleanup() {
    let container = container();
    container
        .register_transient::<dyn IRequestContext, RequestContext>()
        .unwrap();

    for _ in 0..3 {
        container.resolve::<dyn IRequestContext>().unwrap();
    }
    assert_eq!(container.lifecycle().pending_handlers(), 0);
    assert_eq!(container.cleanup_all().invoked, 0);
}

#[test]
fn scoped_resolution_requires_active_scope() {
    let container = container();
    container
        .register_scoped::<dyn IRequestContext, RequestContext>(ServiceScope::Session)
        .unwrap();

    match container.resolve::<dyn IRequestContext>() {
        Err(DIError::ScopeNotActive { interface, scope }) => {
            assert!(interface.contains("IRequestContext"));
            assert_eq!(scope, ServiceScope::Session.to_string());
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("scoped service resolved without a scope"),
    }

    container.create_scope("session-1");
    assert!(container.resolve::<dyn IRequestContext>().is_ok());

    container.dispose_scope("session-1").unwrap();
    assert_eq!(container.active_scope(), None);
    assert!(matches!(
        container.resolve::<dyn IRequestContext>(),
        Err(DIError::ScopeNotActive { .. })
    ));
}

#[test]
fn resolve_in_scope_leaves_active_scope_untouched() {
    let container = container();
    container
        .register_scoped::<dyn IRequestContext, RequestContext>(ServiceScope::Request)
        .unwrap();

    container.create_scope("a");
    container.create_scope("b");
    assert_eq!(container.active_scope().as_deref(), Some("b"));

    let in_a = container
        .resolve_in_scope::<dyn IRequestContext>("a")
        .unwrap();
    assert_eq!(container.active_scope().as_deref(), Some("b"));

    let in_b = container.resolve::<dyn IRequestContext>().unwrap();
    assert!(!Arc::ptr_eq(&in_a, &in_b));

    let in_a_again = container
        .resolve_in_scope::<dyn IRequestContext>("a")
        .unwrap();
    assert!(Arc::ptr_eq(&in_a, &in_a_again));

    assert!(matches!(
        container.resolve_in_scope::<dyn IRequestContext>("missing"),
        Err(DIError::ScopeNotFound { .. })
    ));
}

#[test]
fn scope_switching() {
    let container = container();
    container
        .register_scoped::<dyn IRequestContext, RequestContext>(ServiceScope::Request)
        .unwrap();

    container.create_scope("first");
    let first = container.resolve::<dyn IRequestContext>().unwrap();
    container.create_scope("second");
    let second = container.resolve::<dyn IRequestContext>().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));

    container.enter_scope("first").unwrap();
    let back = container.resolve::<dyn IRequestContext>().unwrap();
    assert!(Arc::ptr_eq(&first, &back));

    assert_eq!(container.exit_scope().as_deref(), Some("first"));
    assert_eq!(container.active_scope(), None);
    assert!(matches!(
        container.enter_scope("unknown"),
        Err(DIError::ScopeNotFound { .. })
    ));
}

#[test]
fn anonymous_scope_roundtrip() {
    let container = container();
    container
        .register_scoped::<dyn IRequestContext, RequestContext>(ServiceScope::Request)
        .unwrap();

    let scope_id = container.create_anonymous_scope();
    assert!(scope_id.starts_with("scope-"));
    assert_eq!(container.active_scope().as_deref(), Some(scope_id.as_str()));

    container.resolve::<dyn IRequestContext>().unwrap();
    assert_eq!(container.registry().scoped_instance_count(&scope_id), 1);

    let report = container.dispose_scope(&scope_id).unwrap();
    assert_eq!(report.invoked, 1);
    assert!(!container.lifecycle().scope_ids().contains(&scope_id));
    assert!(matches!(
        container.dispose_scope(&scope_id),
        Err(DIError::ScopeNotFound { .. })
    ));
}

#[test]
fn cleanup_runs_in_registration_order_and_collects_failures() {
    let container = container();
    let order = Arc::new(Mutex::new(Vec::new()));

    for name in ["first", "second", "third"] {
        let order = Arc::clone(&order);
        container.add_cleanup_handler(name, move || {
            order.lock().push(name);
            if name == "second" {
                anyhow::bail!("flush failed");
            }
            Ok(())
        });
    }

    let report = container.cleanup_all();
    assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    assert_eq!(report.invoked, 3);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].name, "second");
    assert!(report.failures[0].error.contains("flush failed"));

    // handler-ы исполняются один раз
    assert_eq!(container.cleanup_all().invoked, 0);
}

#[test]
fn scope_handlers_run_only_for_their_scope() {
    let container = container();
    let ran = Arc::new(Mutex::new(Vec::new()));

    container.create_scope("s1");
    container.create_scope("s2");
    for scope in ["s1", "s2"] {
        let ran = Arc::clone(&ran);
        container
            .add_scope_cleanup_handler(scope, format!("close-{scope}"), move || {
                ran.lock().push(scope);
                Ok(())
            })
            .unwrap();
    }

    let report = container.dispose_scope("s1").unwrap();
    assert_eq!(report.invoked, 1);
    assert_eq!(*ran.lock(), vec!["s1"]);
    assert_eq!(container.active_scope().as_deref(), Some("s2"));
    assert_eq!(container.lifecycle().pending_handlers(), 1);

    let report = container.cleanup_all();
    assert_eq!(report.invoked, 1);
    assert_eq!(*ran.lock(), vec!["s1", "s2"]);
    assert!(container.lifecycle().scope_ids().is_empty());

    assert!(matches!(
        container.add_scope_cleanup_handler("s1", "late", || Ok(())),
        Err(DIError::ScopeNotFound { .. })
    ));
}

#[test]
fn scoped_instances_disposed_with_scope() {
    let container = container();
    container
        .register_scoped::<dyn IRequestContext, RequestContext>(ServiceScope::Request)
        .unwrap();

    container.create_scope("req");
    let ctx = container.resolve::<dyn IRequestContext>().unwrap();
    container.resolve::<dyn IRequestContext>().unwrap();
    assert_eq!(container.lifecycle().pending_handlers(), 1);

    let report = container.dispose_scope("req").unwrap();
    assert_eq!(report.invoked, 1);
    assert_eq!(container.lifecycle().pending_handlers(), 0);

    container.create_scope("req");
    let fresh = container.resolve::<dyn IRequestContext>().unwrap();
    assert_ne!(ctx.id(), fresh.id());
}

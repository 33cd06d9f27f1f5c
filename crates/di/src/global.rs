//! Глобальный контейнер для interop-кода, который не может получить
//! контейнер явно. Основной способ - передавать `Arc<DIContainer>` из
//! composition root.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

use crate::container::DIContainer;

static GLOBAL_CONTAINER: Lazy<RwLock<Option<Arc<DIContainer>>>> = Lazy::new(|| RwLock::new(None));

/// Текущий глобальный контейнер; создается с конфигурацией по умолчанию при первом обращении
pub fn container() -> Arc<DIContainer> {
    if let Some(existing) = GLOBAL_CONTAINER.read().as_ref() {
        return Arc::clone(existing);
    }

    let mut slot = GLOBAL_CONTAINER.write();
    Arc::clone(slot.get_or_insert_with(|| {
        debug!("Creating global DI container");
        Arc::new(DIContainer::default())
    }))
}

/// Заменить глобальный контейнер, вернув предыдущий
pub fn set_container(container: Arc<DIContainer>) -> Option<Arc<DIContainer>> {
    info!("Global DI container set to '{}'", container.name());
    GLOBAL_CONTAINER.write().replace(container)
}

/// Сбросить глобальный контейнер (изоляция тестов). Cleanup handler-ы
/// предыдущего контейнера выполняются.
pub fn reset_container() {
    let previous = GLOBAL_CONTAINER.write().take();
    if let Some(previous) = previous {
        let report = previous.cleanup_all();
        debug!(
            "Global DI container reset ({} cleanup handlers)",
            report.invoked
        );
    }
}

pub fn is_initialized() -> bool {
    GLOBAL_CONTAINER.read().is_some()
}

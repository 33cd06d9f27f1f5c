use once_cell::sync::OnceCell;
use std::{fmt, sync::Arc};

use crate::{container::DIContainer, errors::DIResult, types::ServiceKey};

/// Отложенное разрешение сервиса.
///
/// Создание прокси не трогает стек разрешения; первый успешный `get()`
/// кэширует экземпляр. Ошибка первого разрешения не кэшируется, следующий
/// `get()` попробует снова.
pub struct Lazy<I: ?Sized + Send + Sync + 'static> {
    container: Arc<DIContainer>,
    cell: OnceCell<Arc<I>>,
}

impl<I: ?Sized + Send + Sync + 'static> Lazy<I> {
    pub(crate) fn new(container: Arc<DIContainer>) -> Self {
        Self {
            container,
            cell: OnceCell::new(),
        }
    }

    pub fn get(&self) -> DIResult<Arc<I>> {
        self.cell
            .get_or_try_init(|| self.container.resolve::<I>())
            .map(Arc::clone)
    }

    pub fn is_resolved(&self) -> bool {
        self.cell.get().is_some()
    }

    pub fn interface(&self) -> ServiceKey {
        ServiceKey::of::<I>()
    }
}

impl<I: ?Sized + Send + Sync + 'static> fmt::Debug for Lazy<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("interface", &self.interface())
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

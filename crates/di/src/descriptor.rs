//! Описание регистраций: scope, дескриптор сервиса и дескриптор конструктора
//!
//! Рефлексии в Rust нет, поэтому каждая реализация сама описывает свой
//! конструктор через [`Injectable::constructor`]: упорядоченный список
//! `(имя параметра, объявленный тип, есть ли default)`. Совместимость
//! реализации с интерфейсом доказывается на этапе компиляции через
//! [`Implements`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    errors::DIError,
    types::{ServiceInstance, ServiceKey},
};

/// Политика жизненного цикла сервиса
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceScope {
    /// Один экземпляр на контейнер
    #[default]
    Singleton,
    /// Новый экземпляр на каждый resolve
    Transient,
    /// Один экземпляр на request scope
    Request,
    /// Один экземпляр на session scope
    Session,
}

impl ServiceScope {
    /// Кэшируется ли экземпляр в именованном scope
    pub fn is_scoped(&self) -> bool {
        matches!(self, ServiceScope::Request | ServiceScope::Session)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceScope::Singleton => "singleton",
            ServiceScope::Transient => "transient",
            ServiceScope::Request => "request",
            ServiceScope::Session => "session",
        }
    }
}

impl fmt::Display for ServiceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Чем удовлетворяется регистрация
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationKind {
    /// Конструирование реализации через constructor injection
    Implementation,
    /// Готовый экземпляр
    Instance,
    /// Фабричная функция без аргументов
    Factory,
}

/// Метаданные одной регистрации. Создается при регистрации и больше не меняется.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub interface: ServiceKey,
    /// Имя реализации; для фабрик - имя интерфейса
    pub implementation: &'static str,
    pub scope: ServiceScope,
    pub kind: RegistrationKind,
    pub is_lazy: bool,
    pub registered_at: DateTime<Utc>,
}

impl ServiceDescriptor {
    pub fn new(
        interface: ServiceKey,
        implementation: &'static str,
        scope: ServiceScope,
        kind: RegistrationKind,
    ) -> Self {
        Self {
            interface,
            implementation,
            scope,
            kind,
            is_lazy: false,
            registered_at: Utc::now(),
        }
    }

    pub fn lazy(mut self) -> Self {
        self.is_lazy = true;
        self
    }

    pub fn has_factory(&self) -> bool {
        self.kind == RegistrationKind::Factory
    }
}

/// Что конструктор сделает с параметром
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Injection {
    /// Разрешается из контейнера
    Resolve,
    /// Есть default, не внедряется
    SkipDefault,
    /// Примитив, никогда не внедряется
    SkipPrimitive,
}

/// Параметр конструктора
#[derive(Debug, Clone, Copy)]
pub struct Parameter {
    pub name: &'static str,
    pub declared: ServiceKey,
    pub has_default: bool,
}

impl Parameter {
    pub fn injection(&self) -> Injection {
        if self.has_default {
            Injection::SkipDefault
        } else if self.declared.is_primitive() {
            Injection::SkipPrimitive
        } else {
            Injection::Resolve
        }
    }
}

/// Упорядоченный список параметров конструктора
#[derive(Debug, Clone, Default)]
pub struct ConstructorDescriptor {
    parameters: Vec<Parameter>,
}

impl ConstructorDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Параметр без значения по умолчанию
    pub fn param<T: ?Sized + 'static>(mut self, name: &'static str) -> Self {
        self.parameters.push(Parameter {
            name,
            declared: ServiceKey::of::<T>(),
            has_default: false,
        });
        self
    }

    /// Параметр со значением по умолчанию (никогда не внедряется)
    pub fn param_with_default<T: ?Sized + 'static>(mut self, name: &'static str) -> Self {
        self.parameters.push(Parameter {
            name,
            declared: ServiceKey::of::<T>(),
            has_default: true,
        });
        self
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Типы, которые контейнер будет разрешать, в порядке объявления
    pub fn service_dependencies(&self) -> impl Iterator<Item = ServiceKey> + '_ {
        self.parameters
            .iter()
            .filter(|p| p.injection() == Injection::Resolve)
            .map(|p| p.declared)
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

/// Реализация, которую контейнер умеет конструировать.
///
/// ```ignore
/// impl Injectable for SqlRepo {
///     fn constructor() -> ConstructorDescriptor {
///         ConstructorDescriptor::new()
///             .param::<dyn Logger>("logger")
///             .param_with_default::<u32>("pool_size")
///     }
///
///     fn construct(deps: &Dependencies) -> anyhow::Result<Self> {
///         Ok(Self { logger: deps.get::<dyn Logger>("logger")?, pool_size: 8 })
///     }
/// }
/// ```
pub trait Injectable: Sized + Send + Sync + 'static {
    /// Нужно ли регистрировать cleanup handler для экземпляра
    const NEEDS_CLEANUP: bool = false;

    fn constructor() -> ConstructorDescriptor {
        ConstructorDescriptor::new()
    }

    fn construct(deps: &Dependencies) -> anyhow::Result<Self>;

    /// Вызывается при dispose_scope / cleanup_all, если `NEEDS_CLEANUP`
    fn dispose(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Доказательство того, что `Self` удовлетворяет интерфейсу `I`
pub trait Implements<I: ?Sized>: Send + Sync + 'static {
    fn upcast(self: Arc<Self>) -> Arc<I>;
}

impl<T: Send + Sync + 'static> Implements<T> for T {
    fn upcast(self: Arc<Self>) -> Arc<T> {
        self
    }
}

/// Объявить, что реализация удовлетворяет одному или нескольким интерфейсам.
///
/// ```ignore
/// di::implements!(ConsoleLogger => dyn Logger);
/// ```
#[macro_export]
macro_rules! implements {
    ($implementation:ty => $($interface:ty),+ $(,)?) => {
        $(
            impl $crate::Implements<$interface> for $implementation {
                fn upcast(self: ::std::sync::Arc<Self>) -> ::std::sync::Arc<$interface> {
                    self
                }
            }
        )+
    };
}

/// Разрешенные зависимости, передаваемые в [`Injectable::construct`]
#[derive(Debug)]
pub struct Dependencies {
    implementation: &'static str,
    resolved: HashMap<&'static str, ServiceInstance>,
    skipped: HashMap<&'static str, Parameter>,
}

impl Dependencies {
    pub(crate) fn new(implementation: &'static str) -> Self {
        Self {
            implementation,
            resolved: HashMap::new(),
            skipped: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, name: &'static str, instance: ServiceInstance) {
        self.resolved.insert(name, instance);
    }

    pub(crate) fn skip(&mut self, parameter: Parameter) {
        self.skipped.insert(parameter.name, parameter);
    }

    /// Внедренный сервис по имени параметра
    pub fn get<I>(&self, name: &str) -> Result<Arc<I>, DIError>
    where
        I: ?Sized + Send + Sync + 'static,
    {
        match self.optional::<I>(name)? {
            Some(service) => Ok(service),
            None => {
                let declared = self
                    .skipped
                    .get(name)
                    .map(|p| p.declared.name())
                    .unwrap_or_else(|| std::any::type_name::<I>());
                Err(DIError::UninjectableParameter {
                    implementation: self.implementation.to_string(),
                    parameter: name.to_string(),
                    declared_type: declared.to_string(),
                })
            }
        }
    }

    /// `None` для параметров, которые контейнер пропустил (примитивы и defaults)
    pub fn optional<I>(&self, name: &str) -> Result<Option<Arc<I>>, DIError>
    where
        I: ?Sized + Send + Sync + 'static,
    {
        match self.resolved.get(name) {
            Some(instance) => instance
                .downcast::<I>()
                .map(Some)
                .ok_or_else(|| DIError::TypeMismatch {
                    name: name.to_string(),
                    expected: std::any::type_name::<I>().to_string(),
                }),
            None if self.skipped.contains_key(name) => Ok(None),
            None => Err(DIError::UninjectableParameter {
                implementation: self.implementation.to_string(),
                parameter: name.to_string(),
                declared_type: "<undeclared>".to_string(),
            }),
        }
    }

    /// Пропущен ли параметр при внедрении
    pub fn is_skipped(&self, name: &str) -> bool {
        self.skipped.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

pub(crate) type CleanupFn = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;
pub(crate) type Activator = Arc<dyn Fn(&Dependencies) -> anyhow::Result<Built> + Send + Sync>;
pub(crate) type FactoryFn = Arc<dyn Fn() -> anyhow::Result<ServiceInstance> + Send + Sync>;

/// Результат конструирования: экземпляр и (опционально) его cleanup
pub(crate) struct Built {
    pub instance: ServiceInstance,
    pub disposer: Option<CleanupFn>,
}

/// Связка интерфейс -> реализация с дескриптором конструктора
#[derive(Clone)]
pub struct ImplementationBinding {
    pub implementation: ServiceKey,
    pub constructor: ConstructorDescriptor,
    activator: Activator,
}

impl ImplementationBinding {
    pub fn of<I, Impl>() -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        Impl: Injectable + Implements<I>,
    {
        let activator: Activator = Arc::new(|deps: &Dependencies| {
            let value = Arc::new(Impl::construct(deps)?);
            let disposer: Option<CleanupFn> = if Impl::NEEDS_CLEANUP {
                let handle = Arc::clone(&value);
                Some(Box::new(move || handle.dispose()))
            } else {
                None
            };
            let interface: Arc<I> = <Impl as Implements<I>>::upcast(value);
            Ok(Built {
                instance: ServiceInstance::new(interface),
                disposer,
            })
        });

        Self {
            implementation: ServiceKey::of::<Impl>(),
            constructor: Impl::constructor(),
            activator,
        }
    }

    pub(crate) fn activate(&self, deps: &Dependencies) -> anyhow::Result<Built> {
        (self.activator)(deps)
    }
}

impl fmt::Debug for ImplementationBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImplementationBinding")
            .field("implementation", &self.implementation)
            .field("constructor", &self.constructor)
            .finish()
    }
}

/// Запись в таблице transient/factory регистраций
#[derive(Clone)]
pub enum FactoryRegistration {
    /// Вызываемая фабрика без аргументов
    Callable(FactoryFn),
    /// Класс реализации, конструируемый заново на каждый resolve
    Implementation(ImplementationBinding),
}

impl FactoryRegistration {
    pub fn constructor(&self) -> Option<&ConstructorDescriptor> {
        match self {
            FactoryRegistration::Callable(_) => None,
            FactoryRegistration::Implementation(binding) => Some(&binding.constructor),
        }
    }
}

impl fmt::Debug for FactoryRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactoryRegistration::Callable(_) => f.write_str("Callable(<fn>)"),
            FactoryRegistration::Implementation(binding) => {
                f.debug_tuple("Implementation").field(binding).finish()
            }
        }
    }
}

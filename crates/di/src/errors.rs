//! Обработка ошибок DI контейнера
//!
//! Все операции контейнера возвращают `Result<T, DIError>`. Ошибки DI считаются
//! ошибками конфигурации, а не runtime-условиями: контейнер их не ретраит и не
//! подставляет default-экземпляры.
//!
//! # АРХИТЕКТУРА ОШИБОК
//!
//! - **Registration**: несовместимая или повторная регистрация (синхронно в `register_*`)
//! - **ServiceNotRegistered**: ни один resolver не смог удовлетворить запрос
//! - **CircularDependency**: цикл обнаружен по стеку разрешения
//! - **ResolutionFailed**: конструктор или фабрика вернули ошибку
//!
//! Код конструирования сервисов работает с `anyhow::Result`. Если внутри
//! `anyhow::Error` лежит `DIError`, он пробрасывается наверх без изменений.

use anyhow::Context;
use std::error::Error as StdError;
use thiserror::Error;

/// Основной error type для всех DI операций
#[derive(Debug, Error)]
pub enum DIError {
    /// Регистрация отклонена ValidationEngine
    #[error("Registration of {interface} rejected: {message}")]
    Registration { interface: String, message: String },

    /// Ни один resolver не смог разрешить тип
    #[error(
        "Service not registered: {interface}. Registered services: [{}]",
        .registered.join(", ")
    )]
    ServiceNotRegistered {
        interface: String,
        registered: Vec<String>,
    },

    /// Цикл в графе зависимостей, обнаруженный во время resolve()
    #[error("Circular dependency detected: {}", .chain.join(" -> "))]
    CircularDependency { chain: Vec<String> },

    /// Конструктор или фабрика завершились ошибкой
    #[error("Failed to resolve {interface}: {source}")]
    ResolutionFailed {
        interface: String,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },

    /// Конструктор запросил параметр, который контейнер не внедряет
    #[error(
        "Parameter '{parameter}' ({declared_type}) of {implementation} is not injectable: \
         primitive and defaulted parameters are never resolved from the container"
    )]
    UninjectableParameter {
        implementation: String,
        parameter: String,
        declared_type: String,
    },

    /// Внедренное значение не совпадает с запрошенным типом
    #[error("Type mismatch for '{name}': expected {expected}")]
    TypeMismatch { name: String, expected: String },

    /// Scoped сервис запрошен без активного scope
    #[error("{interface} is {scope}-scoped but no scope is active")]
    ScopeNotActive { interface: String, scope: String },

    /// Обращение к несуществующему scope
    #[error("Scope '{scope_id}' does not exist")]
    ScopeNotFound { scope_id: String },
}

/// Result alias для DI операций
pub type DIResult<T> = Result<T, DIError>;

impl DIError {
    /// Create registration error
    pub fn registration(interface: impl Into<String>, message: impl Into<String>) -> Self {
        DIError::Registration {
            interface: interface.into(),
            message: message.into(),
        }
    }

    /// Create not-registered error with the snapshot of known interfaces
    pub fn not_registered(interface: impl Into<String>, mut registered: Vec<String>) -> Self {
        registered.sort();
        DIError::ServiceNotRegistered {
            interface: interface.into(),
            registered,
        }
    }

    /// Обернуть произвольную ошибку конструирования.
    ///
    /// `DIError`, пришедший через `anyhow`, возвращается как есть, чтобы
    /// вложенные NotRegistered/Circular не превращались в ResolutionFailed.
    pub fn from_construction(interface: impl Into<String>, err: anyhow::Error) -> Self {
        match err.downcast::<DIError>() {
            Ok(inner) => inner,
            Err(other) => DIError::ResolutionFailed {
                interface: interface.into(),
                source: other.into(),
            },
        }
    }

    /// ResolutionFailed с текстовой причиной
    pub fn resolution_failed(interface: impl Into<String>, reason: impl Into<String>) -> Self {
        let reason: String = reason.into();
        DIError::ResolutionFailed {
            interface: interface.into(),
            source: reason.into(),
        }
    }

    /// Интерфейс, на котором произошла ошибка (если применимо)
    pub fn interface(&self) -> Option<&str> {
        match self {
            DIError::Registration { interface, .. }
            | DIError::ServiceNotRegistered { interface, .. }
            | DIError::ResolutionFailed { interface, .. }
            | DIError::ScopeNotActive { interface, .. } => Some(interface),
            DIError::CircularDependency { chain } => chain.last().map(String::as_str),
            DIError::UninjectableParameter { implementation, .. } => Some(implementation),
            DIError::TypeMismatch { .. } | DIError::ScopeNotFound { .. } => None,
        }
    }

    /// Get error category for monitoring/alerting
    pub fn category(&self) -> &'static str {
        match self {
            DIError::Registration { .. } => "registration",
            DIError::ServiceNotRegistered { .. } => "not_registered",
            DIError::CircularDependency { .. } => "circular_dependency",
            DIError::ResolutionFailed { .. } => "resolution_failed",
            DIError::UninjectableParameter { .. } | DIError::TypeMismatch { .. } => {
                "configuration"
            }
            DIError::ScopeNotActive { .. } | DIError::ScopeNotFound { .. } => "scope",
        }
    }
}

/// Helper trait для добавления DI context к anyhow errors
pub trait DIContextExt<T> {
    fn di_context(self, message: &str) -> anyhow::Result<T>;
    fn di_with_context<F>(self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> DIContextExt<T> for Result<T, DIError> {
    fn di_context(self, message: &str) -> anyhow::Result<T> {
        self.map_err(anyhow::Error::from)
            .with_context(|| message.to_string())
    }

    fn di_with_context<F>(self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(anyhow::Error::from).with_context(f)
    }
}

/// Convenience macro для создания DIError
#[macro_export]
macro_rules! di_error {
    (registration: $iface:expr, $msg:expr) => {
        $crate::errors::DIError::registration($iface, $msg)
    };

    (resolution: $iface:expr, $reason:expr) => {
        $crate::errors::DIError::resolution_failed($iface, $reason)
    };

    (scope_not_found: $scope:expr) => {
        $crate::errors::DIError::ScopeNotFound {
            scope_id: ::std::string::ToString::to_string(&$scope),
        }
    };
}

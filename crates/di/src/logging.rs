//! Инициализация tracing subscriber для приложений, использующих контейнер

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Минимальный уровень, если `RUST_LOG` не задан
    pub level: Level,
    /// Вывод в JSON формате
    pub json_output: bool,
    /// Цветной вывод (только для non-JSON)
    pub color_output: bool,
    pub include_line_numbers: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_output: false,
            color_output: true,
            include_line_numbers: cfg!(debug_assertions),
        }
    }
}

impl LoggingConfig {
    pub fn production() -> Self {
        Self {
            json_output: true,
            color_output: false,
            include_line_numbers: false,
            ..Self::default()
        }
    }
}

/// Установить глобальный subscriber. Повторный вызов возвращает ошибку.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));

    if config.json_output {
        Registry::default()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_line_number(config.include_line_numbers),
            )
            .try_init()?;
    } else {
        Registry::default()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(config.include_line_numbers)
                    .with_ansi(config.color_output),
            )
            .try_init()?;
    }

    Ok(())
}

/// Subscriber для тестов: вывод через test writer, повторные вызовы игнорируются
pub fn init_test_logging() {
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("di=debug")),
        )
        .with_test_writer()
        .try_init();
}

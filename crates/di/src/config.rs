//! Конфигурация контейнера
//!
//! Порядок применения: preset -> TOML файл -> переменные окружения `DI_*`.
//! В файле можно указать `preset = "production"`, остальные ключи
//! переопределяют значения preset-а.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

pub const ENV_PREFIX: &str = "DI_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Имя контейнера в логах и отчетах
    pub name: String,
    /// Разрешить перерегистрацию интерфейса с тем же scope
    pub allow_reregistration: bool,
    pub max_registrations: usize,
    /// Максимальная глубина вложенных resolve
    pub max_resolution_depth: usize,
    pub enable_metrics: bool,
    /// Логировать каждое разрешение на уровне debug
    pub verbose_logging: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            allow_reregistration: true,
            max_registrations: 10_000,
            max_resolution_depth: 64,
            enable_metrics: true,
            verbose_logging: cfg!(debug_assertions),
        }
    }
}

/// Частичная конфигурация из файла или окружения
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigOverrides {
    preset: Option<String>,
    name: Option<String>,
    allow_reregistration: Option<bool>,
    max_registrations: Option<usize>,
    max_resolution_depth: Option<usize>,
    enable_metrics: Option<bool>,
    verbose_logging: Option<bool>,
}

impl ContainerConfig {
    /// Production: строгая регистрация, умеренная глубина, без verbose логов
    pub fn production() -> Self {
        Self {
            name: "production".to_string(),
            allow_reregistration: false,
            max_registrations: 50_000,
            max_resolution_depth: 32,
            enable_metrics: true,
            verbose_logging: false,
        }
    }

    /// Development: перерегистрация разрешена, подробные логи
    pub fn development() -> Self {
        Self {
            name: "development".to_string(),
            allow_reregistration: true,
            max_registrations: 5_000,
            max_resolution_depth: 128,
            enable_metrics: true,
            verbose_logging: true,
        }
    }

    /// Минимальная конфигурация для тестов
    pub fn minimal() -> Self {
        Self {
            name: "minimal".to_string(),
            allow_reregistration: true,
            max_registrations: 1_000,
            max_resolution_depth: 16,
            enable_metrics: false,
            verbose_logging: false,
        }
    }

    pub fn from_preset(preset: &str) -> Result<Self> {
        match preset.to_ascii_lowercase().as_str() {
            "default" => Ok(Self::default()),
            "production" | "prod" => Ok(Self::production()),
            "development" | "dev" => Ok(Self::development()),
            "minimal" | "test" => Ok(Self::minimal()),
            other => Err(anyhow!("Unknown container preset: {}", other)),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let overrides: ConfigOverrides =
            toml::from_str(content).context("Failed to parse container config")?;
        let mut config = match overrides.preset.as_deref() {
            Some(preset) => Self::from_preset(preset)?,
            None => Self::default(),
        };
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        info!("Loaded container config '{}' from {}", config.name, path.display());
        Ok(config)
    }

    /// Файл (если задан) плюс переменные окружения процесса
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(std::env::vars())?;
        Ok(config)
    }

    /// Применить переменные `DI_*` из переданного набора пар
    pub fn apply_env_overrides<I, K, V>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut overrides = ConfigOverrides::default();

        for (key, value) in vars {
            let Some(field) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref().trim();

            match field {
                "PRESET" => overrides.preset = Some(value.to_string()),
                "NAME" => overrides.name = Some(value.to_string()),
                "ALLOW_REREGISTRATION" => {
                    overrides.allow_reregistration = Some(parse_env(field, value)?)
                }
                "MAX_REGISTRATIONS" => overrides.max_registrations = Some(parse_env(field, value)?),
                "MAX_RESOLUTION_DEPTH" => {
                    overrides.max_resolution_depth = Some(parse_env(field, value)?)
                }
                "ENABLE_METRICS" => overrides.enable_metrics = Some(parse_env(field, value)?),
                "VERBOSE_LOGGING" => overrides.verbose_logging = Some(parse_env(field, value)?),
                _ => debug!("Ignoring unknown env override {}{}", ENV_PREFIX, field),
            }
        }

        if let Some(preset) = overrides.preset.as_deref() {
            *self = Self::from_preset(preset)?;
        }
        self.apply(overrides);
        self.validate()
    }

    fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(name) = overrides.name {
            self.name = name;
        }
        if let Some(value) = overrides.allow_reregistration {
            self.allow_reregistration = value;
        }
        if let Some(value) = overrides.max_registrations {
            self.max_registrations = value;
        }
        if let Some(value) = overrides.max_resolution_depth {
            self.max_resolution_depth = value;
        }
        if let Some(value) = overrides.enable_metrics {
            self.enable_metrics = value;
        }
        if let Some(value) = overrides.verbose_logging {
            self.verbose_logging = value;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow!("Container name must not be empty"));
        }
        if self.max_registrations == 0 {
            return Err(anyhow!("max_registrations must be greater than 0"));
        }
        if self.max_resolution_depth == 0 {
            return Err(anyhow!("max_resolution_depth must be greater than 0"));
        }
        Ok(())
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

fn parse_env<T>(field: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| anyhow!("Invalid value for {}{}: '{}' ({})", ENV_PREFIX, field, value, e))
}

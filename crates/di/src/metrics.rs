//! Метрики разрешения зависимостей
//!
//! Каждый вызов resolve (включая вложенные) записывается отдельно, поэтому
//! метрики по интерфейсам показывают и прямые, и транзитивные разрешения.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::Duration,
};
use tracing::debug;

use crate::types::ServiceKey;

const RECENT_WINDOW: usize = 100;

/// Атомарные счетчики для thread-safe метрик
#[derive(Default)]
struct AtomicCounters {
    total_resolutions: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    cache_hits: AtomicU64,
}

impl AtomicCounters {
    fn reset(&self) {
        self.total_resolutions.store(0, Ordering::Relaxed);
        self.successful.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Default)]
struct InterfaceStats {
    resolutions: u64,
    successes: u64,
    failures: u64,
    cache_hits: u64,
    total_time: Duration,
    max_time: Duration,
    last_resolution: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl InterfaceStats {
    fn record(&mut self, duration: Duration) {
        self.resolutions += 1;
        self.total_time += duration;
        self.max_time = self.max_time.max(duration);
        self.last_resolution = Some(Utc::now());
    }

    fn average_time(&self) -> Duration {
        if self.resolutions > 0 {
            let nanos = self.total_time.as_nanos() / u128::from(self.resolutions);
            Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
        } else {
            Duration::ZERO
        }
    }

    fn to_public(&self) -> InterfaceMetrics {
        InterfaceMetrics {
            resolutions: self.resolutions,
            successes: self.successes,
            failures: self.failures,
            cache_hits: self.cache_hits,
            total_time: self.total_time,
            average_time: self.average_time(),
            max_time: self.max_time,
            last_resolution: self.last_resolution,
            last_error: self.last_error.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct TimingStats {
    total: Duration,
    min: Option<Duration>,
    max: Option<Duration>,
    recent: VecDeque<Duration>,
}

impl TimingStats {
    fn record_duration(&mut self, duration: Duration) {
        self.total += duration;
        self.min = Some(self.min.map_or(duration, |current| current.min(duration)));
        self.max = Some(self.max.map_or(duration, |current| current.max(duration)));

        self.recent.push_back(duration);
        if self.recent.len() > RECENT_WINDOW {
            self.recent.pop_front();
        }
    }

    fn percentile(&self, percentile: f64) -> Option<Duration> {
        if self.recent.is_empty() {
            return None;
        }

        let mut sorted: Vec<_> = self.recent.iter().copied().collect();
        sorted.sort();

        let index = (sorted.len() as f64 * percentile / 100.0) as usize;
        sorted.get(index.min(sorted.len() - 1)).copied()
    }
}

/// Метрики одного интерфейса
#[derive(Debug, Clone, Serialize)]
pub struct InterfaceMetrics {
    pub resolutions: u64,
    pub successes: u64,
    pub failures: u64,
    pub cache_hits: u64,
    pub total_time: Duration,
    pub average_time: Duration,
    pub max_time: Duration,
    pub last_resolution: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Снимок метрик контейнера
#[derive(Debug, Clone, Default, Serialize)]
pub struct PerformanceMetrics {
    pub total_resolutions: u64,
    pub successful_resolutions: u64,
    pub failed_resolutions: u64,
    pub cache_hits: u64,
    pub total_resolution_time: Duration,
    pub min_resolution_time: Option<Duration>,
    pub max_resolution_time: Option<Duration>,
    pub p50: Option<Duration>,
    pub p95: Option<Duration>,
    /// Имя интерфейса -> метрики
    pub per_interface: BTreeMap<String, InterfaceMetrics>,
}

impl PerformanceMetrics {
    /// Процент попаданий в кэш
    pub fn cache_hit_rate(&self) -> f64 {
        if self.successful_resolutions > 0 {
            (self.cache_hits as f64 / self.successful_resolutions as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Среднее время разрешения в микросекундах
    pub fn avg_resolve_time_us(&self) -> f64 {
        if self.total_resolutions > 0 {
            self.total_resolution_time.as_nanos() as f64 / self.total_resolutions as f64 / 1000.0
        } else {
            0.0
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.total_resolutions > 0 {
            (self.failed_resolutions as f64 / self.total_resolutions as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Самые медленные интерфейсы по среднему времени
    pub fn slowest(&self, limit: usize) -> Vec<(&str, &InterfaceMetrics)> {
        let mut all: Vec<_> = self
            .per_interface
            .iter()
            .map(|(name, metrics)| (name.as_str(), metrics))
            .collect();
        all.sort_by(|a, b| b.1.average_time.cmp(&a.1.average_time));
        all.truncate(limit);
        all
    }

    pub fn most_used(&self, limit: usize) -> Vec<(&str, &InterfaceMetrics)> {
        let mut all: Vec<_> = self
            .per_interface
            .iter()
            .map(|(name, metrics)| (name.as_str(), metrics))
            .collect();
        all.sort_by(|a, b| b.1.resolutions.cmp(&a.1.resolutions));
        all.truncate(limit);
        all
    }
}

/// Сборщик метрик разрешения
pub struct MetricsCollector {
    enabled: AtomicBool,
    counters: AtomicCounters,
    per_interface: RwLock<HashMap<ServiceKey, InterfaceStats>>,
    timing: RwLock<TimingStats>,
}

impl MetricsCollector {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            counters: AtomicCounters::default(),
            per_interface: RwLock::new(HashMap::new()),
            timing: RwLock::new(TimingStats::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn record_success(&self, key: &ServiceKey, duration: Duration, from_cache: bool) {
        if !self.is_enabled() {
            return;
        }

        self.counters.total_resolutions.fetch_add(1, Ordering::Relaxed);
        self.counters.successful.fetch_add(1, Ordering::Relaxed);
        if from_cache {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
        }

        {
            let mut per_interface = self.per_interface.write();
            let stats = per_interface.entry(*key).or_default();
            stats.record(duration);
            stats.successes += 1;
            if from_cache {
                stats.cache_hits += 1;
            }
        }
        self.timing.write().record_duration(duration);
    }

    pub fn record_failure(&self, key: &ServiceKey, duration: Duration, error: &str) {
        if !self.is_enabled() {
            return;
        }

        self.counters.total_resolutions.fetch_add(1, Ordering::Relaxed);
        self.counters.failed.fetch_add(1, Ordering::Relaxed);

        {
            let mut per_interface = self.per_interface.write();
            let stats = per_interface.entry(*key).or_default();
            stats.record(duration);
            stats.failures += 1;
            stats.last_error = Some(error.to_string());
        }
        self.timing.write().record_duration(duration);
    }

    pub fn snapshot(&self) -> PerformanceMetrics {
        let timing = self.timing.read();

        PerformanceMetrics {
            total_resolutions: self.counters.total_resolutions.load(Ordering::Relaxed),
            successful_resolutions: self.counters.successful.load(Ordering::Relaxed),
            failed_resolutions: self.counters.failed.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            total_resolution_time: timing.total,
            min_resolution_time: timing.min,
            max_resolution_time: timing.max,
            p50: timing.percentile(50.0),
            p95: timing.percentile(95.0),
            per_interface: self
                .per_interface
                .read()
                .iter()
                .map(|(key, stats)| (key.name().to_string(), stats.to_public()))
                .collect(),
        }
    }

    pub fn reset(&self) {
        self.counters.reset();
        self.per_interface.write().clear();
        *self.timing.write() = TimingStats::default();
        debug!("Resolution metrics cleared");
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(true)
    }
}

//! Диагностический отчет контейнера (read-only, без побочных эффектов)

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;

use crate::{
    container::DIContainer,
    dependency_graph::DependencyGraphStats,
    metrics::PerformanceMetrics,
    registry::{RegistrationInfo, RegistryStats},
    validation::ValidationReport,
};

#[derive(Debug, Clone, Serialize)]
pub struct ScopeSummary {
    pub id: String,
    pub instances: usize,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub generated_at: DateTime<Utc>,
    pub container: String,
    pub uptime_seconds: i64,
    pub registry: RegistryStats,
    pub registrations: Vec<RegistrationInfo>,
    pub resolvers: Vec<&'static str>,
    pub scopes: Vec<ScopeSummary>,
    pub pending_cleanup_handlers: usize,
    pub graph: DependencyGraphStats,
    /// Порядок конструирования; `None`, если в графе есть циклы
    pub construction_order: Option<Vec<String>>,
    pub validation: ValidationReport,
    pub metrics: PerformanceMetrics,
}

impl DiagnosticReport {
    pub fn collect(container: &DIContainer) -> Self {
        let generated_at = Utc::now();
        let graph = container.get_dependency_graph();
        let active = container.active_scope();

        let scopes = container
            .lifecycle()
            .scope_ids()
            .into_iter()
            .map(|id| ScopeSummary {
                instances: container.registry().scoped_instance_count(&id),
                active: active.as_deref() == Some(id.as_str()),
                id,
            })
            .collect();

        Self {
            generated_at,
            container: container.name().to_string(),
            uptime_seconds: (generated_at - container.created_at()).num_seconds(),
            registry: container.registry().get_stats(),
            registrations: container.get_all_registrations(),
            resolvers: container.resolver_names(),
            scopes,
            pending_cleanup_handlers: container.lifecycle().pending_handlers(),
            graph: graph.stats(),
            construction_order: graph
                .topological_sort()
                .ok()
                .map(|order| order.iter().map(|key| key.name().to_string()).collect()),
            validation: container.validate_graph(),
            metrics: container.get_performance_metrics(),
        }
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        // write! в String не падает
        let _ = self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "=== DI Container Diagnostic Report ===")?;
        writeln!(out, "Container: {}", self.container)?;
        writeln!(out, "Generated: {}", self.generated_at.to_rfc3339())?;
        writeln!(out, "Uptime: {}s", self.uptime_seconds)?;
        writeln!(out)?;

        writeln!(out, "=== Registrations ({}) ===", self.registrations.len())?;
        writeln!(
            out,
            "Singleton: {}, Transient: {}, Request: {}, Session: {}, Lazy: {}",
            self.registry.singleton_count,
            self.registry.transient_count,
            self.registry.request_count,
            self.registry.session_count,
            self.registry.lazy_count
        )?;
        for info in &self.registrations {
            let mut flags = Vec::new();
            if info.is_lazy {
                flags.push("lazy");
            }
            if info.materialized {
                flags.push("materialized");
            }
            writeln!(
                out,
                "  {} -> {} [{}{}{}]",
                info.interface,
                info.implementation,
                info.scope,
                if flags.is_empty() { "" } else { ", " },
                flags.join(", ")
            )?;
            if !info.dependencies.is_empty() {
                writeln!(out, "      depends on: {}", info.dependencies.join(", "))?;
            }
        }
        writeln!(out)?;

        writeln!(out, "=== Resolver Chain ===")?;
        writeln!(out, "{}", self.resolvers.join(" -> "))?;
        writeln!(out)?;

        writeln!(out, "=== Scopes ===")?;
        if self.scopes.is_empty() {
            writeln!(out, "  (none)")?;
        }
        for scope in &self.scopes {
            writeln!(
                out,
                "  {}{}: {} instances",
                scope.id,
                if scope.active { " (active)" } else { "" },
                scope.instances
            )?;
        }
        writeln!(out, "Pending cleanup handlers: {}", self.pending_cleanup_handlers)?;
        writeln!(out)?;

        writeln!(out, "=== Dependency Graph ===")?;
        writeln!(
            out,
            "Nodes: {}, Edges: {}, Max dependencies: {}, Max dependents: {}",
            self.graph.total_nodes,
            self.graph.total_edges,
            self.graph.max_dependencies,
            self.graph.max_dependents
        )?;
        match &self.construction_order {
            Some(order) => writeln!(out, "Construction order: {}", order.join(", "))?,
            None => writeln!(out, "Construction order: unavailable (cycles present)")?,
        }
        for cycle in &self.validation.cycles {
            writeln!(out, "  ❌ cycle: {}", cycle.join(" -> "))?;
        }
        for (service, dependency) in &self.validation.missing {
            writeln!(out, "  ❌ {} requires unregistered {}", service, dependency)?;
        }
        for warning in self.validation.warnings() {
            writeln!(out, "  ⚠️ {}", warning)?;
        }
        writeln!(out)?;

        writeln!(out, "=== Performance ===")?;
        writeln!(
            out,
            "Resolutions: {} ({} ok, {} failed), cache hit rate {:.1}%",
            self.metrics.total_resolutions,
            self.metrics.successful_resolutions,
            self.metrics.failed_resolutions,
            self.metrics.cache_hit_rate()
        )?;
        writeln!(
            out,
            "Average: {:.1}μs, p95: {:?}, max: {:?}",
            self.metrics.avg_resolve_time_us(),
            self.metrics.p95.unwrap_or_default(),
            self.metrics.max_resolution_time.unwrap_or_default()
        )?;
        for (name, metrics) in self.metrics.slowest(5) {
            writeln!(
                out,
                "  {}: {} resolutions, avg {:?}, {} failures",
                name, metrics.resolutions, metrics.average_time, metrics.failures
            )?;
        }

        Ok(())
    }
}

impl std::fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

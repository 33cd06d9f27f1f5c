use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

/// Граф зависимостей между регистрациями.
///
/// Узлы упорядочены (`Ord`), поэтому обход, найденные циклы и
/// топологический порядок детерминированы.
#[derive(Debug, Clone)]
pub struct DependencyGraph<N: Copy + Ord> {
    /// Отношения зависимостей: узел -> узлы, от которых он зависит
    dependencies: BTreeMap<N, BTreeSet<N>>,
    /// Обратные зависимости: узел -> узлы, которые от него зависят
    dependents: BTreeMap<N, BTreeSet<N>>,
}

/// Статистика графа зависимостей
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct DependencyGraphStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub max_dependencies: usize,
    pub max_dependents: usize,
}

impl<N: Copy + Ord + std::fmt::Debug> DependencyGraph<N> {
    pub fn new() -> Self {
        Self {
            dependencies: BTreeMap::new(),
            dependents: BTreeMap::new(),
        }
    }

    /// Узел без рёбер (регистрация без зависимостей)
    pub fn add_node(&mut self, node: N) {
        self.dependencies.entry(node).or_default();
        self.dependents.entry(node).or_default();
    }

    /// Добавить зависимость: dependent зависит от dependency
    pub fn add_dependency(&mut self, dependent: N, dependency: N) {
        self.add_node(dependent);
        self.add_node(dependency);
        self.dependencies
            .entry(dependent)
            .or_default()
            .insert(dependency);
        self.dependents
            .entry(dependency)
            .or_default()
            .insert(dependent);

        debug!("Added dependency: {:?} -> {:?}", dependent, dependency);
    }

    pub fn contains(&self, node: &N) -> bool {
        self.dependencies.contains_key(node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = N> + '_ {
        self.dependencies.keys().copied()
    }

    pub fn get_dependencies(&self, node: &N) -> Vec<N> {
        self.dependencies
            .get(node)
            .map(|deps| deps.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn get_dependents(&self, node: &N) -> Vec<N> {
        self.dependents
            .get(node)
            .map(|deps| deps.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn has_dependency(&self, dependent: &N, dependency: &N) -> bool {
        self.dependencies
            .get(dependent)
            .map(|deps| deps.contains(dependency))
            .unwrap_or(false)
    }

    /// Все узлы, достижимые из `node` (без него самого, если нет цикла)
    pub fn transitive_dependencies(&self, node: &N) -> BTreeSet<N> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<N> = self.get_dependencies(node).into();

        while let Some(next) = queue.pop_front() {
            if seen.insert(next) {
                queue.extend(self.get_dependencies(&next));
            }
        }

        seen
    }

    /// Найти все циклы. Каждый цикл замкнут: `[A, B, C, A]`.
    pub fn find_cycles(&self) -> Vec<Vec<N>> {
        let mut cycles = Vec::new();
        let mut visited = BTreeSet::new();
        let mut rec_stack = BTreeSet::new();
        let mut path = Vec::new();

        for &node in self.dependencies.keys() {
            if !visited.contains(&node) {
                self.dfs_find_cycles(node, &mut visited, &mut rec_stack, &mut path, &mut cycles);
            }
        }

        cycles
    }

    fn dfs_find_cycles(
        &self,
        node: N,
        visited: &mut BTreeSet<N>,
        rec_stack: &mut BTreeSet<N>,
        path: &mut Vec<N>,
        cycles: &mut Vec<Vec<N>>,
    ) {
        visited.insert(node);
        rec_stack.insert(node);
        path.push(node);

        if let Some(deps) = self.dependencies.get(&node) {
            for &neighbor in deps {
                if !visited.contains(&neighbor) {
                    self.dfs_find_cycles(neighbor, visited, rec_stack, path, cycles);
                } else if rec_stack.contains(&neighbor) {
                    if let Some(cycle_start) = path.iter().position(|&x| x == neighbor) {
                        let mut cycle = path[cycle_start..].to_vec();
                        cycle.push(neighbor);
                        cycles.push(cycle);
                    }
                }
            }
        }

        rec_stack.remove(&node);
        path.pop();
    }

    pub fn has_cycles(&self) -> bool {
        !self.find_cycles().is_empty()
    }

    /// Порядок конструирования: зависимости раньше зависящих.
    ///
    /// При наличии циклов возвращает `Err` с узлами, которые не удалось упорядочить.
    pub fn topological_sort(&self) -> Result<Vec<N>, Vec<N>> {
        let mut in_degree: BTreeMap<N, usize> = self
            .dependencies
            .iter()
            .map(|(node, deps)| (*node, deps.len()))
            .collect();

        let mut queue: VecDeque<N> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&node, _)| node)
            .collect();

        let mut result = Vec::with_capacity(in_degree.len());
        while let Some(node) = queue.pop_front() {
            result.push(node);

            if let Some(dependents) = self.dependents.get(&node) {
                for dependent in dependents {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(*dependent);
                        }
                    }
                }
            }
        }

        if result.len() == in_degree.len() {
            Ok(result)
        } else {
            let placed: BTreeSet<N> = result.into_iter().collect();
            in_degree.retain(|node, _| !placed.contains(node));
            Err(in_degree.into_keys().collect())
        }
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn clear(&mut self) {
        self.dependencies.clear();
        self.dependents.clear();
    }

    pub fn stats(&self) -> DependencyGraphStats {
        DependencyGraphStats {
            total_nodes: self.dependencies.len(),
            total_edges: self.dependencies.values().map(BTreeSet::len).sum(),
            max_dependencies: self
                .dependencies
                .values()
                .map(BTreeSet::len)
                .max()
                .unwrap_or(0),
            max_dependents: self
                .dependents
                .values()
                .map(BTreeSet::len)
                .max()
                .unwrap_or(0),
        }
    }
}

impl<N: Copy + Ord + std::fmt::Debug> Default for DependencyGraph<N> {
    fn default() -> Self {
        Self::new()
    }
}

//! Dependency resolution and staged execution planning.
//!
//! Builds a DAG over task identifiers (edges point dep -> dependent),
//! rejects cycles with the offending members listed, and emits stages via
//! Kahn's algorithm. Staging is deterministic: every observable ordering
//! sorts by the stable task identifier.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::task::{Task, TaskId};

/// A set of tasks executable in parallel: no edges between members and all
/// dependencies satisfied in prior stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    tasks: Vec<TaskId>,
}

impl Stage {
    /// The task identifiers in this stage, sorted.
    #[must_use]
    pub fn tasks(&self) -> &[TaskId] {
        &self.tasks
    }

    /// Number of tasks in this stage.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the stage is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// A stage with more than one member may run its tasks concurrently.
    #[must_use]
    pub fn is_parallel(&self) -> bool {
        self.tasks.len() > 1
    }
}

/// An ordered execution plan. The union of stages equals the task set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagePlan {
    stages: Vec<Stage>,
}

impl StagePlan {
    /// The stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Whether the plan contains no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Total number of tasks across all stages.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.stages.iter().map(Stage::len).sum()
    }
}

/// Dependency resolver over a set of tasks.
///
/// Transient: built per run, discarded after planning.
#[derive(Debug)]
pub struct DependencyResolver {
    graph: DiGraph<TaskId, ()>,
    nodes: HashMap<TaskId, NodeIndex>,
}

impl DependencyResolver {
    /// Build the DAG from a task set.
    ///
    /// # Errors
    ///
    /// - `Error::DuplicateTask` if two tasks share an identifier.
    /// - `Error::UnknownDependency` if a dependency id is not in the set.
    pub fn build(tasks: &[Task]) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut nodes: HashMap<TaskId, NodeIndex> = HashMap::new();

        for task in tasks {
            if nodes.contains_key(&task.id) {
                return Err(Error::DuplicateTask(task.id.as_str().to_string()));
            }
            let idx = graph.add_node(task.id.clone());
            nodes.insert(task.id.clone(), idx);
        }

        for task in tasks {
            let Some(&dependent) = nodes.get(&task.id) else {
                continue;
            };
            for dep in &task.depends_on {
                let Some(&dep_idx) = nodes.get(dep) else {
                    return Err(Error::UnknownDependency {
                        task: task.id.as_str().to_string(),
                        dependency: dep.as_str().to_string(),
                    });
                };
                // Edge direction: dependency -> dependent.
                graph.add_edge(dep_idx, dependent, ());
            }
        }

        Ok(Self { graph, nodes })
    }

    /// Enumerate cycles as sorted member lists. Empty when acyclic.
    #[must_use]
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let mut cycles: Vec<Vec<String>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .is_some_and(|&n| self.graph.find_edge(n, n).is_some())
            })
            .map(|component| {
                let mut members: Vec<String> = component
                    .into_iter()
                    .map(|n| self.graph[n].as_str().to_string())
                    .collect();
                members.sort();
                members
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Produce the staged execution plan via Kahn's algorithm.
    ///
    /// # Errors
    ///
    /// Returns `Error::CycleDetected` listing every cycle; no stages are
    /// produced for cyclic inputs.
    pub fn stages(&self) -> Result<StagePlan> {
        let cycles = self.cycles();
        if !cycles.is_empty() {
            return Err(Error::CycleDetected { cycles });
        }

        let mut in_degree: BTreeMap<TaskId, usize> = self
            .nodes
            .iter()
            .map(|(id, &idx)| {
                (
                    id.clone(),
                    self.graph
                        .neighbors_directed(idx, Direction::Incoming)
                        .count(),
                )
            })
            .collect();

        let mut stages = Vec::new();
        while !in_degree.is_empty() {
            // BTreeMap iteration keeps the stage sorted by task id.
            let ready: Vec<TaskId> = in_degree
                .iter()
                .filter(|(_, &deg)| deg == 0)
                .map(|(id, _)| id.clone())
                .collect();

            if ready.is_empty() {
                // Unreachable after the cycle check; kept as a guard against
                // graph mutation bugs.
                return Err(Error::CycleDetected {
                    cycles: vec![in_degree.keys().map(|id| id.as_str().to_string()).collect()],
                });
            }

            for id in &ready {
                in_degree.remove(id);
                if let Some(&idx) = self.nodes.get(id) {
                    for dependent in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                        let dep_id = &self.graph[dependent];
                        if let Some(deg) = in_degree.get_mut(dep_id) {
                            *deg = deg.saturating_sub(1);
                        }
                    }
                }
            }

            stages.push(Stage { tasks: ready });
        }

        Ok(StagePlan { stages })
    }

    /// Tasks whose dependencies are all in `completed` and which are not
    /// themselves completed, sorted by id.
    #[must_use]
    pub fn ready_tasks(&self, completed: &BTreeSet<TaskId>) -> Vec<TaskId> {
        let mut ready: Vec<TaskId> = self
            .nodes
            .iter()
            .filter(|(id, &idx)| {
                !completed.contains(*id)
                    && self
                        .graph
                        .neighbors_directed(idx, Direction::Incoming)
                        .all(|dep| completed.contains(&self.graph[dep]))
            })
            .map(|(id, _)| id.clone())
            .collect();
        ready.sort();
        ready
    }
}

/// Convenience: build and stage in one step.
///
/// # Errors
///
/// Propagates `DependencyResolver::build` and `stages` errors.
pub fn resolve_stages(tasks: &[Task]) -> Result<StagePlan> {
    DependencyResolver::build(tasks)?.stages()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;

    fn task(id: &str, deps: &[&str]) -> Task {
        Task::new(id, id, "prompt")
            .with_dependencies(deps.iter().map(|d| TaskId::new(*d)).collect::<Vec<_>>())
    }

    #[test]
    fn test_diamond_staging() {
        let tasks = vec![
            task("a", &[]),
            task("b", &["a"]),
            task("c", &["a"]),
            task("d", &["b", "c"]),
        ];
        let plan = resolve_stages(&tasks).unwrap_or_else(|e| panic!("staging failed: {e}"));
        let stages: Vec<Vec<&str>> = plan
            .stages()
            .iter()
            .map(|s| s.tasks().iter().map(TaskId::as_str).collect())
            .collect();
        assert_eq!(stages, vec![vec!["a"], vec!["b", "c"], vec!["d"]]);
        assert!(plan.stages()[1].is_parallel());
    }

    #[test]
    fn test_empty_task_set_yields_empty_plan() {
        let plan = resolve_stages(&[]).unwrap_or_else(|e| panic!("staging failed: {e}"));
        assert!(plan.is_empty());
        assert_eq!(plan.task_count(), 0);
    }

    #[test]
    fn test_single_task_single_stage() {
        let plan =
            resolve_stages(&[task("only", &[])]).unwrap_or_else(|e| panic!("staging failed: {e}"));
        assert_eq!(plan.stages().len(), 1);
        assert_eq!(plan.stages()[0].tasks()[0].as_str(), "only");
    }

    #[test]
    fn test_cycle_rejected_with_members() {
        let tasks = vec![task("x", &["y"]), task("y", &["x"])];
        let err = resolve_stages(&tasks);
        match err {
            Err(Error::CycleDetected { cycles }) => {
                assert_eq!(cycles.len(), 1);
                assert_eq!(cycles[0], vec!["x".to_string(), "y".to_string()]);
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn test_self_loop_rejected() {
        let tasks = vec![task("a", &["a"])];
        assert!(matches!(
            resolve_stages(&tasks),
            Err(Error::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_unknown_dependency_fails_fast() {
        let tasks = vec![task("a", &["ghost"])];
        assert_eq!(
            resolve_stages(&tasks),
            Err(Error::UnknownDependency {
                task: "a".into(),
                dependency: "ghost".into(),
            })
        );
    }

    #[test]
    fn test_duplicate_task_rejected() {
        let tasks = vec![task("a", &[]), task("a", &[])];
        assert_eq!(
            resolve_stages(&tasks),
            Err(Error::DuplicateTask("a".into()))
        );
    }

    #[test]
    fn test_ready_tasks() {
        let tasks = vec![task("a", &[]), task("b", &["a"]), task("c", &["b"])];
        let resolver =
            DependencyResolver::build(&tasks).unwrap_or_else(|e| panic!("build failed: {e}"));

        let none_done = BTreeSet::new();
        assert_eq!(resolver.ready_tasks(&none_done), vec![TaskId::new("a")]);

        let a_done: BTreeSet<TaskId> = [TaskId::new("a")].into_iter().collect();
        assert_eq!(resolver.ready_tasks(&a_done), vec![TaskId::new("b")]);
    }
}

//! Priority-aware topological ordering of a task graph.
//!
//! # Algorithm
//!
//! 1. Collect the tasks whose dependencies are all already ordered.
//! 2. Pick the one with the lowest priority number; ties keep input order.
//! 3. Append it to the order and repeat.
//! 4. If nothing is ready (a cycle, or a dependency id that names no task),
//!    append every remaining task in input order and report their ids.
//!
//! Step 4 means scheduling never fails: a malformed graph still runs, and the
//! caller decides how loudly to complain about [`ExecutionOrder::unresolved`].

use std::collections::HashSet;

use crate::task::Task;

/// Result of ordering a task graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOrder {
    /// Task ids in execution order. Contains every input task exactly once.
    pub order: Vec<String>,
    /// Ids appended by the best-effort fallback, in input order.
    pub unresolved: Vec<String>,
}

impl ExecutionOrder {
    pub fn is_fully_resolved(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Compute an execution order for `tasks`.
pub fn execution_order(tasks: &[Task]) -> ExecutionOrder {
    let mut ordered: HashSet<&str> = HashSet::with_capacity(tasks.len());
    let mut remaining: Vec<&Task> = tasks.iter().collect();
    let mut result = ExecutionOrder::default();

    while !remaining.is_empty() {
        let ready = remaining
            .iter()
            .enumerate()
            .filter(|(_, t)| t.dependencies.iter().all(|d| ordered.contains(d.as_str())))
            .min_by_key(|(pos, t)| (t.priority, *pos))
            .map(|(pos, _)| pos);

        match ready {
            Some(pos) => {
                let task = remaining.remove(pos);
                ordered.insert(task.id.as_str());
                result.order.push(task.id.clone());
            }
            None => {
                for task in remaining.drain(..) {
                    result.order.push(task.id.clone());
                    result.unresolved.push(task.id.clone());
                }
            }
        }
    }

    result
}

/// Return every `(dependency, dependent)` pair that `order` violates.
///
/// A dependency that does not appear in `order` at all is not a violation.
pub fn order_violations(tasks: &[Task], order: &[String]) -> Vec<(String, String)> {
    let position = |id: &str| order.iter().position(|o| o == id);
    let mut violations = Vec::new();
    for task in tasks {
        let Some(task_pos) = position(&task.id) else {
            continue;
        };
        for dep in &task.dependencies {
            if let Some(dep_pos) = position(dep) {
                if dep_pos > task_pos {
                    violations.push((dep.clone(), task.id.clone()));
                }
            }
        }
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{SynthesisParams, TaskParams};

    fn make_task(id: &str, priority: u8, deps: &[&str]) -> Task {
        Task::new(
            id,
            format!("task {}", id),
            priority,
            TaskParams::Synthesis(SynthesisParams::default()),
        )
        .unwrap()
        .with_dependencies(deps.iter().copied())
    }

    #[test]
    fn test_empty_graph() {
        let order = execution_order(&[]);
        assert!(order.order.is_empty());
        assert!(order.is_fully_resolved());
    }

    #[test]
    fn test_root_runs_first() {
        let tasks = vec![
            make_task("A", 3, &[]),
            make_task("B", 3, &["A"]),
            make_task("C", 3, &["A"]),
        ];
        let order = execution_order(&tasks);
        assert_eq!(order.order, vec!["A", "B", "C"]);
        assert!(order_violations(&tasks, &order.order).is_empty());
    }

    #[test]
    fn test_priority_breaks_ties_among_ready_tasks() {
        let tasks = vec![
            make_task("low", 5, &[]),
            make_task("high", 1, &[]),
            make_task("mid", 3, &[]),
        ];
        let order = execution_order(&tasks);
        assert_eq!(order.order, vec!["high", "mid", "low"]);
    }

    #[test]
    fn test_equal_priority_keeps_input_order() {
        let tasks = vec![
            make_task("x", 2, &[]),
            make_task("y", 2, &[]),
            make_task("z", 2, &[]),
        ];
        assert_eq!(execution_order(&tasks).order, vec!["x", "y", "z"]);
    }

    #[test]
    fn test_dependency_beats_priority() {
        let tasks = vec![
            make_task("fetch", 5, &[]),
            make_task("analyze", 1, &["fetch"]),
        ];
        assert_eq!(execution_order(&tasks).order, vec!["fetch", "analyze"]);
    }

    #[test]
    fn test_cycle_falls_back_to_input_order() {
        let tasks = vec![
            make_task("root", 3, &[]),
            make_task("a", 1, &["b"]),
            make_task("b", 1, &["a"]),
        ];
        let order = execution_order(&tasks);
        assert_eq!(order.order, vec!["root", "a", "b"]);
        assert_eq!(order.unresolved, vec!["a", "b"]);
    }

    #[test]
    fn test_missing_dependency_is_unresolved() {
        let tasks = vec![make_task("a", 1, &["ghost"]), make_task("b", 2, &[])];
        let order = execution_order(&tasks);
        assert_eq!(order.order, vec!["b", "a"]);
        assert_eq!(order.unresolved, vec!["a"]);
    }

    #[test]
    fn test_every_task_appears_once() {
        let tasks = vec![
            make_task("d", 4, &["c"]),
            make_task("c", 2, &["b"]),
            make_task("b", 1, &["a"]),
            make_task("a", 5, &[]),
            make_task("e", 1, &["a", "d"]),
        ];
        let order = execution_order(&tasks);
        assert_eq!(order.order, vec!["a", "b", "c", "d", "e"]);
        assert!(order_violations(&tasks, &order.order).is_empty());
    }

    #[test]
    fn test_violations_detected() {
        let tasks = vec![make_task("a", 1, &[]), make_task("b", 1, &["a"])];
        let bad = vec!["b".to_string(), "a".to_string()];
        assert_eq!(
            order_violations(&tasks, &bad),
            vec![("a".to_string(), "b".to_string())]
        );
    }
}

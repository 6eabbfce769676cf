//! Same-cycle dependency graph over "blocked by" edges.
//!
//! Built fresh from each batch. Resolution walks the graph with an explicit
//! stack so pathological chains cannot exhaust the call stack, and reports
//! cycles instead of failing on them.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::warn;

use taskslot_core::{Task, TaskId};

/// Transitive blockers of one task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Every task that must finish before the root may start. May include
    /// ids that are not part of the batch.
    pub ancestors: BTreeSet<TaskId>,
    /// Cycles met during the walk, each listed from its entry point.
    pub cycles: Vec<Vec<TaskId>>,
}

impl Resolution {
    pub fn is_unconstrained(&self) -> bool {
        self.ancestors.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: HashMap<TaskId, Vec<TaskId>>,
}

impl DependencyGraph {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let edges = tasks
            .iter()
            .map(|t| (t.id.clone(), t.blocked_by.clone()))
            .collect();
        Self { edges }
    }

    /// Whether `id` is a node of this cycle's batch.
    pub fn contains(&self, id: &TaskId) -> bool {
        self.edges.contains_key(id)
    }

    /// Direct blockers of `id`; empty for ids outside the batch.
    pub fn blockers(&self, id: &TaskId) -> &[TaskId] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Collect the transitive blockers of `root`.
    ///
    /// A blocker that is already on the current path closes a cycle. The
    /// cycle is logged and that edge is not followed. When the cycle passes
    /// through `root` itself, its members are dropped from the result so the
    /// mutually blocking pair does not deadlock.
    pub fn resolve(&self, root: &TaskId) -> Resolution {
        let mut ancestors = BTreeSet::new();
        let mut cycles = Vec::new();
        let mut cyclic_with_root: HashSet<TaskId> = HashSet::new();
        let mut visited: HashSet<&TaskId> = HashSet::from([root]);

        // (node, index of the next blocker to look at)
        let mut stack: Vec<(&TaskId, usize)> = vec![(root, 0)];

        while let Some(&(node, next)) = stack.last() {
            let Some(blocker) = self.blockers(node).get(next) else {
                stack.pop();
                continue;
            };
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }

            if let Some(pos) = stack.iter().position(|(n, _)| *n == blocker) {
                let cycle: Vec<TaskId> = stack[pos..].iter().map(|(n, _)| (*n).clone()).collect();
                warn!(
                    task_id = %root,
                    cycle = %format_cycle(&cycle),
                    "dependency cycle detected, cyclic edge ignored"
                );
                if pos == 0 {
                    cyclic_with_root.extend(cycle.iter().cloned());
                }
                cycles.push(cycle);
                continue;
            }

            if !visited.insert(blocker) {
                continue;
            }
            ancestors.insert(blocker.clone());
            stack.push((blocker, 0));
        }

        ancestors.retain(|id| !cyclic_with_root.contains(id));
        Resolution { ancestors, cycles }
    }
}

fn format_cycle(cycle: &[TaskId]) -> String {
    let mut parts: Vec<&str> = cycle.iter().map(TaskId::as_str).collect();
    if let Some(first) = cycle.first() {
        parts.push(first.as_str());
    }
    parts.join(" -> ")
}

//! Topological ordering and parallel level assignment.
//!
//! Both functions take the dependency map of the closed task set. Edges
//! pointing at ids outside the set are ignored for ordering purposes; the
//! full-graph constructor relies on this to park unresolved externals at
//! level zero.

use std::collections::{HashMap, HashSet, VecDeque};

use cockpit_types::{Error, Result, TaskId};

/// Kahn's algorithm with a FIFO frontier.
///
/// Zero-in-degree seeds are sorted so the order is deterministic. When the
/// produced order is shorter than the node count the graph has a cycle; a
/// DFS witness is attached to the error.
pub fn topological_order(deps: &HashMap<TaskId, Vec<TaskId>>) -> Result<Vec<TaskId>> {
    let mut in_degree: HashMap<&TaskId, usize> = HashMap::with_capacity(deps.len());
    let mut dependents: HashMap<&TaskId, Vec<&TaskId>> = HashMap::new();

    for (id, dependencies) in deps {
        in_degree.entry(id).or_insert(0);
        for dep in dependencies {
            if !deps.contains_key(dep) {
                continue;
            }
            *in_degree.entry(id).or_insert(0) += 1;
            dependents.entry(dep).or_default().push(id);
        }
    }

    let mut seeds: Vec<&TaskId> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    seeds.sort();

    let mut frontier: VecDeque<&TaskId> = seeds.into();
    let mut order = Vec::with_capacity(deps.len());

    while let Some(id) = frontier.pop_front() {
        order.push(id.clone());
        if let Some(children) = dependents.get(id) {
            for &child in children {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        frontier.push_back(child);
                    }
                }
            }
        }
    }

    if order.len() != deps.len() {
        return Err(Error::CyclicDependency { cycle: find_cycle(deps) });
    }
    Ok(order)
}

/// Iterative fixed-point level assignment.
///
/// Each round collects every remaining task whose dependencies are all
/// completed (or outside the node set). An empty round with tasks still
/// remaining means a cycle.
pub fn parallel_levels(deps: &HashMap<TaskId, Vec<TaskId>>) -> Result<Vec<Vec<TaskId>>> {
    let mut remaining: HashSet<&TaskId> = deps.keys().collect();
    let mut completed: HashSet<&TaskId> = HashSet::with_capacity(deps.len());
    let mut levels = Vec::new();

    while !remaining.is_empty() {
        let mut level: Vec<&TaskId> = remaining
            .iter()
            .copied()
            .filter(|id| {
                deps[*id]
                    .iter()
                    .all(|dep| completed.contains(dep) || !deps.contains_key(dep))
            })
            .collect();

        if level.is_empty() {
            return Err(Error::CyclicDependency { cycle: find_cycle(deps) });
        }
        level.sort();

        for id in &level {
            remaining.remove(*id);
            completed.insert(*id);
        }
        levels.push(level.into_iter().cloned().collect());
    }

    Ok(levels)
}

/// Find one closed walk witnessing a cycle.
///
/// DFS tracking the recursion stack and the current path. On a back-edge
/// into the stack, the witness is the path slice from the target onward,
/// closed by repeating the target.
fn find_cycle(deps: &HashMap<TaskId, Vec<TaskId>>) -> Vec<TaskId> {
    let mut visited = HashSet::new();
    let mut on_stack = HashSet::new();
    let mut path = Vec::new();

    let mut starts: Vec<&TaskId> = deps.keys().collect();
    starts.sort();

    for start in starts {
        if !visited.contains(start) {
            if let Some(cycle) = dfs(start, deps, &mut visited, &mut on_stack, &mut path) {
                return cycle;
            }
        }
    }
    Vec::new()
}

fn dfs<'a>(
    node: &'a TaskId,
    deps: &'a HashMap<TaskId, Vec<TaskId>>,
    visited: &mut HashSet<&'a TaskId>,
    on_stack: &mut HashSet<&'a TaskId>,
    path: &mut Vec<&'a TaskId>,
) -> Option<Vec<TaskId>> {
    visited.insert(node);
    on_stack.insert(node);
    path.push(node);

    for dep in deps.get(node).into_iter().flatten() {
        let Some((dep, _)) = deps.get_key_value(dep) else {
            continue;
        };
        if on_stack.contains(dep) {
            let from = path.iter().position(|id| *id == dep).unwrap_or(0);
            let mut cycle: Vec<TaskId> = path[from..].iter().map(|id| (*id).clone()).collect();
            cycle.push(dep.clone());
            return Some(cycle);
        }
        if !visited.contains(dep) {
            if let Some(cycle) = dfs(dep, deps, visited, on_stack, path) {
                return Some(cycle);
            }
        }
    }

    on_stack.remove(node);
    path.pop();
    None
}

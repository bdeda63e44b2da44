//! Dependency scheduler (C3): turns a batch of tool calls into an
//! `ExecutionPlan` of sequential waves, each safe to run concurrently.
//!
//! Resource-access extraction is delegated to each builtin tool's
//! `resource_access_for` heuristic; tools with none fall back to the
//! worst-case wildcard write so an unrecognised tool never silently
//! parallelises with something it might conflict with.

use super::builtin::{bash, edit, read};
use super::registry::ToolRegistry;
use anvil_foundation::{ResourceAccess, ResourceMode, ResourceType};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// A tool call awaiting execution.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self { id: id.into(), name: name.into(), arguments }
    }
}

/// Internal scheduling node. Rebuilt from scratch for every batch.
#[derive(Debug, Clone)]
struct GraphNode {
    resources: Vec<ResourceAccess>,
    deps: HashSet<usize>,
    level: usize,
    priority: i32,
}

/// The output of scheduling a batch: sequential waves of calls that can
/// each run concurrently.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub waves: Vec<Vec<ToolCall>>,
    pub parallelised: bool,
    pub explanation: String,
}

fn resources_for(registry: &ToolRegistry, call: &ToolCall) -> Vec<ResourceAccess> {
    let from_builtin = match call.name.as_str() {
        "view_file" => read::resource_access_for(&call.arguments),
        "str_replace_editor" => edit::resource_access_for(&call.arguments),
        "bash" => bash::resource_access_for(&call.arguments),
        _ => None,
    };
    if let Some(access) = from_builtin {
        return vec![access];
    }

    // Unknown tool, or a known one with arguments we couldn't parse:
    // take the metadata's declared resource types at worst-case (wildcard
    // write) so the scheduler never over-parallelises out of ignorance.
    let has_side_effects = registry
        .get(&call.name)
        .map(|t| t.metadata().has_side_effects)
        .unwrap_or(true);

    if has_side_effects {
        vec![ResourceAccess::new(ResourceType::File, "*", ResourceMode::Write)]
    } else {
        Vec::new()
    }
}

fn resources_conflict(a: &ResourceAccess, b: &ResourceAccess) -> bool {
    if a.resource_type != b.resource_type {
        return false;
    }
    if a.mode == ResourceMode::Read && b.mode == ResourceMode::Read {
        return false;
    }
    a.identifier == b.identifier
        || a.is_wildcard()
        || b.is_wildcard()
        || a.identifier.starts_with(&b.identifier)
        || b.identifier.starts_with(&a.identifier)
}

/// Builds an execution plan for a batch of tool calls. `calls` is assumed
/// to be in the order the model requested them; ties and explicit
/// dependencies are resolved against that order.
pub fn plan(registry: &ToolRegistry, calls: Vec<ToolCall>) -> ExecutionPlan {
    if calls.len() <= 1 {
        return ExecutionPlan {
            waves: vec![calls],
            parallelised: false,
            explanation: "single call, nothing to parallelise".to_string(),
        };
    }

    let n = calls.len();
    let priorities: Vec<i32> = calls
        .iter()
        .map(|c| registry.get(&c.name).map(|t| t.metadata().priority).unwrap_or(0))
        .collect();
    let resources: Vec<Vec<ResourceAccess>> = calls.iter().map(|c| resources_for(registry, c)).collect();
    let explicit_deps: Vec<Vec<String>> = calls
        .iter()
        .map(|c| registry.get(&c.name).map(|t| t.metadata().explicit_depends_on).unwrap_or_default())
        .collect();

    let mut nodes: Vec<GraphNode> = (0..n)
        .map(|i| GraphNode { resources: resources[i].clone(), deps: HashSet::new(), level: 0, priority: priorities[i] })
        .collect();

    for j in 0..n {
        for i in 0..j {
            let conflict = nodes[i]
                .resources
                .iter()
                .any(|ra| nodes[j].resources.iter().any(|rb| resources_conflict(ra, rb)));
            let explicit = explicit_deps[j].contains(&calls[i].name);
            if conflict || explicit {
                nodes[j].deps.insert(i);
            }
        }
    }

    // Longest-path layering with cycle detection.
    let mut resolved: HashMap<usize, usize> = HashMap::new();
    let mut visiting: HashSet<usize> = HashSet::new();
    let mut cycle = false;

    fn resolve_level(
        i: usize,
        nodes: &[GraphNode],
        resolved: &mut HashMap<usize, usize>,
        visiting: &mut HashSet<usize>,
        cycle: &mut bool,
    ) -> usize {
        if let Some(&lvl) = resolved.get(&i) {
            return lvl;
        }
        if *cycle || visiting.contains(&i) {
            *cycle = true;
            return 0;
        }
        visiting.insert(i);
        let level = nodes[i]
            .deps
            .iter()
            .map(|&d| 1 + resolve_level(d, nodes, resolved, visiting, cycle))
            .max()
            .unwrap_or(0);
        visiting.remove(&i);
        resolved.insert(i, level);
        level
    }

    for i in 0..n {
        let level = resolve_level(i, &nodes, &mut resolved, &mut visiting, &mut cycle);
        nodes[i].level = level;
        if cycle {
            break;
        }
    }

    let (waves, explanation) = if cycle {
        warn!("dependency cycle detected among {n} tool calls, falling back to a single sequential wave");
        (vec![calls], "dependency cycle detected; ran sequentially".to_string())
    } else {
        let max_level = nodes.iter().map(|n| n.level).max().unwrap_or(0);
        let mut waves: Vec<Vec<(usize, i32)>> = vec![Vec::new(); max_level + 1];
        for (i, node) in nodes.iter().enumerate() {
            waves[node.level].push((i, node.priority));
        }
        for wave in &mut waves {
            wave.sort_by(|a, b| b.1.cmp(&a.1));
        }

        let mut calls_by_index: Vec<Option<ToolCall>> = calls.into_iter().map(Some).collect();
        let ordered_waves: Vec<Vec<ToolCall>> = waves
            .into_iter()
            .map(|wave| {
                wave.into_iter()
                    .filter_map(|(i, _)| calls_by_index[i].take())
                    .collect()
            })
            .collect();

        let explanation = format!("{} wave(s) across {n} call(s)", ordered_waves.len());
        (ordered_waves, explanation)
    };

    let parallelised = waves.iter().any(|w| w.len() > 1);
    ExecutionPlan { waves, parallelised, explanation }
}

/// Pairwise check mirroring `plan`'s wave assignment: true iff `a` and `b`
/// would land in the same wave when scheduled together, i.e. neither their
/// resource accesses nor their tools' explicit dependency declarations
/// force an ordering between them.
pub fn can_run_in_parallel(registry: &ToolRegistry, a: &ToolCall, b: &ToolCall) -> bool {
    let resources_a = resources_for(registry, a);
    let resources_b = resources_for(registry, b);
    let conflict = resources_a
        .iter()
        .any(|ra| resources_b.iter().any(|rb| resources_conflict(ra, rb)));
    if conflict {
        return false;
    }

    let depends_a_on_b = registry
        .get(&a.name)
        .map(|t| t.metadata().explicit_depends_on.contains(&b.name))
        .unwrap_or(false);
    let depends_b_on_a = registry
        .get(&b.name)
        .map(|t| t.metadata().explicit_depends_on.contains(&a.name))
        .unwrap_or(false);

    !depends_a_on_b && !depends_b_on_a
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> ToolRegistry {
        ToolRegistry::with_builtins()
    }

    #[test]
    fn single_call_is_not_parallelised() {
        let plan = plan(&registry(), vec![ToolCall::new("1", "view_file", json!({"file_path": "/a"}))]);
        assert!(!plan.parallelised);
        assert_eq!(plan.waves.len(), 1);
    }

    #[test]
    fn independent_reads_run_in_one_wave() {
        let calls = vec![
            ToolCall::new("1", "view_file", json!({"file_path": "/a.txt"})),
            ToolCall::new("2", "view_file", json!({"file_path": "/b.txt"})),
            ToolCall::new("3", "view_file", json!({"file_path": "/c.txt"})),
        ];
        let plan = plan(&registry(), calls);
        assert!(plan.parallelised);
        assert_eq!(plan.waves.len(), 1);
        assert_eq!(plan.waves[0].len(), 3);
    }

    #[test]
    fn write_then_read_same_file_is_sequential() {
        let calls = vec![
            ToolCall::new("1", "str_replace_editor", json!({"file_path": "/a.txt", "old_string": "x", "new_string": "y"})),
            ToolCall::new("2", "view_file", json!({"file_path": "/a.txt"})),
        ];
        let plan = plan(&registry(), calls);
        assert_eq!(plan.waves.len(), 2);
        assert_eq!(plan.waves[0][0].id, "1");
        assert_eq!(plan.waves[1][0].id, "2");
    }

    #[test]
    fn bash_wildcard_write_serialises_with_everything() {
        let calls = vec![
            ToolCall::new("1", "bash", json!({"command": "some-custom-tool"})),
            ToolCall::new("2", "view_file", json!({"file_path": "/a.txt"})),
        ];
        let plan = plan(&registry(), calls);
        assert_eq!(plan.waves.len(), 2);
    }

    #[test]
    fn can_run_in_parallel_agrees_with_independent_reads() {
        let a = ToolCall::new("1", "view_file", json!({"file_path": "/a.txt"}));
        let b = ToolCall::new("2", "view_file", json!({"file_path": "/b.txt"}));
        assert!(can_run_in_parallel(&registry(), &a, &b));

        let plan = plan(&registry(), vec![a, b]);
        assert_eq!(plan.waves.len(), 1);
    }

    #[test]
    fn can_run_in_parallel_agrees_with_conflicting_write_then_read() {
        let a = ToolCall::new(
            "1",
            "str_replace_editor",
            json!({"file_path": "/a.txt", "old_string": "x", "new_string": "y"}),
        );
        let b = ToolCall::new("2", "view_file", json!({"file_path": "/a.txt"}));
        assert!(!can_run_in_parallel(&registry(), &a, &b));

        let plan = plan(&registry(), vec![a, b]);
        assert_eq!(plan.waves.len(), 2);
    }

    #[test]
    fn can_run_in_parallel_accepts_the_path_alias() {
        let a = ToolCall::new(
            "1",
            "str_replace_editor",
            json!({"path": "/x", "old_string": "a", "new_string": "b"}),
        );
        let b = ToolCall::new("2", "view_file", json!({"path": "/x"}));
        assert!(!can_run_in_parallel(&registry(), &a, &b));
    }

    #[test]
    fn plan_is_acyclic_and_covers_every_call() {
        let calls = vec![
            ToolCall::new("1", "view_file", json!({"file_path": "/a"})),
            ToolCall::new("2", "view_file", json!({"file_path": "/b"})),
            ToolCall::new("3", "str_replace_editor", json!({"file_path": "/a", "old_string": "x", "new_string": "y"})),
        ];
        let plan = plan(&registry(), calls);
        let total: usize = plan.waves.iter().map(|w| w.len()).sum();
        assert_eq!(total, 3);
    }
}

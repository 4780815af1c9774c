//! DAG traversal over a project's job dependency tree: post-order
//! flattening with explicit cycle detection.

use std::collections::BTreeSet;

use kiln_core::{EngineError, Result};

use crate::project::Job;

/// Flatten `deps` into post-order (children before parents). Duplicates are
/// not de-duplicated — a job reachable via two paths appears twice — but a
/// job re-entered while still on the current recursion stack is a cycle.
pub fn find_all_jobs(deps: &std::collections::BTreeMap<String, Job>) -> Result<Vec<String>> {
    let mut order = Vec::new();
    let mut on_stack = BTreeSet::new();
    for name in deps.keys() {
        visit(name, deps, &mut on_stack, &mut order)?;
    }
    Ok(order)
}

fn visit(
    name: &str,
    deps: &std::collections::BTreeMap<String, Job>,
    on_stack: &mut BTreeSet<String>,
    order: &mut Vec<String>,
) -> Result<()> {
    if on_stack.contains(name) {
        return Err(EngineError::Config(format!("cycle detected at job '{name}'")));
    }
    let Some(job) = deps.get(name) else {
        return Err(EngineError::NotFound(format!("job '{name}' not in deps")));
    };

    on_stack.insert(name.to_string());
    for child in job.deps.keys() {
        visit(child, &job.deps, on_stack, order)?;
    }
    on_stack.remove(name);

    order.push(name.to_string());
    Ok(())
}

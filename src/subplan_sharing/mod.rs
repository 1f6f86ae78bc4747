//! # Subplan Sharing
//!
//! Caches repeated subplans once and reads the cached artifact wherever the
//! subplan occurs again, without changing results and without caching across
//! a live recursion boundary.
//!
//! ## Algorithm Overview
//!
//! 1. **Structure**: one walk records, per distinct subtree (structural
//!    equality, not identity), every occurrence path and the producers whose
//!    placeholders are free inside it
//! 2. **Reuse marking**: top-down, a subtree is a candidate when its occurrence
//!    count exceeds the largest count seen on the path from the root
//! 3. **Loop invariance**: a subtree inside a recursive step that does not read
//!    that recursion's `delta`/`full` is a candidate too, unless its parent
//!    already is
//! 4. **Anchors**: a candidate is cached at the deepest common ancestor of its
//!    occurrences, then hoisted above every enclosing recursion it does not
//!    depend on. It never leaves the scope of a producer it reads from
//! 5. **Rewrite**: occurrences become `Reuse` placeholders and each anchor is
//!    wrapped in `Materialization` nodes, tallest candidate innermost
//! 6. **Reuse counts**: recomputed on the final tree. A reader inside a
//!    recursive step between the wrapper and itself makes the count
//!    `Unbounded`; otherwise it is the number of readers
//!
//! Table, file, builtin and placeholder leaves and empty relations are never
//! cached.
//!
//! ## Pipeline Position
//!
//! ```text
//! Lowered PlanNode -> [Subplan Sharing] -> PlanNode with Materialization -> Code Gen
//! ```

use crate::ir::scope::{common_prefix, Path, ScopeTable};
use crate::ir::{IdGenerator, NodeId, PlaceholderRole, PlanNode, ReuseCount};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Statistics about subplan sharing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharingStats {
    /// Nodes in the analyzed tree
    pub total_subtrees: usize,
    /// Distinct subtrees
    pub unique_subtrees: usize,
    /// Subtrees marked for reuse
    pub candidates: usize,
    /// Materializations in the rewritten tree
    pub materializations: usize,
    /// Materializations read on every iteration of a recursion
    pub unbounded: usize,
}

/// Everything the structural pass knows about one distinct subtree
#[derive(Debug)]
struct Info {
    occurrences: Vec<Path>,
    /// Producers whose placeholders occur unbound inside the subtree
    free: BTreeSet<NodeId>,
}

/// Candidate with its final anchor
#[derive(Debug)]
struct Anchored<'a> {
    plan: &'a PlanNode,
    occurrences: Vec<Path>,
    anchor: Path,
    id: NodeId,
}

/// Materialization analyzer
#[derive(Debug, Clone)]
pub struct SubplanSharer {
    enable_sharing: bool,
}

impl SubplanSharer {
    pub fn new() -> Self {
        SubplanSharer {
            enable_sharing: true,
        }
    }

    /// Enable or disable subplan sharing
    pub fn set_sharing(&mut self, enable: bool) {
        self.enable_sharing = enable;
    }

    /// Rewrite `plan` with materializations for its shared subplans
    pub fn materialize(&self, plan: PlanNode) -> PlanNode {
        self.analyze(plan).0
    }

    /// Rewrite `plan` and report what was shared
    pub fn analyze(&self, plan: PlanNode) -> (PlanNode, SharingStats) {
        let mut stats = SharingStats {
            total_subtrees: plan.node_count(),
            ..SharingStats::default()
        };
        if !self.enable_sharing {
            return (plan, stats);
        }

        let mut infos: HashMap<&PlanNode, Info> = HashMap::new();
        analyze_structure(&plan, &mut Vec::new(), &mut infos);
        for info in infos.values_mut() {
            info.occurrences.sort();
        }
        stats.unique_subtrees = infos.len();

        let mut selected = HashSet::new();
        mark_reuse(&plan, 1, &mut Vec::new(), false, &infos, &mut selected);
        stats.candidates = selected.len();

        let anchored = place_anchors(&plan, selected, &infos);
        let rewritten = if anchored.is_empty() {
            plan
        } else {
            Rewrite::new(anchored).apply(&plan)
        };
        let result = assign_reuse_counts(rewritten);

        count_materializations(&result, &mut stats);
        tracing::debug!(
            nodes = stats.total_subtrees,
            unique = stats.unique_subtrees,
            candidates = stats.candidates,
            materializations = stats.materializations,
            unbounded = stats.unbounded,
            "subplan sharing"
        );
        (result, stats)
    }

    /// Number of times each distinct subtree of `plan` occurs, most frequent
    /// first
    pub fn find_internal_duplicates<'p>(&self, plan: &'p PlanNode) -> Vec<(&'p PlanNode, usize)> {
        let mut infos: HashMap<&PlanNode, Info> = HashMap::new();
        analyze_structure(plan, &mut Vec::new(), &mut infos);
        let mut duplicates: Vec<(&PlanNode, usize)> = infos
            .into_iter()
            .filter(|(_, info)| info.occurrences.len() > 1)
            .map(|(node, info)| (node, info.occurrences.len()))
            .collect();
        duplicates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.height().cmp(&a.0.height())));
        duplicates
    }
}

impl Default for SubplanSharer {
    fn default() -> Self {
        Self::new()
    }
}

/// Materialize the shared subplans of `plan`
pub fn materialize(plan: PlanNode) -> PlanNode {
    SubplanSharer::new().materialize(plan)
}

/// Record occurrences; returns the free producers of `node`
fn analyze_structure<'a>(
    node: &'a PlanNode,
    path: &mut Path,
    infos: &mut HashMap<&'a PlanNode, Info>,
) -> BTreeSet<NodeId> {
    let free = match node {
        PlanNode::Placeholder { producer, .. } => BTreeSet::from([*producer]),
        _ => {
            let mut free = BTreeSet::new();
            for (i, child) in node.children().into_iter().enumerate() {
                path.push(i);
                let mut child_free = analyze_structure(child, path, infos);
                path.pop();
                if node.scope_child() == Some(i) {
                    if let Some(id) = node.producer_id() {
                        child_free.remove(&id);
                    }
                }
                free.extend(child_free);
            }
            free
        }
    };
    infos
        .entry(node)
        .or_insert_with(|| Info {
            occurrences: Vec::new(),
            free: free.clone(),
        })
        .occurrences
        .push(path.clone());
    free
}

fn is_eligible(node: &PlanNode) -> bool {
    !node.is_leaf() && !node.is_empty_relation()
}

/// Top-down candidate selection
fn mark_reuse<'a>(
    node: &'a PlanNode,
    running_max: usize,
    recursions: &mut Vec<NodeId>,
    parent_invariant: bool,
    infos: &HashMap<&'a PlanNode, Info>,
    selected: &mut HashSet<&'a PlanNode>,
) {
    if matches!(node, PlanNode::Placeholder { .. }) {
        return;
    }
    let Some(info) = infos.get(node) else {
        return;
    };
    let mut running_max = running_max;
    let count = info.occurrences.len();
    let invariant = recursions.last().is_some_and(|id| !info.free.contains(id));

    if count > running_max {
        running_max = count;
        if is_eligible(node) {
            selected.insert(node);
        }
    }
    if invariant && !parent_invariant && is_eligible(node) {
        selected.insert(node);
    }

    for (i, child) in node.children().into_iter().enumerate() {
        let entered = node.is_recursion() && node.scope_child() == Some(i);
        if let (true, Some(id)) = (entered, node.producer_id()) {
            recursions.push(id);
        }
        mark_reuse(child, running_max, recursions, invariant, infos, selected);
        if entered {
            recursions.pop();
        }
    }
}

/// Depth of the deepest producer the value at `anchor` must stay inside, or
/// `Err` with the first free producer no ancestor of `anchor` binds
fn scope_floor(
    root: &PlanNode,
    anchor: &[usize],
    free: &BTreeSet<NodeId>,
) -> Result<Option<usize>, NodeId> {
    let mut floor = None;
    for id in free {
        let bound = (0..anchor.len()).rev().find(|&depth| {
            root.at_path(&anchor[..depth]).is_some_and(|n| {
                n.producer_id() == Some(*id) && n.scope_child() == Some(anchor[depth])
            })
        });
        match bound {
            Some(depth) => floor = floor.max(Some(depth)),
            None => return Err(*id),
        }
    }
    Ok(floor)
}

/// Outermost recursion below `floor` whose recursive step contains `anchor`
fn hoist_target(root: &PlanNode, anchor: &[usize], floor: Option<usize>) -> Option<Path> {
    let start = floor.map_or(0, |f| f + 1);
    (start..anchor.len()).find_map(|depth| {
        let node = root.at_path(&anchor[..depth])?;
        (node.is_recursion() && node.scope_child() == Some(anchor[depth]))
            .then(|| anchor[..depth].to_vec())
    })
}

/// Anchor every candidate, containers before the subplans they contain
fn place_anchors<'a>(
    root: &'a PlanNode,
    selected: HashSet<&'a PlanNode>,
    infos: &HashMap<&'a PlanNode, Info>,
) -> Vec<Anchored<'a>> {
    let mut ordered: Vec<&'a PlanNode> = selected.into_iter().collect();
    ordered.sort_by(|a, b| {
        let (ia, ib) = (&infos[a], &infos[b]);
        let depth = |info: &Info| info.occurrences.iter().map(Vec::len).min().unwrap_or(0);
        b.height()
            .cmp(&a.height())
            .then_with(|| depth(ia).cmp(&depth(ib)))
            .then_with(|| ia.occurrences.cmp(&ib.occurrences))
    });

    let mut ids = IdGenerator::after(root);
    let mut anchored: Vec<Anchored<'a>> = Vec::new();
    for plan in ordered {
        let info = &infos[plan];

        // an occurrence inside a cached container is read where the
        // container's plan is computed
        let mut sites: Vec<Path> = Vec::new();
        for occurrence in &info.occurrences {
            let containers: Vec<Path> = anchored
                .iter()
                .filter(|a| a.occurrences.iter().any(|o| occurrence.starts_with(o)))
                .map(|a| a.anchor.clone())
                .collect();
            if containers.is_empty() {
                sites.push(occurrence.clone());
            } else {
                sites.extend(containers);
            }
        }
        let lca = common_prefix(&sites);

        let floor = match scope_floor(root, &lca, &info.free) {
            Ok(floor) => floor,
            Err(id) => {
                tracing::debug!(node = plan.kind(), producer = %id, "candidate reads an unbound producer");
                continue;
            }
        };
        let anchor = match hoist_target(root, &lca, floor) {
            Some(target) => target,
            None if info.occurrences.len() < 2 => continue,
            None => lca,
        };
        anchored.push(Anchored {
            plan,
            occurrences: info.occurrences.clone(),
            anchor,
            id: ids.fresh(),
        });
    }
    anchored
}

/// Tree rebuild replacing candidates and wrapping anchors
struct Rewrite<'a> {
    ids: HashMap<&'a PlanNode, NodeId>,
    /// Candidate indices per anchor, innermost first
    anchors: HashMap<Path, Vec<usize>>,
    reused: Vec<PlanNode>,
    candidates: Vec<Anchored<'a>>,
}

impl<'a> Rewrite<'a> {
    fn new(candidates: Vec<Anchored<'a>>) -> Self {
        let mut anchors: HashMap<Path, Vec<usize>> = HashMap::new();
        for (index, candidate) in candidates.iter().enumerate() {
            anchors.entry(candidate.anchor.clone()).or_default().push(index);
        }
        Rewrite {
            ids: candidates.iter().map(|c| (c.plan, c.id)).collect(),
            anchors,
            reused: Vec::new(),
            candidates,
        }
    }

    fn apply(mut self, root: &PlanNode) -> PlanNode {
        let reused: Vec<PlanNode> = self
            .candidates
            .iter()
            .map(|c| {
                let mut path = c.occurrences.first().cloned().unwrap_or_default();
                self.rebuild(c.plan.clone(), &mut path, false, false)
            })
            .collect();
        self.reused = reused;
        self.rebuild(root.clone(), &mut Vec::new(), true, true)
    }

    /// Rebuild the subtree at `path`; `replace` turns a candidate root into its
    /// placeholder, `wrap` applies the anchors
    fn rebuild(&self, node: PlanNode, path: &mut Path, replace: bool, wrap: bool) -> PlanNode {
        if replace {
            if let Some(&id) = self.ids.get(&node) {
                return PlanNode::placeholder(id, PlaceholderRole::Reuse, node.arity());
            }
        }
        let mut index = 0;
        let mut node = node.map_children(|child| {
            path.push(index);
            index += 1;
            let child = self.rebuild(child, path, true, wrap);
            path.pop();
            child
        });
        let at_anchor = self.anchors.get(path.as_slice()).filter(|_| wrap);
        if let Some(at_anchor) = at_anchor {
            for &i in at_anchor {
                node = PlanNode::Materialization {
                    id: self.candidates[i].id,
                    reused: Box::new(self.reused[i].clone()),
                    main: Box::new(node),
                    reuse: ReuseCount::Finite(0),
                };
            }
        }
        node
    }
}

/// Set each materialization's count from its readers; drop unread ones
pub fn assign_reuse_counts(plan: PlanNode) -> PlanNode {
    let table = ScopeTable::build(&plan);
    let mut readers: HashMap<Path, (usize, bool)> = HashMap::new();
    for (placeholder, producer) in table.bindings() {
        let is_reuse = matches!(
            plan.at_path(placeholder),
            Some(PlanNode::Placeholder {
                role: PlaceholderRole::Reuse,
                ..
            })
        );
        let is_materialization = matches!(
            plan.at_path(producer),
            Some(PlanNode::Materialization { .. })
        );
        if !(is_reuse && is_materialization) {
            continue;
        }
        let per_iteration = (producer.len() + 1..placeholder.len()).any(|depth| {
            plan.at_path(&placeholder[..depth]).is_some_and(|node| {
                node.is_recursion() && node.scope_child() == Some(placeholder[depth])
            })
        });
        let entry = readers.entry(producer.clone()).or_default();
        entry.0 += 1;
        entry.1 |= per_iteration;
    }
    rebuild_counts(plan, &mut Vec::new(), &readers)
}

fn rebuild_counts(node: PlanNode, path: &mut Path, readers: &HashMap<Path, (usize, bool)>) -> PlanNode {
    let mut index = 0;
    let node = node.map_children(|child| {
        path.push(index);
        index += 1;
        let child = rebuild_counts(child, path, readers);
        path.pop();
        child
    });
    match node {
        PlanNode::Materialization {
            id, reused, main, ..
        } => match readers.get(path.as_slice()) {
            None => *main,
            Some(&(count, unbounded)) => PlanNode::Materialization {
                id,
                reused,
                main,
                reuse: if unbounded {
                    ReuseCount::Unbounded
                } else {
                    ReuseCount::Finite(count)
                },
            },
        },
        other => other,
    }
}

fn count_materializations(plan: &PlanNode, stats: &mut SharingStats) {
    if let PlanNode::Materialization { reuse, .. } = plan {
        stats.materializations += 1;
        if *reuse == ReuseCount::Unbounded {
            stats.unbounded += 1;
        }
    }
    for child in plan.children() {
        count_materializations(child, stats);
    }
}

//! Hierarchical comparison, bottom-up over cell groups.
//!
//! Every used cell group is compared once, children before parents.
//! In hierarchical mode, groups that matched are recorded in a
//! [`HierarchyInfo`] so that parent comparisons see their instances
//! as single subcircuit parts.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use compact_str::CompactString;
use crate::{
    Aborter, CellId, CellView, HierarchyInfo, Library, NccEngine, NccError,
    NccOptions, NccResult, NccRoot, Verdict,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    Pending,
    Done,
}

/// Order items so that dependencies come first, with an explicit
/// stack. `deps(item)` lists the direct dependencies. Returns the
/// item closing a cycle as the error.
fn dep_order<T, I>(
    items: impl IntoIterator<Item = T>, deps: impl Fn(T) -> I
) -> Result<Vec<T>, T>
where T: Copy + Eq + std::hash::Hash, I: IntoIterator<Item = T> {
    let mut order = Vec::new();
    let mut state: HashMap<T, Visit> = HashMap::new();
    for start in items {
        if state.contains_key(&start) {
            continue
        }
        state.insert(start, Visit::Pending);
        let mut stack = vec![(start, deps(start).into_iter())];
        while let Some((item, it)) = stack.last_mut() {
            let item = *item;
            match it.next() {
                Some(d) => match state.get(&d) {
                    Some(Visit::Done) => {}
                    Some(Visit::Pending) => return Err(d),
                    None => {
                        state.insert(d, Visit::Pending);
                        stack.push((d, deps(d).into_iter()));
                    }
                },
                None => {
                    state.insert(item, Visit::Done);
                    order.push(item);
                    stack.pop();
                }
            }
        }
    }
    Ok(order)
}

/// The cells used under a root, each listed once, children before
/// parents.
#[derive(Debug, Clone)]
pub struct CellUsage {
    root: CellId,
    order: Vec<CellId>,
    used: HashSet<CellId>,
}

impl CellUsage {
    pub fn new(lib: &Library, root: CellId) -> Result<CellUsage, NccError> {
        lib.checked(root)?;
        let order = dep_order([root], |c| lib.cell(c).child_cells())
            .map_err(|c| NccError::invalid(format!(
                "cell {} instantiates itself", lib.cell(c).name)))?;
        let used = order.iter().copied().collect();
        Ok(CellUsage { root, order, used })
    }

    #[inline]
    pub fn root(&self) -> CellId {
        self.root
    }

    /// Children before parents; the root comes last.
    #[inline]
    pub fn cells_in_reverse_topological_order(&self) -> &[CellId] {
        &self.order
    }

    #[inline]
    pub fn is_used(&self, cell: CellId) -> bool {
        self.used.contains(&cell)
    }
}

/// The comparisons of one cell group.
#[derive(Debug)]
pub struct GroupComparison {
    pub group: CompactString,
    /// the cell every other one is compared against.
    pub reference: CellId,
    pub cells: Vec<CellId>,
    /// one result per non-reference cell compared.
    pub results: Vec<NccResult>,
}

impl GroupComparison {
    pub fn matched(&self) -> bool {
        self.results.iter().all(|r| r.matched())
    }

    pub fn aborted(&self) -> bool {
        self.results.iter().any(|r| r.aborted)
    }
}

/// The outcome of a bottom-up walk.
#[derive(Debug, Default)]
pub struct BottomUpResult {
    /// group comparisons in the order they ran; the group of the
    /// roots comes last.
    pub comparisons: Vec<GroupComparison>,
    /// groups not compared because of a `skipNCC` annotation, with
    /// the reason.
    pub skipped: Vec<(CompactString, String)>,
    /// the walk stopped at the first mismatch.
    pub halted: bool,
    pub aborted: bool,
}

impl BottomUpResult {
    pub fn matched(&self) -> bool {
        !self.aborted && self.comparisons.iter().all(|g| g.matched())
    }

    pub fn verdict(&self) -> Verdict {
        if self.aborted {
            Verdict::Incomplete
        }
        else if self.matched() {
            Verdict::Match
        }
        else {
            Verdict::Mismatch
        }
    }

    pub fn group(&self, name: &str) -> Option<&GroupComparison> {
        self.comparisons.iter().find(|g| g.group.as_str() == name)
    }

    /// The first group comparison that did not match.
    pub fn first_mismatch(&self) -> Option<&GroupComparison> {
        self.comparisons.iter().find(|g| !g.matched())
    }
}

/// The group a cell is compared in.
fn group_of(lib: &Library, cell: CellId) -> Result<CompactString, NccError> {
    let c = lib.cell(cell);
    match &c.annotations.join_group {
        None => Ok(c.group.clone()),
        Some(other) => match lib.find_cell(other) {
            Some(o) => Ok(lib.cell(o).group.clone()),
            None => Err(NccError::invalid(format!(
                "cell {} joins the group of unknown cell {}", c.name, other)))
        }
    }
}

/// The bottom-up hierarchical driver.
pub struct NccBottomUp;

impl NccBottomUp {
    /// Compare every used cell group of the designs under `roots`,
    /// children first. With `hierarchical`, matched groups become
    /// subcircuits of their parents.
    pub fn compare(
        lib: &Library, roots: &[NccRoot], options: &NccOptions,
        aborter: Arc<dyn Aborter>, hierarchical: bool
    ) -> Result<BottomUpResult, NccError> {
        if roots.len() < 2 {
            return Err(NccError::invalid(format!(
                "need at least two designs to compare, got {}", roots.len())))
        }
        let usages = roots.iter()
            .map(|r| CellUsage::new(lib, r.cell))
            .collect::<Result<Vec<_>, _>>()?;

        // every used cell once, children first within each root.
        let mut cells: Vec<CellId> = Vec::new();
        let mut seen = HashSet::new();
        for u in &usages {
            for &c in u.cells_in_reverse_topological_order() {
                if seen.insert(c) {
                    cells.push(c);
                }
            }
        }

        let root_group = group_of(lib, roots[0].cell)?;
        let mut group_of_cell: HashMap<CellId, usize> = HashMap::new();
        let mut groups: Vec<(CompactString, Vec<CellId>)> = Vec::new();
        let mut group_index: HashMap<CompactString, usize> = HashMap::new();
        for &c in &cells {
            let key = match roots.iter().any(|r| r.cell == c) {
                true => root_group.clone(),
                false => group_of(lib, c)?
            };
            let g = *group_index.entry(key.clone()).or_insert_with(|| {
                groups.push((key, Vec::new()));
                groups.len() - 1
            });
            groups[g].1.push(c);
            group_of_cell.insert(c, g);
        }

        let order = dep_order(0..groups.len(), |g| {
            let mut deps: Vec<usize> = groups[g].1.iter()
                .flat_map(|&c| lib.cell(c).child_cells())
                .map(|c| group_of_cell[&c])
                .filter(|&d| d != g)
                .collect();
            deps.sort_unstable();
            deps.dedup();
            deps
        }).map_err(|g| NccError::invalid(format!(
            "cell groups form a cycle through {}", groups[g].0)))?;

        // a subcircuit must be usable in every design, so one
        // notSubcircuit cell restricts its whole group.
        let mut hier = HierarchyInfo::new();
        for (_, members) in &groups {
            if members.iter().any(|&c| lib.cell(c).annotations.not_subcircuit) {
                for &c in members {
                    hier.restrict_subcircuit(c);
                }
            }
        }

        let mut result = BottomUpResult::default();
        for g in order {
            if aborter.user_wants_to_abort() {
                result.aborted = true;
                break
            }
            let (name, members) = &groups[g];
            if let Some(reason) = members.iter()
                .find_map(|&c| lib.cell(c).annotations.skip_ncc.as_ref()) {
                clilog::info!(NCC_SKIP, "skipping cell group {}: {}", name, reason);
                result.skipped.push((name.clone(), reason.to_string()));
                continue
            }
            if members.len() < 2 {
                clilog::debug!(NCC_SKIP, "cell group {} has only one used cell", name);
                continue
            }
            let reference = members.iter().copied()
                .find(|&c| lib.cell(c).view == CellView::Schematic)
                .unwrap_or(members[0]);
            let root_of = |c: CellId| roots.iter().find(|r| r.cell == c).cloned()
                .unwrap_or_else(|| NccRoot::new(c));

            hier.begin_next_compare_list(name);
            let mut comparison = GroupComparison {
                group: name.clone(),
                reference,
                cells: members.clone(),
                results: Vec::new(),
            };
            for &other in members.iter().filter(|&&c| c != reference) {
                let r = NccEngine::compare(
                    lib, &[root_of(reference), root_of(other)],
                    if hierarchical { Some(&mut hier) } else { None },
                    options, aborter.clone())?;
                let stop = r.aborted || (!r.matched() && options.halt_after_first_mismatch);
                comparison.results.push(r);
                if stop {
                    break
                }
            }
            if !comparison.matched() {
                hier.purge_current_compare_list();
            }
            let aborted = comparison.aborted();
            let matched = comparison.matched();
            result.comparisons.push(comparison);
            if aborted {
                result.aborted = true;
                break
            }
            if !matched && options.halt_after_first_mismatch {
                clilog::warn!(NCC_HALT, "halting after mismatch in cell group {}", name);
                result.halted = true;
                break
            }
        }
        clilog::info!(NCC_BOTTOM_UP, "bottom-up comparison: {} ({} groups compared, {} skipped)",
                      result.verdict(), result.comparisons.len(), result.skipped.len());
        Ok(result)
    }
}

#[test]
fn test_dep_order_cycle() {
    let deps = |i: usize| -> Vec<usize> {
        match i { 0 => vec![1, 2], 1 => vec![2], 2 => vec![], 3 => vec![4], _ => vec![3] }
    };
    assert_eq!(dep_order(0..3, deps), Ok(vec![2, 1, 0]));
    assert!(dep_order(0..5, deps).is_err());
}

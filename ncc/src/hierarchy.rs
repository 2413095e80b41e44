//! Information carried between the comparisons of a hierarchical run.

use std::collections::{HashMap, HashSet};
use compact_str::CompactString;
use crate::CellId;

/// What a parent needs to replace an instance of a matched cell by a
/// single subcircuit part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubcircuitInfo {
    /// name of the cell group.
    pub name: CompactString,
    /// equal for all cells that matched each other.
    pub id: usize,
    pub num_ports: usize,
    /// port index of each export of the cell, in export order.
    pub export_ports: Vec<usize>,
    /// global signals reaching the cell, with their port index.
    pub global_ports: Vec<(CompactString, usize)>,
    /// port index of every export or global name.
    pub(crate) name_to_port: HashMap<CompactString, usize>,
}

impl SubcircuitInfo {
    #[inline]
    pub fn port_of(&self, name: &str) -> Option<usize> {
        self.name_to_port.get(name).copied()
    }
}

/// Accumulates, over a bottom-up run, the cells already proven
/// equivalent.
#[derive(Debug, Clone, Default)]
pub struct HierarchyInfo {
    subcircuits: HashMap<CellId, SubcircuitInfo>,
    not_subcircuit: HashSet<CellId>,
    current_name: CompactString,
    current_id: usize,
    next_id: usize,
    current_list: Vec<CellId>,
}

impl HierarchyInfo {
    pub fn new() -> HierarchyInfo {
        HierarchyInfo::default()
    }

    /// Start collecting subcircuit information for a new cell group.
    pub fn begin_next_compare_list(&mut self, name: &str) {
        self.current_name = name.into();
        self.current_id = self.next_id;
        self.next_id += 1;
        self.current_list.clear();
    }

    #[inline]
    pub fn current_subcircuit_name(&self) -> &str {
        &self.current_name
    }

    #[inline]
    pub fn current_subcircuit_id(&self) -> usize {
        self.current_id
    }

    /// Never treat this cell as a subcircuit.
    pub fn restrict_subcircuit(&mut self, cell: CellId) {
        self.not_subcircuit.insert(cell);
    }

    pub fn add_subcircuit_info(&mut self, cell: CellId, info: SubcircuitInfo) {
        if self.not_subcircuit.contains(&cell) {
            return
        }
        self.subcircuits.insert(cell, info);
        self.current_list.push(cell);
    }

    /// Forget everything learned about the current group, so that
    /// parents expand its cells instead.
    pub fn purge_current_compare_list(&mut self) {
        for c in self.current_list.drain(..) {
            self.subcircuits.remove(&c);
        }
    }

    /// The subcircuit information of a cell, if instances of it
    /// should become subcircuit parts.
    #[inline]
    pub fn subcircuit(&self, cell: CellId) -> Option<&SubcircuitInfo> {
        match self.not_subcircuit.contains(&cell) {
            true => None,
            false => self.subcircuits.get(&cell)
        }
    }
}

#[test]
fn test_purge_current_list() {
    let info = |id| SubcircuitInfo {
        name: "x".into(), id, num_ports: 0,
        export_ports: vec![], global_ports: vec![],
        name_to_port: HashMap::new()
    };
    let mut h = HierarchyInfo::new();
    h.begin_next_compare_list("a");
    h.add_subcircuit_info(CellId(0), info(h.current_subcircuit_id()));
    h.begin_next_compare_list("b");
    h.add_subcircuit_info(CellId(1), info(h.current_subcircuit_id()));
    h.restrict_subcircuit(CellId(2));
    h.add_subcircuit_info(CellId(2), info(h.current_subcircuit_id()));
    assert!(h.subcircuit(CellId(2)).is_none());
    h.purge_current_compare_list();
    assert_eq!(h.subcircuit(CellId(0)).map(|i| i.id), Some(0));
    assert!(h.subcircuit(CellId(1)).is_none());
}

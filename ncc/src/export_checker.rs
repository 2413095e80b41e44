//! Checking exports across designs.
//!
//! Before partitioning, ports are matched by name. After hash-code
//! partitioning, ports that matched by name must sit on wires of the
//! same class. When everything matched, the port correspondence is
//! saved so that parents can use the cells as subcircuits.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use compact_str::CompactString;
use crate::{
    HierarchyInfo, Library, NccGlobals, NetObjKind, SubcircuitInfo,
};

/// An export problem between two designs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportMismatch {
    /// a port of `design` shares no name with any port of `other`.
    NoMatch {
        design: usize,
        other: usize,
        names: Vec<CompactString>,
    },
    /// a port of `design` shares names with several ports of `other`.
    OneToMany {
        design: usize,
        other: usize,
        names: Vec<CompactString>,
        matches: Vec<Vec<CompactString>>,
    },
    /// ports that match by name are on wires that are not
    /// equivalent.
    Topology {
        design: usize,
        reference_names: Vec<CompactString>,
        names: Vec<CompactString>,
        /// what the reference wire seems to match instead.
        suggestion: Option<String>,
    },
}

impl fmt::Display for ExportMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportMismatch::NoMatch { design, other, names } => write!(
                f, "in design {} the network with exports {} matches no export \
                    with the same name in design {}",
                design, names.join(", "), other),
            ExportMismatch::OneToMany { design, other, names, matches } => write!(
                f, "in design {} the exports {} match {} different ports of design {}",
                design, names.join(", "), matches.len(), other),
            ExportMismatch::Topology { design, reference_names, names, suggestion } => {
                write!(f, "exports {} of design 0 and {} of design {} match by name \
                           but are not on equivalent networks",
                       reference_names.join(", "), names.join(", "), design)?;
                if let Some(s) = suggestion {
                    write!(f, "; the design 0 network appears to match {}", s)?;
                }
                Ok(())
            }
        }
    }
}

/// Export checking state of one comparison.
#[derive(Debug, Clone, Default)]
pub struct ExportChecker {
    /// `equiv_ports[d][p]` is the port of design `d` matching port
    /// `p` of design 0 by name.
    equiv_ports: Vec<Vec<Option<usize>>>,
    /// (design, port, other design) of ports without a name match.
    no_matches: Vec<(usize, usize, usize)>,
}

impl ExportChecker {
    pub fn new() -> ExportChecker {
        ExportChecker::default()
    }

    /// For each port of `d1`, find the ports of `d2` sharing any of
    /// its names. Returns the mismatches and the unique matches.
    fn match_ports_by_name(
        &mut self, globals: &NccGlobals, d1: usize, d2: usize,
        mismatches: &mut Vec<ExportMismatch>
    ) -> Vec<Option<usize>> {
        let ports1 = &globals.netlist(d1).ports;
        let ports2 = &globals.netlist(d2).ports;
        let mut name2port: HashMap<&str, usize> = HashMap::new();
        for (i, p) in ports2.iter().enumerate() {
            for n in &p.names {
                name2port.insert(n, i);
            }
        }
        let mut map = vec![None; ports1.len()];
        for (i, p1) in ports1.iter().enumerate() {
            let found: BTreeSet<usize> = p1.names.iter()
                .filter_map(|n| name2port.get(n.as_str()).copied())
                .collect();
            match found.len() {
                0 => {
                    self.no_matches.push((d1, i, d2));
                    mismatches.push(ExportMismatch::NoMatch {
                        design: d1, other: d2, names: p1.names.clone()
                    });
                }
                1 => map[i] = found.into_iter().next(),
                _ => mismatches.push(ExportMismatch::OneToMany {
                    design: d1, other: d2, names: p1.names.clone(),
                    matches: found.into_iter().map(|p| ports2[p].names.clone()).collect()
                })
            }
        }
        map
    }

    /// Match ports by name between design 0 and every other design,
    /// in both directions.
    pub fn match_by_name(&mut self, globals: &NccGlobals) -> Vec<ExportMismatch> {
        let mut mismatches = Vec::new();
        self.equiv_ports = vec![Vec::new(); globals.num_designs()];
        self.no_matches.clear();
        for d in 1..globals.num_designs() {
            self.match_ports_by_name(globals, d, 0, &mut mismatches);
            self.equiv_ports[d] = self.match_ports_by_name(globals, 0, d, &mut mismatches);
        }
        for m in &mismatches {
            clilog::warn!(NCC_EXPORT_NAME, "{}", m);
        }
        mismatches
    }

    /// Describe the object of design `nth` equivalent to the wire of
    /// a port, if the wire's class pins it down uniquely.
    fn find_matching_port_or_wire(
        globals: &NccGlobals, design: usize, port: usize, nth: usize
    ) -> Option<String> {
        let wire = globals.netlist(design).ports[port].wire;
        let rec = &globals.arena()[globals.owner(NetObjKind::Wire, design, wire)];
        if !rec.is_leaf() || rec.sizes[design] != 1 || rec.sizes[nth] != 1 {
            return None
        }
        let nl = globals.netlist(nth);
        let w = &nl.wires[rec.circuits[nth].members()[0]];
        match w.ports.is_empty() {
            true => Some(format!("network: {}", w.name)),
            false => {
                let names: Vec<&str> = w.ports.iter()
                    .flat_map(|&p| nl.ports[p].names.iter().map(|s| s.as_str()))
                    .collect();
                Some(format!("network with exports: {}", names.join(", ")))
            }
        }
    }

    /// Check that ports matching by name are on equivalent wires.
    /// Ports marked for renaming are skipped.
    pub fn ensure_exports_on_equivalent_nets(&self, globals: &NccGlobals) -> Vec<ExportMismatch> {
        let mut mismatches = Vec::new();
        let ports0 = &globals.netlist(0).ports;
        for (d, map) in self.equiv_ports.iter().enumerate().skip(1) {
            let ports = &globals.netlist(d).ports;
            for (p0, pd) in map.iter().enumerate() {
                let Some(pd) = *pd else { continue };
                if ports0[p0].to_be_renamed || ports[pd].to_be_renamed {
                    continue
                }
                let r0 = globals.owner(NetObjKind::Wire, 0, ports0[p0].wire);
                let rd = globals.owner(NetObjKind::Wire, d, ports[pd].wire);
                if r0 != rd {
                    mismatches.push(ExportMismatch::Topology {
                        design: d,
                        reference_names: ports0[p0].names.clone(),
                        names: ports[pd].names.clone(),
                        suggestion: Self::find_matching_port_or_wire(globals, 0, p0, d),
                    });
                }
            }
        }
        for m in &mismatches {
            clilog::warn!(NCC_EXPORT_TOPO, "{}", m);
        }
        mismatches
    }

    /// Suggest names for ports marked for renaming and matches for
    /// ports that matched no name, based on the topology.
    pub fn suggest_port_matches(&self, globals: &NccGlobals) -> Vec<String> {
        let names = globals.root_cell_names();
        let mut suggestions = Vec::new();
        for d in 0..globals.num_designs() {
            let other = if d == 0 { 1 } else { 0 };
            for (i, p) in globals.netlist(d).ports.iter().enumerate() {
                if !p.to_be_renamed {
                    continue
                }
                if let Some(s) = Self::find_matching_port_or_wire(globals, d, i, other) {
                    suggestions.push(format!(
                        "in {} rename exports {} -> {}", names[d], p.names.join(", "), s));
                }
            }
        }
        for &(d, i, other) in &self.no_matches {
            let p = &globals.netlist(d).ports[i];
            if p.to_be_renamed {
                continue
            }
            if let Some(s) = Self::find_matching_port_or_wire(globals, d, i, other) {
                suggestions.push(format!(
                    "in {} the network with exports {} might match in {} the {}",
                    names[d], p.names.join(", "), names[other], s));
            }
        }
        for s in &suggestions {
            clilog::info!(NCC_SUGGEST, "{}", s);
        }
        suggestions
    }

    /// Record how each compared cell can be used as a subcircuit in
    /// parent comparisons. There is one port index per exported wire
    /// of design 0, shared by every name on that wire. The other
    /// designs map their names through the name matching.
    pub fn save_subcircuit_info(
        &self, globals: &NccGlobals, lib: &Library, hier: &mut HierarchyInfo
    ) {
        let cells: Vec<crate::CellId> = globals.roots().map(|r| r.cell).collect();
        let ports0 = &globals.netlist(0).ports;
        let ref_info = match hier.subcircuit(cells[0]) {
            Some(info) => info.clone(),
            None => {
                let mut name_to_port = HashMap::new();
                let mut port_of_wire = HashMap::new();
                for p in ports0 {
                    let next = port_of_wire.len();
                    let k = *port_of_wire.entry(p.wire).or_insert(next);
                    for n in &p.names {
                        name_to_port.insert(n.clone(), k);
                    }
                }
                let Some(info) = make_info(
                    globals, lib, hier, 0, port_of_wire.len(), name_to_port
                ) else {
                    return
                };
                hier.add_subcircuit_info(cells[0], info.clone());
                info
            }
        };
        for d in 1..globals.num_designs() {
            if cells[..d].contains(&cells[d]) {
                continue
            }
            let ports = &globals.netlist(d).ports;
            let mut name_to_port = HashMap::new();
            for (p0, pd) in self.equiv_ports[d].iter().enumerate() {
                let (Some(pd), Some(k)) = (*pd, ref_info.port_of(ports0[p0].name())) else {
                    continue
                };
                for n in &ports[pd].names {
                    name_to_port.insert(n.clone(), k);
                }
            }
            if let Some(info) = make_info(
                globals, lib, hier, d, ref_info.num_ports, name_to_port
            ) {
                hier.add_subcircuit_info(cells[d], info);
            }
        }
    }
}

/// Build the subcircuit information of the root cell of `design`.
fn make_info(
    globals: &NccGlobals, lib: &Library, hier: &HierarchyInfo,
    design: usize, num_ports: usize,
    name_to_port: HashMap<CompactString, usize>
) -> Option<SubcircuitInfo> {
    let nl = globals.netlist(design);
    let cell = lib.cell(nl.root.cell);
    let mut export_ports = Vec::with_capacity(cell.exports.len());
    for e in &cell.exports {
        match name_to_port.get(&e.name) {
            Some(&k) => export_ports.push(k),
            None => {
                clilog::warn!(NCC_SUBCKT, "export {} of {} has no port, \
                                           {} will not be used as a subcircuit",
                              e.name, cell.name, cell.name);
                return None
            }
        }
    }
    let mut global_ports = Vec::new();
    for p in &nl.ports {
        for n in &p.names {
            if cell.find_export(n).is_none() {
                if let Some(&k) = name_to_port.get(n) {
                    global_ports.push((n.clone(), k));
                }
            }
        }
    }
    Some(SubcircuitInfo {
        name: hier.current_subcircuit_name().into(),
        id: hier.current_subcircuit_id(),
        num_ports,
        export_ports,
        global_ports,
        name_to_port,
    })
}

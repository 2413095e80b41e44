//! Flattening a root cell into the parts, wires and ports compared
//! by the engine.

use std::collections::BTreeMap;
use compact_str::CompactString;
use crate::{
    Aborter, CellAnnotations, DeviceKind, DisjointSet, HierarchyInfo,
    InstanceKind, Library, NccError, NccOptions, NccRoot, NetObjKind,
    NetObject, Part, PartKind, Port, PortCharacteristic, VarContext,
    Wire, WirePin,
};

/// The flattened netlist of one design.
#[derive(Debug, Clone)]
pub struct NccNetlist {
    pub root: NccRoot,
    /// name of the root cell.
    pub cell_name: CompactString,
    pub parts: Vec<Part>,
    pub wires: Vec<Wire>,
    pub ports: Vec<Port>,
    /// problems in the design data that make the comparison fail.
    pub errors: Vec<String>,
    /// construction stopped because the user asked to abort.
    pub aborted: bool,
}

/// A cell being expanded.
struct Frame {
    cell: crate::CellId,
    context: VarContext,
    /// node index of the cell's local net 0.
    base: usize,
    depth: usize,
}

struct GlobalUse {
    node: usize,
    characteristic: PortCharacteristic,
}

/// Decide the device type and pins of a primitive device.
fn device_part(
    name: CompactString, device: &DeviceKind, nodes: Vec<usize>,
    ann: &CellAnnotations, check_body: bool
) -> Part {
    let (kind, pins) = match device {
        DeviceKind::Mos { polarity, model, width, length, four_terminal } => {
            let typ = model.clone()
                .or_else(|| ann.transistor_type.clone())
                .unwrap_or_else(|| polarity.default_type().into());
            let has_body = *four_terminal && check_body;
            let mut pins = nodes;
            pins.truncate(if has_body { 4 } else { 3 });
            (PartKind::Mos {
                typ, width: *width, length: *length,
                num_gates: 1, has_body
            }, pins)
        }
        DeviceKind::Bipolar { npn, area } => (PartKind::Bipolar {
            typ: if *npn { "npn" } else { "pnp" }.into(),
            area: *area
        }, nodes),
        DeviceKind::Resistor { model, width, length } => {
            let typ = model.clone()
                .or_else(|| ann.resistor_type.clone())
                .unwrap_or_else(|| "resistor".into());
            (PartKind::Resistor { typ, width: *width, length: *length }, nodes)
        }
        DeviceKind::Primitive { typ, .. } => (PartKind::Primitive {
            typ: typ.clone()
        }, nodes),
    };
    Part { name, kind, pins }
}

impl NccNetlist {
    /// Flatten a root cell.
    ///
    /// Instances of cells that `hier` knows as matched subcircuits
    /// become single [`PartKind::Subcircuit`] parts, unless the
    /// parent asks for them to be flattened. The aborter is polled
    /// before each cell expansion.
    pub fn build(
        lib: &Library, root: &NccRoot,
        hier: Option<&HierarchyInfo>,
        options: &NccOptions,
        aborter: &dyn Aborter
    ) -> Result<NccNetlist, NccError> {
        let top = lib.checked(root.cell)?;
        let mut netlist = NccNetlist {
            root: root.clone(),
            cell_name: top.name.clone(),
            parts: Vec::new(),
            wires: Vec::new(),
            ports: Vec::new(),
            errors: Vec::new(),
            aborted: false,
        };

        let mut nodes = DisjointSet::with_capacity(top.num_nets());
        // (hierarchy depth, qualified name) of each node.
        let mut node_names: Vec<(usize, CompactString)> = Vec::new();
        let mut part_nodes: Vec<Part> = Vec::new();
        let mut globals: BTreeMap<CompactString, Vec<GlobalUse>> = BTreeMap::new();
        // sets of nodes a parent must connect, with a description.
        let mut conn_checks: Vec<(String, Vec<usize>)> = Vec::new();

        let base = nodes.extend(top.num_nets());
        node_names.extend(top.net_names.iter().map(|n| (0, root.context.qualify(n))));
        let mut stack = vec![Frame {
            cell: root.cell, context: root.context.clone(), base, depth: 0
        }];

        while let Some(frame) = stack.pop() {
            if aborter.user_wants_to_abort() {
                clilog::info!(NCC_ABORT, "netlist construction of {} aborted",
                              top.name);
                netlist.aborted = true;
                return Ok(netlist)
            }
            let cell = lib.cell(frame.cell);
            for g in &cell.globals {
                globals.entry(g.name.clone()).or_default().push(GlobalUse {
                    node: frame.base + g.net,
                    characteristic: g.characteristic
                });
            }
            if frame.depth == 0 && cell.annotations.black_box {
                clilog::info!(NCC_BLACKBOX, "{} is a black box, comparing exports only",
                              cell.name);
                continue
            }
            for inst in &cell.instances {
                let conns: Vec<usize> = inst.conns.iter()
                    .map(|&n| frame.base + n).collect();
                let inst_name = frame.context.qualify(&inst.name);
                let child_id = match &inst.kind {
                    InstanceKind::Device(d) => {
                        part_nodes.push(device_part(
                            inst_name, d, conns, &cell.annotations,
                            options.check_body));
                        continue
                    }
                    InstanceKind::Cell(c) => *c
                };
                let child = lib.cell(child_id);

                for group in &child.annotations.exports_connected_by_parent {
                    let group_nodes: Vec<usize> = child.exports.iter().enumerate()
                        .filter(|(_, e)| group.iter().any(|p| p.matches(&e.name)))
                        .map(|(i, _)| conns[i])
                        .collect();
                    if group_nodes.len() > 1 {
                        conn_checks.push((format!(
                            "instance {} of {}", inst_name, child.name
                        ), group_nodes));
                    }
                }

                let subckt = match cell.annotations.flatten_instance(&inst.name) {
                    true => None,
                    false => hier.and_then(|h| h.subcircuit(child_id))
                };
                if let Some(info) = subckt {
                    let mut pins: Vec<Option<usize>> = vec![None; info.num_ports];
                    let mut attach = |port: usize, node: usize, nodes: &mut DisjointSet| {
                        match pins[port] {
                            None => pins[port] = Some(node),
                            // connected inside the subcircuit.
                            Some(n) => nodes.merge(n, node)
                        }
                    };
                    for (&port, &node) in info.export_ports.iter().zip(conns.iter()) {
                        attach(port, node, &mut nodes);
                    }
                    for (name, port) in &info.global_ports {
                        let node = nodes.extend(1);
                        node_names.push((frame.depth + 1,
                                         frame.context.push(&inst.name).qualify(name)));
                        globals.entry(name.clone()).or_default().push(GlobalUse {
                            node, characteristic: PortCharacteristic::Unknown
                        });
                        attach(*port, node, &mut nodes);
                    }
                    let pins = pins.into_iter().collect::<Option<Vec<usize>>>()
                        .ok_or_else(|| NccError::invariant(format!(
                            "subcircuit {} instantiated as {} has a disconnected pin",
                            info.name, inst_name)))?;
                    part_nodes.push(Part {
                        name: inst_name,
                        kind: PartKind::Subcircuit { name: info.name.clone(), id: info.id },
                        pins
                    });
                    continue
                }

                let context = frame.context.push(&inst.name);
                let cbase = nodes.extend(child.num_nets());
                node_names.extend(child.net_names.iter().map(
                    |n| (frame.depth + 1, context.qualify(n))));
                for (e, &node) in child.exports.iter().zip(conns.iter()) {
                    nodes.merge(cbase + e.net, node);
                }
                stack.push(Frame {
                    cell: child_id, context, base: cbase, depth: frame.depth + 1
                });
            }
        }

        for group in &top.annotations.exports_connected_by_parent {
            let group_nodes: Vec<usize> = top.exports.iter()
                .filter(|e| group.iter().any(|p| p.matches(&e.name)))
                .map(|e| base + e.net)
                .collect();
            for w in group_nodes.windows(2) {
                nodes.merge(w[0], w[1]);
            }
        }
        for uses in globals.values() {
            for w in uses.windows(2) {
                nodes.merge(w[0].node, w[1].node);
            }
        }

        let num_nodes = node_names.len();
        let (num_sets, set_of) = nodes.finalize(num_nodes);

        for (desc, group_nodes) in &conn_checks {
            let s = set_of[group_nodes[0]];
            if group_nodes.iter().any(|&n| set_of[n] != s) {
                netlist.errors.push(format!(
                    "exportsConnectedByParent assertion failed for {}", desc));
            }
        }

        // ports of the root: exports, then global signals.
        let mut port_drafts: Vec<(CompactString, usize, PortCharacteristic, bool)> =
            top.exports.iter()
            .map(|e| (e.name.clone(), set_of[base + e.net], e.characteristic, false))
            .collect();
        for (name, uses) in &globals {
            let set = set_of[uses[0].node];
            let characteristic = uses.iter().map(|u| u.characteristic)
                .find(|&c| c != PortCharacteristic::Unknown)
                .unwrap_or_default();
            match top.exports.iter().find(|e| &e.name == name) {
                None => port_drafts.push((name.clone(), set, characteristic, true)),
                Some(e) => {
                    let compatible = matches!(
                        (e.characteristic, characteristic),
                        (PortCharacteristic::Unknown, _) | (_, PortCharacteristic::Unknown)
                    ) || e.characteristic == characteristic;
                    if set_of[base + e.net] != set || !compatible {
                        netlist.errors.push(format!(
                            "export {} of {} conflicts with the global signal of the same name",
                            name, top.name));
                    }
                }
            }
        }

        // a wire for every node set used by a pin or a port, named
        // by its shallowest then alphabetically first node.
        let mut set_wire = vec![usize::MAX; num_sets];
        let mut wire_of = |set: usize, wires: &mut Vec<Wire>| -> usize {
            if set_wire[set] == usize::MAX {
                set_wire[set] = wires.len();
                wires.push(Wire {
                    name: CompactString::new(""), pins: Vec::new(), ports: Vec::new()
                });
            }
            set_wire[set]
        };
        let mut wires = Vec::new();
        for p in &mut part_nodes {
            for pin in &mut p.pins {
                *pin = wire_of(set_of[*pin], &mut wires);
            }
        }
        for d in &mut port_drafts {
            d.1 = wire_of(d.1, &mut wires);
        }
        let mut best_name: Vec<Option<&(usize, CompactString)>> = vec![None; wires.len()];
        for (node, name) in node_names.iter().enumerate() {
            let w = set_wire[set_of[node]];
            if w == usize::MAX {
                continue
            }
            match best_name[w] {
                Some(b) if b <= name => {}
                _ => best_name[w] = Some(name)
            }
        }
        for (w, name) in wires.iter_mut().zip(best_name) {
            if let Some((_, name)) = name {
                w.name = name.clone();
            }
        }

        let rename = |name: &str| top.annotations.rename_export(name);
        if options.one_name_per_port {
            netlist.ports = port_drafts.into_iter().map(|(name, wire, characteristic, implied)| Port {
                to_be_renamed: rename(&name),
                names: vec![name],
                wire, characteristic, implied
            }).collect();
        }
        else {
            let mut wire_port = vec![usize::MAX; wires.len()];
            for (name, wire, characteristic, implied) in port_drafts {
                if wire_port[wire] == usize::MAX {
                    wire_port[wire] = netlist.ports.len();
                    netlist.ports.push(Port {
                        names: Vec::new(), wire, characteristic,
                        implied: true, to_be_renamed: false
                    });
                }
                let port = &mut netlist.ports[wire_port[wire]];
                port.to_be_renamed |= rename(&name);
                port.implied &= implied;
                port.names.push(name);
            }
        }

        netlist.parts = part_nodes;
        netlist.wires = wires;
        netlist.connect();
        for e in &netlist.errors {
            clilog::error!(NCC_NETLIST, "{}: {}", top.name, e);
        }
        Ok(netlist)
    }

    /// Rebuild the pin and port lists of every wire from the parts
    /// and ports.
    pub(crate) fn connect(&mut self) {
        for w in &mut self.wires {
            w.pins.clear();
            w.ports.clear();
        }
        for (i, p) in self.parts.iter().enumerate() {
            for (k, &w) in p.pins.iter().enumerate() {
                self.wires[w].pins.push(WirePin { part: i, pin: k, coeff: p.pin_coeff(k) });
            }
        }
        for (i, p) in self.ports.iter().enumerate() {
            self.wires[p.wire].ports.push(i);
        }
    }

    #[inline]
    pub fn len(&self, kind: NetObjKind) -> usize {
        match kind {
            NetObjKind::Part => self.parts.len(),
            NetObjKind::Wire => self.wires.len(),
            NetObjKind::Port => self.ports.len(),
        }
    }

    #[inline]
    pub fn object(&self, kind: NetObjKind, i: usize) -> NetObject<'_> {
        match kind {
            NetObjKind::Part => NetObject::Part(&self.parts[i]),
            NetObjKind::Wire => NetObject::Wire(&self.wires[i]),
            NetObjKind::Port => NetObject::Port(&self.ports[i]),
        }
    }

    /// Find the port carrying a name.
    pub fn find_port(&self, name: &str) -> Option<usize> {
        self.ports.iter().position(|p| p.names.iter().any(|n| n.as_str() == name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::*;

    fn inverter(lib: &mut Library, name: &str) -> CellId {
        let mut b = CellBuilder::new(name, CellView::Schematic);
        b.export("a", PortCharacteristic::Input);
        b.export("y", PortCharacteristic::Output);
        b.global("vdd", "vdd", PortCharacteristic::Power);
        b.global("gnd", "gnd", PortCharacteristic::Ground);
        b.mos("mp", MosPolarity::P, ["vdd", "a", "y"], 2.0, 0.1);
        b.mos("mn", MosPolarity::N, ["gnd", "a", "y"], 1.0, 0.1);
        lib.add_cell(b.finish()).unwrap()
    }

    fn build(lib: &Library, cell: CellId, options: &NccOptions) -> NccNetlist {
        NccNetlist::build(lib, &NccRoot::new(cell), None, options, &NeverAbort).unwrap()
    }

    #[test]
    fn test_flatten_buffer() {
        let mut lib = Library::new();
        let inv = inverter(&mut lib, "inv");
        let mut b = CellBuilder::new("buf", CellView::Schematic);
        b.export("in", PortCharacteristic::Input);
        b.export("out", PortCharacteristic::Output);
        b.instance("x1", inv, &["in", "mid"]);
        b.instance("x2", inv, &["mid", "out"]);
        let buf = lib.add_cell(b.finish()).unwrap();

        let nl = build(&lib, buf, &NccOptions::default());
        assert!(nl.errors.is_empty());
        assert_eq!(nl.parts.len(), 4);
        // in, out, mid, vdd, gnd
        assert_eq!(nl.wires.len(), 5);
        let mut names: Vec<&str> = nl.wires.iter().map(|w| w.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["in", "mid", "out", "x1/gnd", "x1/vdd"]);
        let port_names: Vec<&str> = nl.ports.iter().map(|p| p.name()).collect();
        assert_eq!(port_names, vec!["in", "out", "gnd", "vdd"]);
        assert!(nl.ports[2].implied);
        let gnd = &nl.wires[nl.ports[2].wire];
        assert_eq!(gnd.pins.len(), 2);
    }

    #[test]
    fn test_export_global_conflict() {
        let mut lib = Library::new();
        let mut b = CellBuilder::new("top", CellView::Layout);
        b.export("vdd", PortCharacteristic::Power);
        b.global("vdd", "vdd2", PortCharacteristic::Power);
        b.resistor("r0", ["vdd", "vdd2"], 1.0, 1.0);
        let top = lib.add_cell(b.finish()).unwrap();
        let nl = build(&lib, top, &NccOptions::default());
        assert_eq!(nl.errors.len(), 1);
    }

    #[test]
    fn test_body_kept_only_when_checked() {
        let mut lib = Library::new();
        let mut b = CellBuilder::new("top", CellView::Layout);
        b.mos4("m0", MosPolarity::N, ["s", "g", "d", "b"], 1.0, 1.0);
        let top = lib.add_cell(b.finish()).unwrap();
        assert_eq!(build(&lib, top, &NccOptions::default()).parts[0].pins.len(), 3);
        let opt = NccOptions { check_body: true, ..Default::default() };
        assert_eq!(build(&lib, top, &opt).parts[0].pins.len(), 4);
    }

    #[test]
    fn test_connected_by_parent_assertion() {
        let mut lib = Library::new();
        let mut b = CellBuilder::new("tap", CellView::Layout);
        b.export("g1", PortCharacteristic::Ground);
        b.export("g2", PortCharacteristic::Ground);
        b.resistor("r", ["g1", "x"], 1.0, 1.0);
        b.resistor("r2", ["g2", "x"], 1.0, 1.0);
        b.annotations(CellAnnotations::parse("exportsConnectedByParent g1 g2").unwrap());
        let tap = lib.add_cell(b.finish()).unwrap();

        let mut b = CellBuilder::new("good", CellView::Layout);
        b.instance("t", tap, &["gnd", "gnd"]);
        let good = lib.add_cell(b.finish()).unwrap();
        let mut b = CellBuilder::new("bad", CellView::Layout);
        b.instance("t", tap, &["gnd", "other"]);
        let bad = lib.add_cell(b.finish()).unwrap();

        assert!(build(&lib, good, &NccOptions::default()).errors.is_empty());
        assert_eq!(build(&lib, bad, &NccOptions::default()).errors.len(), 1);
        // at the root, the exports get joined.
        let nl = build(&lib, tap, &NccOptions::default());
        assert_eq!(nl.ports[0].wire, nl.ports[1].wire);
    }

    #[test]
    fn test_abort_during_flatten() {
        let mut lib = Library::new();
        let inv = inverter(&mut lib, "inv");
        let nl = NccNetlist::build(
            &lib, &NccRoot::new(inv), None, &NccOptions::default(), &|| true
        ).unwrap();
        assert!(nl.aborted);
    }
}

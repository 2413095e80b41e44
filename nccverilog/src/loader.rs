//! Loading structural verilog into an ncc [`Library`].

use std::collections::{HashMap, HashSet};
use compact_str::CompactString;
use ncc::{
    Cell, CellAnnotations, CellId, CellView, DisjointSet, Export, GlobalSignal,
    Instance, InstanceKind, Library, NccError, PortCharacteristic,
};
use sverilogparse::*;
use crate::module_map::{bit_name, enum_in_width, ExprBit, Logic, ModuleMap};
use crate::DeviceProvider;

/// The cells created for the modules of one verilog source.
#[derive(Debug, Clone, Default)]
pub struct LoadedDesign {
    cells: HashMap<CompactString, CellId>,
    /// module names, children before parents.
    order: Vec<CompactString>,
}

impl LoadedDesign {
    /// The cell created for a module.
    #[inline]
    pub fn cell(&self, module: &str) -> Option<CellId> {
        self.cells.get(module).copied()
    }

    /// Module names in load order: children before parents.
    #[inline]
    pub fn modules(&self) -> &[CompactString] {
        &self.order
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Local nets of the module being loaded, before connections are
/// resolved.
#[derive(Default)]
struct NetBuilder {
    nodes: DisjointSet,
    names: Vec<CompactString>,
    bits: HashMap<(CompactString, Option<isize>), usize>,
    zero: Option<usize>,
    one: Option<usize>,
}

impl NetBuilder {
    fn fresh(&mut self, name: CompactString) -> usize {
        let id = self.nodes.extend(1);
        self.names.push(name);
        id
    }

    /// Get or create the node of a wire bit. Wires may be used
    /// without a declaration.
    fn bit(&mut self, name: &CompactString, idx: Option<isize>) -> usize {
        if let Some(&id) = self.bits.get(&(name.clone(), idx)) {
            return id
        }
        let id = self.fresh(bit_name(name, idx));
        self.bits.insert((name.clone(), idx), id);
        id
    }

    fn constant(&mut self, v: Logic) -> usize {
        match v {
            Logic::X => {
                clilog::warn!(NCCV_LIT, "X literal unsupported, treating as 0");
                self.constant(Logic::Zero)
            }
            Logic::Zero => match self.zero {
                Some(id) => id,
                None => {
                    let id = self.fresh("1'b0".into());
                    self.zero = Some(id);
                    id
                }
            },
            Logic::One => match self.one {
                Some(id) => id,
                None => {
                    let id = self.fresh("1'b1".into());
                    self.one = Some(id);
                    id
                }
            },
            // every z bit floats on its own.
            Logic::Z => self.fresh("1'bz".into()),
        }
    }

    fn expr_bit(&mut self, eb: ExprBit) -> usize {
        match eb {
            ExprBit::Const(v) => self.constant(v),
            ExprBit::Var(name, idx) => self.bit(name, idx),
        }
    }
}

fn characteristic(t: Option<&WireDefType>) -> PortCharacteristic {
    match t {
        Some(WireDefType::Input) => PortCharacteristic::Input,
        Some(WireDefType::Output) => PortCharacteristic::Output,
        Some(WireDefType::InOut) => PortCharacteristic::Bidirectional,
        _ => PortCharacteristic::Unknown
    }
}

struct LoadedModule {
    cell: CellId,
    /// (port, bit) of every export of the cell, in export order.
    exports: Vec<(CompactString, Option<isize>)>,
}

struct Loader<'l, 'p, P: DeviceProvider + ?Sized> {
    lib: &'l mut Library,
    view: CellView,
    provider: &'p P,
    loaded: HashMap<CompactString, LoadedModule>,
    order: Vec<CompactString>,
    num_devices: usize,
}

type Modules<'s> = HashMap<&'s CompactString, (&'s SVerilogModule, ModuleMap)>;

impl<'l, 'p, P: DeviceProvider + ?Sized> Loader<'l, 'p, P> {
    /// Load a module after the modules it instantiates.
    fn load<'s>(
        &mut self, modules: &Modules<'s>,
        parents: &mut HashSet<&'s CompactString>,
        name: &'s CompactString
    ) -> Result<(), NccError> {
        if self.loaded.contains_key(name) {
            return Ok(())
        }
        if !parents.insert(name) {
            return Err(NccError::invalid(format!(
                "module {} instantiates itself", name)))
        }
        let mut parents = scopeguard::guard(parents, |parents| {
            parents.remove(name);
        });
        let (m, _) = &modules[name];
        for cell in &m.cells {
            if let Some((child, _)) = modules.get_key_value(&cell.macro_name) {
                self.load(modules, &mut parents, *child)?;
            }
        }
        self.build(modules, name)
    }

    fn build(&mut self, modules: &Modules, name: &CompactString) -> Result<(), NccError> {
        let (m, mm) = &modules[name];
        let mut nets = NetBuilder::default();
        for def in &m.defs {
            for idx in enum_in_width(def.width) {
                nets.bit(&def.name, idx);
            }
        }

        // exports, one per port bit.
        let mut exports = Vec::new();
        let mut export_keys = Vec::new();
        for port in &m.ports {
            match port {
                SVerilogPortDef::Basic(p) => {
                    let ch = characteristic(mm.def_types.get(p));
                    for idx in mm.port_bits(p) {
                        exports.push(Export {
                            name: bit_name(p, idx), net: nets.bit(p, idx), characteristic: ch
                        });
                        export_keys.push((p.clone(), idx));
                    }
                }
                SVerilogPortDef::Conn(p, expr) => {
                    for (idx, eb) in mm.port_bits(p).zip(mm.eval_expr(expr)) {
                        let ch = match eb {
                            ExprBit::Var(v, _) => characteristic(mm.def_types.get(v)),
                            ExprBit::Const(_) => PortCharacteristic::Unknown
                        };
                        exports.push(Export {
                            name: bit_name(p, idx), net: nets.expr_bit(eb), characteristic: ch
                        });
                        export_keys.push((p.clone(), idx));
                    }
                }
            }
        }

        let mut instances = Vec::with_capacity(m.cells.len());
        for cell in &m.cells {
            let here = || format!("module {}, instance {}", name, cell.cell_name);
            if let Some((child_m, child_mm)) = modules.get(&cell.macro_name) {
                let mut conn: HashMap<(CompactString, Option<isize>), usize> = HashMap::new();
                for (pin, expr) in &cell.ioports {
                    let is_port = child_m.ports.iter().any(|p| match p {
                        SVerilogPortDef::Basic(n) | SVerilogPortDef::Conn(n, _) => n == pin
                    });
                    let width = child_mm.port_bits(pin).count();
                    if !is_port || width != mm.eval_expr_len(expr) {
                        return Err(NccError::invalid(format!(
                            "{}: pin {} does not match a port of {}",
                            here(), pin, cell.macro_name)))
                    }
                    for (idx, eb) in child_mm.port_bits(pin).zip(mm.eval_expr(expr)) {
                        conn.insert((pin.clone(), idx), nets.expr_bit(eb));
                    }
                }
                let child = &self.loaded[&cell.macro_name];
                let conns = child.exports.iter().map(|(p, idx)| match conn.get(&(p.clone(), *idx)) {
                    Some(&n) => n,
                    None => nets.fresh(compact_str::format_compact!(
                        "{}/{}", cell.cell_name, bit_name(p, *idx)))
                }).collect();
                instances.push(Instance {
                    name: cell.cell_name.clone(),
                    kind: InstanceKind::Cell(child.cell),
                    conns
                });
                continue
            }

            let mut pins = Vec::new();
            let mut pin_nodes = Vec::new();
            for (pin, expr) in &cell.ioports {
                let len = mm.eval_expr_len(expr);
                for (k, eb) in mm.eval_expr(expr).enumerate() {
                    pins.push(match len {
                        1 => pin.clone(),
                        _ => bit_name(pin, Some((len - 1 - k) as isize))
                    });
                    pin_nodes.push(nets.expr_bit(eb));
                }
            }
            let dev = self.provider.device_of(&cell.macro_name, &pins)
                .map_err(|e| NccError::invalid(format!("{}: {}", here(), e)))?;
            self.num_devices += 1;
            instances.push(Instance {
                name: cell.cell_name.clone(),
                kind: InstanceKind::Device(dev.kind),
                conns: dev.terminals.iter().map(|&t| pin_nodes[t]).collect()
            });
        }

        for assign in &m.assigns {
            let (ll, rl) = (mm.eval_expr_len(&assign.lhs), mm.eval_expr_len(&assign.rhs));
            if ll != rl {
                return Err(NccError::invalid(format!(
                    "module {}: incompatible assign width for `{}`: {} vs {}",
                    name, assign, ll, rl)))
            }
            for (l, r) in mm.eval_expr(&assign.lhs).zip(mm.eval_expr(&assign.rhs)) {
                if let (ExprBit::Const(_), ExprBit::Const(_)) = (l, r) {
                    return Err(NccError::invalid(format!(
                        "module {}: assign between two literals in `{}`", name, assign)))
                }
                let (l, r) = (nets.expr_bit(l), nets.expr_bit(r));
                nets.nodes.merge(l, r);
            }
        }

        // compact the nodes into nets.
        let NetBuilder { nodes, names, zero, one, .. } = nets;
        let (num_nets, set_of) = nodes.finalize(names.len());
        let mut net_names: Vec<Option<&CompactString>> = vec![None; num_nets];
        let rank = |n: &CompactString| (n.starts_with("1'b"), n.len(), n.clone());
        for (node, n) in names.iter().enumerate() {
            let best = &mut net_names[set_of[node]];
            if best.map_or(true, |b| rank(n) < rank(b)) {
                *best = Some(n);
            }
        }
        let mut globals = Vec::new();
        if let Some(z) = zero {
            globals.push(GlobalSignal {
                name: "gnd".into(), net: set_of[z], characteristic: PortCharacteristic::Ground
            });
        }
        if let Some(o) = one {
            globals.push(GlobalSignal {
                name: "vdd".into(), net: set_of[o], characteristic: PortCharacteristic::Power
            });
        }
        for e in &mut exports {
            e.net = set_of[e.net];
        }
        for inst in &mut instances {
            for c in &mut inst.conns {
                *c = set_of[*c];
            }
        }

        let mut cell_name = name.clone();
        let mut k = 0;
        while self.lib.find_cell(&cell_name).is_some() {
            k += 1;
            cell_name = compact_str::format_compact!("{}_{}", name, k);
        }
        let cell = self.lib.add_cell(Cell {
            name: cell_name,
            group: name.clone(),
            view: self.view,
            net_names: net_names.into_iter().map(|n| n.cloned().unwrap_or_default()).collect(),
            exports,
            globals,
            instances,
            annotations: CellAnnotations::default(),
        })?;
        self.loaded.insert(name.clone(), LoadedModule { cell, exports: export_keys });
        self.order.push(name.clone());
        Ok(())
    }
}

/// Add every module of a parsed verilog netlist to `lib` as a cell
/// of the given view, children first.
///
/// Each module becomes one cell in the cell group named after the
/// module, so modules of the same name in two designs are compared
/// with each other bottom-up. If the module name is already taken by
/// a cell of another design, the cell gets a numbered name.
///
/// Vector ports and wires are expanded into one net per bit, and
/// `assign`s join nets. Constant `0` and `1` bits are tied to the
/// global signals `gnd` and `vdd`. Macros that are not modules of
/// the netlist are mapped to devices by `provider`.
pub fn load_sverilog<P: DeviceProvider + ?Sized>(
    lib: &mut Library, source: &SVerilog, view: CellView, provider: &P
) -> Result<LoadedDesign, NccError> {
    let timer = clilog::stimer!("load verilog");
    let mut modules: Modules = HashMap::with_capacity(source.modules.len());
    for (name, m) in &source.modules {
        if modules.insert(name, (m, ModuleMap::new(name, m)?)).is_some() {
            return Err(NccError::invalid(format!("module {} is defined twice", name)))
        }
    }
    let mut loader = Loader {
        lib, view, provider,
        loaded: HashMap::new(),
        order: Vec::new(),
        num_devices: 0,
    };
    let mut parents = HashSet::new();
    for (name, _) in &source.modules {
        loader.load(&modules, &mut parents, name)?;
    }
    clilog::info!(NCCV_LOAD, "loaded {} modules with {} devices",
                  loader.order.len(), loader.num_devices);
    let design = LoadedDesign {
        cells: loader.loaded.into_iter().map(|(k, v)| (k, v.cell)).collect(),
        order: loader.order,
    };
    clilog::finish!(timer);
    Ok(design)
}

/// Parse an annotation file. Each line names a module followed by
/// one annotation, e.g. `inv joinGroup inverter`. Blank lines and
/// lines starting with `#` are ignored.
pub fn parse_module_annotations(
    text: &str
) -> Result<HashMap<CompactString, CellAnnotations>, NccError> {
    let mut map: HashMap<CompactString, CellAnnotations> = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue
        }
        let (module, rest) = line.split_once(char::is_whitespace)
            .ok_or_else(|| NccError::invalid(format!(
                "annotation line without annotation: {}", line)))?;
        map.entry(module.into()).or_default().parse_line(rest)?;
    }
    Ok(map)
}

/// Attach annotations to the cells of a loaded design. Modules the
/// design does not have are ignored.
pub fn apply_annotations(
    lib: &mut Library, design: &LoadedDesign,
    annotations: &HashMap<CompactString, CellAnnotations>
) -> Result<(), NccError> {
    for (module, ann) in annotations {
        if let Some(cell) = design.cell(module) {
            lib.set_annotations(cell, ann.clone())?;
        }
    }
    Ok(())
}

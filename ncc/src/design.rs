//! The design database the comparison reads from.
//!
//! A [`Library`] is an arena of [`Cell`]s. Cells are added
//! children-first, so a library can never contain a cyclic
//! hierarchy. The engine only reads from it.

use std::collections::HashMap;
use std::fmt;
use compact_str::CompactString;
use crate::{CellAnnotations, NccError};

/// Index of a cell inside its [`Library`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellId(pub usize);

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The view a cell represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellView {
    Schematic,
    Layout,
    Other,
}

/// Electrical characteristic of an export or global signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PortCharacteristic {
    Input,
    Output,
    Bidirectional,
    Power,
    Ground,
    #[default]
    Unknown,
}

/// A named connection point of a cell.
#[derive(Debug, Clone)]
pub struct Export {
    pub name: CompactString,
    /// local net index.
    pub net: usize,
    pub characteristic: PortCharacteristic,
}

/// A global signal (e.g. `vdd`) attached to a local net.
/// Global signals of the same name are connected everywhere in
/// the flattened hierarchy.
#[derive(Debug, Clone)]
pub struct GlobalSignal {
    pub name: CompactString,
    pub net: usize,
    pub characteristic: PortCharacteristic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MosPolarity {
    N,
    P,
}

impl MosPolarity {
    /// the device type name used when no model is given.
    #[inline]
    pub fn default_type(self) -> &'static str {
        match self {
            MosPolarity::N => "nmos",
            MosPolarity::P => "pmos",
        }
    }
}

/// A primitive device.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceKind {
    /// terminals: source, gate, drain, and body if `four_terminal`.
    Mos {
        polarity: MosPolarity,
        model: Option<CompactString>,
        width: f64,
        length: f64,
        four_terminal: bool,
    },
    /// terminals: emitter, base, collector.
    Bipolar {
        npn: bool,
        area: f64,
    },
    /// terminals: the two ends.
    Resistor {
        model: Option<CompactString>,
        width: f64,
        length: f64,
    },
    /// a generic leaf cell, terminals in `pin_names` order.
    Primitive {
        typ: CompactString,
        pin_names: Vec<CompactString>,
    },
}

impl DeviceKind {
    /// number of terminals the device expects to be connected.
    pub fn num_terminals(&self) -> usize {
        match self {
            DeviceKind::Mos { four_terminal: true, .. } => 4,
            DeviceKind::Mos { .. } => 3,
            DeviceKind::Bipolar { .. } => 3,
            DeviceKind::Resistor { .. } => 2,
            DeviceKind::Primitive { pin_names, .. } => pin_names.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum InstanceKind {
    Device(DeviceKind),
    Cell(CellId),
}

/// A device or cell instance inside a cell.
#[derive(Debug, Clone)]
pub struct Instance {
    pub name: CompactString,
    pub kind: InstanceKind,
    /// local net of each device terminal, or of each child export
    /// in the child's export order.
    pub conns: Vec<usize>,
}

/// A cell: one view of one circuit.
#[derive(Debug, Clone)]
pub struct Cell {
    pub name: CompactString,
    /// cells of the same group are different views of one circuit
    /// and are compared against each other.
    pub group: CompactString,
    pub view: CellView,
    pub net_names: Vec<CompactString>,
    pub exports: Vec<Export>,
    pub globals: Vec<GlobalSignal>,
    pub instances: Vec<Instance>,
    pub annotations: CellAnnotations,
}

impl Cell {
    #[inline]
    pub fn num_nets(&self) -> usize {
        self.net_names.len()
    }

    /// Find an export index by name.
    pub fn find_export(&self, name: &str) -> Option<usize> {
        self.exports.iter().position(|e| e.name.as_str() == name)
    }

    /// Iterate the cells this cell instantiates, with repetition.
    pub fn child_cells(&self) -> impl Iterator<Item = CellId> + '_ {
        self.instances.iter().filter_map(|inst| match inst.kind {
            InstanceKind::Cell(c) => Some(c),
            InstanceKind::Device(_) => None
        })
    }
}

/// An arena of cells.
#[derive(Debug, Clone, Default)]
pub struct Library {
    cells: Vec<Cell>,
    name2id: HashMap<CompactString, CellId>,
}

impl Library {
    pub fn new() -> Library {
        Library::default()
    }

    /// Add a cell after checking it against the cells already in
    /// the library. Children must be added before their parents.
    pub fn add_cell(&mut self, cell: Cell) -> Result<CellId, NccError> {
        if self.name2id.contains_key(&cell.name) {
            return Err(NccError::invalid(format!(
                "duplicate cell name {}", cell.name)))
        }
        let num_nets = cell.num_nets();
        let check_net = |net: usize, what: &dyn fmt::Display| {
            match net < num_nets {
                true => Ok(()),
                false => Err(NccError::invalid(format!(
                    "cell {}: {} refers to net {} out of {}",
                    cell.name, what, net, num_nets)))
            }
        };
        for e in &cell.exports {
            check_net(e.net, &format_args!("export {}", e.name))?;
        }
        for g in &cell.globals {
            check_net(g.net, &format_args!("global {}", g.name))?;
        }
        for inst in &cell.instances {
            let expected = match &inst.kind {
                InstanceKind::Device(d) => d.num_terminals(),
                InstanceKind::Cell(c) => match self.cells.get(c.0) {
                    Some(child) => child.exports.len(),
                    None => return Err(NccError::invalid(format!(
                        "cell {}: instance {} refers to unknown cell {}",
                        cell.name, inst.name, c)))
                }
            };
            if inst.conns.len() != expected {
                return Err(NccError::invalid(format!(
                    "cell {}: instance {} has {} connections, expected {}",
                    cell.name, inst.name, inst.conns.len(), expected)))
            }
            for &n in &inst.conns {
                check_net(n, &format_args!("instance {}", inst.name))?;
            }
        }
        let id = CellId(self.cells.len());
        self.name2id.insert(cell.name.clone(), id);
        self.cells.push(cell);
        Ok(id)
    }

    #[inline]
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Get a cell. Panics on an id from another library; use
    /// [`Library::get`] for unchecked ids.
    #[inline]
    pub fn cell(&self, id: CellId) -> &Cell {
        &self.cells[id.0]
    }

    #[inline]
    pub fn get(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(id.0)
    }

    /// Look up a cell id, turning unknown ids into an error.
    pub fn checked(&self, id: CellId) -> Result<&Cell, NccError> {
        self.get(id).ok_or_else(|| NccError::invalid(format!(
            "unknown cell id {}", id)))
    }

    #[inline]
    pub fn find_cell(&self, name: &str) -> Option<CellId> {
        self.name2id.get(name).copied()
    }

    /// Replace the annotations of a cell.
    pub fn set_annotations(&mut self, id: CellId, ann: CellAnnotations) -> Result<(), NccError> {
        match self.cells.get_mut(id.0) {
            Some(c) => {
                c.annotations = ann;
                Ok(())
            }
            None => Err(NccError::invalid(format!("unknown cell id {}", id)))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (CellId, &Cell)> + '_ {
        self.cells.iter().enumerate().map(|(i, c)| (CellId(i), c))
    }
}

/// The evaluation context of a root cell: the instance path above
/// it. Only used to qualify names in diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VarContext {
    pub path: Vec<CompactString>,
}

impl VarContext {
    #[inline]
    pub fn root() -> VarContext {
        VarContext::default()
    }

    /// A context one instance deeper.
    pub fn push(&self, inst: &str) -> VarContext {
        let mut path = self.path.clone();
        path.push(inst.into());
        VarContext { path }
    }

    /// Prefix a name with this context.
    pub fn qualify(&self, name: &str) -> CompactString {
        let mut s = CompactString::new("");
        for p in &self.path {
            s.push_str(p);
            s.push('/');
        }
        s.push_str(name);
        s
    }
}

impl fmt::Display for VarContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            return write!(f, "(top)")
        }
        write!(f, "{}", self.path.join("/"))
    }
}

/// One design of a comparison: a root cell in its context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NccRoot {
    pub cell: CellId,
    pub context: VarContext,
}

impl NccRoot {
    #[inline]
    pub fn new(cell: CellId) -> NccRoot {
        NccRoot { cell, context: VarContext::root() }
    }
}

impl From<CellId> for NccRoot {
    #[inline]
    fn from(cell: CellId) -> NccRoot {
        NccRoot::new(cell)
    }
}

/// Convenience builder of [`Cell`]s with nets referred to by name.
///
/// ```
/// use ncc::{CellBuilder, CellView, Library, MosPolarity, PortCharacteristic};
/// let mut lib = Library::new();
/// let mut b = CellBuilder::new("inv", CellView::Schematic);
/// b.export("a", PortCharacteristic::Input);
/// b.export("y", PortCharacteristic::Output);
/// b.global("vdd", "vdd", PortCharacteristic::Power);
/// b.global("gnd", "gnd", PortCharacteristic::Ground);
/// b.mos("mp", MosPolarity::P, ["vdd", "a", "y"], 2.0, 0.1);
/// b.mos("mn", MosPolarity::N, ["gnd", "a", "y"], 1.0, 0.1);
/// let inv = lib.add_cell(b.finish()).unwrap();
/// assert_eq!(lib.cell(inv).instances.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct CellBuilder {
    cell: Cell,
    net_ids: HashMap<CompactString, usize>,
}

impl CellBuilder {
    pub fn new(name: &str, view: CellView) -> CellBuilder {
        CellBuilder {
            cell: Cell {
                name: name.into(),
                group: name.into(),
                view,
                net_names: Vec::new(),
                exports: Vec::new(),
                globals: Vec::new(),
                instances: Vec::new(),
                annotations: CellAnnotations::default(),
            },
            net_ids: HashMap::new(),
        }
    }

    /// Set the cell group. Defaults to the cell name.
    pub fn group(&mut self, group: &str) -> &mut Self {
        self.cell.group = group.into();
        self
    }

    pub fn annotations(&mut self, ann: CellAnnotations) -> &mut Self {
        self.cell.annotations = ann;
        self
    }

    /// Get or create a net by name.
    pub fn net(&mut self, name: &str) -> usize {
        if let Some(&id) = self.net_ids.get(name) {
            return id
        }
        let id = self.cell.net_names.len();
        self.cell.net_names.push(name.into());
        self.net_ids.insert(name.into(), id);
        id
    }

    /// Export the net of the same name.
    pub fn export(&mut self, name: &str, characteristic: PortCharacteristic) -> &mut Self {
        self.export_net(name, name, characteristic)
    }

    /// Export a net under a (possibly different) name.
    pub fn export_net(
        &mut self, name: &str, net: &str, characteristic: PortCharacteristic
    ) -> &mut Self {
        let net = self.net(net);
        self.cell.exports.push(Export { name: name.into(), net, characteristic });
        self
    }

    pub fn global(
        &mut self, name: &str, net: &str, characteristic: PortCharacteristic
    ) -> &mut Self {
        let net = self.net(net);
        self.cell.globals.push(GlobalSignal { name: name.into(), net, characteristic });
        self
    }

    /// Add a device with its terminal nets.
    pub fn device(&mut self, name: &str, kind: DeviceKind, nets: &[&str]) -> &mut Self {
        let conns = nets.iter().map(|n| self.net(n)).collect();
        self.cell.instances.push(Instance {
            name: name.into(),
            kind: InstanceKind::Device(kind),
            conns
        });
        self
    }

    /// Add a 3-terminal transistor. `sgd` lists source, gate, drain.
    pub fn mos(
        &mut self, name: &str, polarity: MosPolarity,
        sgd: [&str; 3], width: f64, length: f64
    ) -> &mut Self {
        self.device(name, DeviceKind::Mos {
            polarity, model: None, width, length, four_terminal: false
        }, &sgd)
    }

    /// Add a 4-terminal transistor. `sgdb` lists source, gate,
    /// drain, body.
    pub fn mos4(
        &mut self, name: &str, polarity: MosPolarity,
        sgdb: [&str; 4], width: f64, length: f64
    ) -> &mut Self {
        self.device(name, DeviceKind::Mos {
            polarity, model: None, width, length, four_terminal: true
        }, &sgdb)
    }

    pub fn resistor(
        &mut self, name: &str, ends: [&str; 2], width: f64, length: f64
    ) -> &mut Self {
        self.device(name, DeviceKind::Resistor {
            model: None, width, length
        }, &ends)
    }

    /// Add a bipolar transistor. `ebc` lists emitter, base, collector.
    pub fn bipolar(&mut self, name: &str, npn: bool, ebc: [&str; 3], area: f64) -> &mut Self {
        self.device(name, DeviceKind::Bipolar { npn, area }, &ebc)
    }

    /// Add a generic leaf cell. `pins` lists (pin name, net name).
    pub fn primitive(&mut self, name: &str, typ: &str, pins: &[(&str, &str)]) -> &mut Self {
        let pin_names = pins.iter().map(|(p, _)| CompactString::from(*p)).collect();
        let nets: Vec<&str> = pins.iter().map(|(_, n)| *n).collect();
        self.device(name, DeviceKind::Primitive { typ: typ.into(), pin_names }, &nets)
    }

    /// Instantiate a child cell. `nets` lists one net per child
    /// export, in the child's export order.
    pub fn instance(&mut self, name: &str, child: CellId, nets: &[&str]) -> &mut Self {
        let conns = nets.iter().map(|n| self.net(n)).collect();
        self.cell.instances.push(Instance {
            name: name.into(),
            kind: InstanceKind::Cell(child),
            conns
        });
        self
    }

    pub fn finish(self) -> Cell {
        self.cell
    }
}

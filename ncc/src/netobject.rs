//! The objects being compared: parts, wires and ports.

use std::fmt;
use compact_str::CompactString;
use either::Either;
use crate::PortCharacteristic;

/// The three kinds of comparable objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NetObjKind {
    Part = 0,
    Wire = 1,
    Port = 2,
}

impl NetObjKind {
    pub const ALL: [NetObjKind; 3] = [NetObjKind::Part, NetObjKind::Wire, NetObjKind::Port];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for NetObjKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NetObjKind::Part => "part",
            NetObjKind::Wire => "wire",
            NetObjKind::Port => "port",
        })
    }
}

/// Device type and parameters of a part.
#[derive(Debug, Clone, PartialEq)]
pub enum PartKind {
    /// A transistor, or a series stack of transistors after merging.
    /// Pins are `[source, gate_0 .. gate_{n-1}, drain]` followed by
    /// the body if `has_body`.
    Mos {
        typ: CompactString,
        width: f64,
        length: f64,
        num_gates: usize,
        has_body: bool,
    },
    /// pins are emitter, base, collector.
    Bipolar {
        typ: CompactString,
        area: f64,
    },
    /// pins are the two ends.
    Resistor {
        typ: CompactString,
        width: f64,
        length: f64,
    },
    /// An instance of a cell that already matched, in place of its
    /// contents. Pins follow the subcircuit's port indices.
    Subcircuit {
        name: CompactString,
        id: usize,
    },
    /// A generic leaf cell. Pins are all distinct.
    Primitive {
        typ: CompactString,
    },
}

/// A device in a flattened netlist.
#[derive(Debug, Clone)]
pub struct Part {
    /// hierarchical instance name.
    pub name: CompactString,
    pub kind: PartKind,
    /// wire index of each pin.
    pub pins: Vec<usize>,
}

/// Spread a small integer into a well mixed odd 64-bit value.
#[inline]
pub(crate) fn mix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    (z ^ (z >> 31)) | 1
}

/// Fold one value into a running key. Order sensitive.
#[inline]
pub(crate) fn fold64(acc: u64, x: u64) -> u64 {
    mix64(acc.rotate_left(23) ^ x)
}

/// A code for a name that is the same in every build.
pub(crate) fn name_code(s: &str) -> u64 {
    mix64(s.bytes().fold(0xcbf2_9ce4_8422_2325, |h, b| {
        (h ^ b as u64).wrapping_mul(0x0100_0000_01b3)
    }))
}

impl Part {
    /// A code that is equal for parts of the same device type and
    /// pin structure. Stable across runs.
    pub fn type_code(&self) -> u64 {
        let head = match &self.kind {
            PartKind::Mos { typ, num_gates, has_body, .. } => {
                [0, name_code(typ), *num_gates as u64, *has_body as u64].into_iter().fold(0, fold64)
            }
            PartKind::Bipolar { typ, .. } => fold64(1, name_code(typ)),
            PartKind::Resistor { typ, .. } => fold64(2, name_code(typ)),
            PartKind::Subcircuit { name, id } => {
                [3, name_code(name), *id as u64].into_iter().fold(0, fold64)
            }
            PartKind::Primitive { typ } => fold64(4, name_code(typ)),
        };
        fold64(head, self.pins.len() as u64)
    }

    /// Pins with the same class are interchangeable.
    ///
    /// Transistor source and drain share a class, as do gates at
    /// mirrored positions of a stack. Both resistor ends share a
    /// class. All other pins are distinct.
    pub fn pin_class(&self, pin: usize) -> u32 {
        match &self.kind {
            PartKind::Mos { num_gates, .. } => {
                let n = *num_gates;
                if pin == 0 || pin == n + 1 {
                    0
                }
                else if pin <= n {
                    let g = pin - 1;
                    1 + g.min(n - 1 - g) as u32
                }
                else {
                    // body
                    0x10000
                }
            }
            PartKind::Resistor { .. } => 0,
            _ => pin as u32
        }
    }

    /// The weight of a pin in hash-code keys.
    #[inline]
    pub fn pin_coeff(&self, pin: usize) -> u64 {
        mix64(self.pin_class(pin) as u64)
    }

    /// Index of the transistor body pin, if kept.
    #[inline]
    pub fn mos_body_pin(&self) -> Option<usize> {
        match self.kind {
            PartKind::Mos { num_gates, has_body: true, .. } => Some(num_gates + 2),
            _ => None
        }
    }

    /// true if the pin is a transistor source or drain.
    #[inline]
    pub fn is_diffusion(&self, pin: usize) -> bool {
        matches!(self.kind, PartKind::Mos { num_gates, .. }
                 if pin == 0 || pin == num_gates + 1)
    }

    /// The sizes compared when sizes are checked: width and length
    /// for transistors and resistors, area for bipolars.
    pub fn sizes(&self) -> Option<(f64, f64)> {
        match self.kind {
            PartKind::Mos { width, length, .. } |
            PartKind::Resistor { width, length, .. } => Some((width, length)),
            PartKind::Bipolar { area, .. } => Some((area, 0.0)),
            _ => None
        }
    }

    /// Human readable device type.
    pub fn type_description(&self) -> String {
        match &self.kind {
            PartKind::Mos { typ, num_gates: 1, .. } => format!("{}", typ),
            PartKind::Mos { typ, num_gates, .. } => format!("{} stack of {}", typ, num_gates),
            PartKind::Bipolar { typ, .. } => format!("bipolar {}", typ),
            PartKind::Resistor { typ, .. } => format!("resistor {}", typ),
            PartKind::Subcircuit { name, .. } => format!("subcircuit {}", name),
            PartKind::Primitive { typ } => format!("{}", typ),
        }
    }
}

/// One part pin attached to a wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WirePin {
    pub part: usize,
    pub pin: usize,
    /// [`Part::pin_coeff`] of this pin.
    pub coeff: u64,
}

/// An electrical net of a flattened netlist.
#[derive(Debug, Clone)]
pub struct Wire {
    pub name: CompactString,
    pub pins: Vec<WirePin>,
    pub ports: Vec<usize>,
}

/// An export (or global signal) of the root cell.
#[derive(Debug, Clone)]
pub struct Port {
    /// one name, or every export name on the wire when
    /// ports are not split by name.
    pub names: Vec<CompactString>,
    pub wire: usize,
    pub characteristic: PortCharacteristic,
    /// comes from a global signal rather than an export.
    pub implied: bool,
    /// matches an `exportsToRename` annotation.
    pub to_be_renamed: bool,
}

impl Port {
    #[inline]
    pub fn name(&self) -> &str {
        self.names.first().map(|s| s.as_str()).unwrap_or("")
    }
}

/// A borrowed comparable object of any kind.
#[derive(Debug, Clone, Copy)]
pub enum NetObject<'a> {
    Part(&'a Part),
    Wire(&'a Wire),
    Port(&'a Port),
}

impl<'a> NetObject<'a> {
    #[inline]
    pub fn kind(&self) -> NetObjKind {
        match self {
            NetObject::Part(_) => NetObjKind::Part,
            NetObject::Wire(_) => NetObjKind::Wire,
            NetObject::Port(_) => NetObjKind::Port,
        }
    }

    #[inline]
    pub fn name(&self) -> &'a str {
        match self {
            NetObject::Part(p) => &p.name,
            NetObject::Wire(w) => &w.name,
            NetObject::Port(p) => p.name(),
        }
    }

    /// Enumerate the directly connected objects.
    pub fn neighbors(&self) -> impl Iterator<Item = (NetObjKind, usize)> + 'a {
        match *self {
            NetObject::Part(p) => Either::Left(
                p.pins.iter().map(|&w| (NetObjKind::Wire, w))),
            NetObject::Wire(w) => Either::Right(Either::Left(
                w.pins.iter().map(|p| (NetObjKind::Part, p.part))
                    .chain(w.ports.iter().map(|&p| (NetObjKind::Port, p))))),
            NetObject::Port(p) => Either::Right(Either::Right(
                std::iter::once((NetObjKind::Wire, p.wire))))
        }
    }

    #[inline]
    pub fn degree(&self) -> usize {
        match self {
            NetObject::Part(p) => p.pins.len(),
            NetObject::Wire(w) => w.pins.len(),
            NetObject::Port(_) => 1,
        }
    }

    /// The hash-code key of this object given the class codes of
    /// its neighbors. Parts read wire codes, wires read part codes,
    /// ports read the code of their wire.
    pub fn hash_contribution(&self, code: impl Fn(usize) -> u64) -> u64 {
        match self {
            NetObject::Part(p) => {
                let mut key = 0u64;
                for (i, &w) in p.pins.iter().enumerate() {
                    key = key.wrapping_add(p.pin_coeff(i).wrapping_mul(code(w)));
                }
                // ties the ends of a stack to their adjacent gates,
                // so that mirrored stacks still agree.
                if let PartKind::Mos { num_gates, .. } = p.kind {
                    if num_gates >= 2 {
                        let s = code(p.pins[0]);
                        let d = code(p.pins[num_gates + 1]);
                        let g0 = code(p.pins[1]);
                        let gn = code(p.pins[num_gates]);
                        let pair = s.wrapping_mul(g0).wrapping_add(d.wrapping_mul(gn));
                        key = key.wrapping_add(pair.wrapping_mul(mix64(0x5354)));
                    }
                }
                key
            }
            NetObject::Wire(w) => w.pins.iter().fold(0u64, |key, p| {
                key.wrapping_add(p.coeff.wrapping_mul(code(p.part)))
            }),
            NetObject::Port(p) => code(p.wire),
        }
    }
}

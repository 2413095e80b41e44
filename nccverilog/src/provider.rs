//! Mapping leaf verilog cells to devices.

use compact_str::CompactString;
use ncc::{DeviceKind, MosPolarity};

/// A leaf cell resolved to a device.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafDevice {
    pub kind: DeviceKind,
    /// for each device terminal, the index of the instance pin
    /// connected to it.
    pub terminals: Vec<usize>,
}

/// Leaf device provider trait.
///
/// The loader calls it for every instance of a macro that is not a
/// module of the netlist. `pins` are the instance's pin bit names,
/// such as `a` or `d[3]`.
pub trait DeviceProvider {
    /// Resolve a leaf instance, or explain why it cannot be.
    fn device_of(
        &self, macro_name: &str, pins: &[CompactString]
    ) -> Result<LeafDevice, String>;
}

impl<T> DeviceProvider for T
where T: Fn(&str, &[CompactString]) -> Result<LeafDevice, String> {
    #[inline]
    fn device_of(
        &self, macro_name: &str, pins: &[CompactString]
    ) -> Result<LeafDevice, String> {
        self(macro_name, pins)
    }
}

/// Find the pins with the given names, in that order.
fn terminals(macro_name: &str, pins: &[CompactString], names: &[&str]) -> Result<Vec<usize>, String> {
    if pins.len() != names.len() {
        return Err(format!("{} needs pins {}, got {}",
                           macro_name, names.join(", "), pins.join(", ")))
    }
    names.iter().map(|n| {
        pins.iter().position(|p| p.as_str() == *n)
            .ok_or_else(|| format!("{} instance lacks pin {}", macro_name, n))
    }).collect()
}

/// The built-in device mapping.
///
/// | macro | device | pins |
/// |---|---|---|
/// | `nmos`, `pmos` | 3-terminal transistor | `s g d` |
/// | `nmos4`, `pmos4` | 4-terminal transistor | `s g d b` |
/// | `npn`, `pnp` | bipolar transistor | `e b c` |
/// | `res` | resistor | `a b` |
///
/// Any other macro becomes a primitive whose terminals are its pins
/// sorted by name, so that instances listing their pins in different
/// orders still agree. Sizes are not expressible in structural
/// verilog and default to 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDevices;

impl DeviceProvider for DefaultDevices {
    fn device_of(
        &self, macro_name: &str, pins: &[CompactString]
    ) -> Result<LeafDevice, String> {
        let mos = |polarity: MosPolarity, four_terminal: bool| -> Result<LeafDevice, String> {
            let names: &[&str] = match four_terminal {
                true => &["s", "g", "d", "b"],
                false => &["s", "g", "d"]
            };
            Ok(LeafDevice {
                kind: DeviceKind::Mos {
                    polarity, model: None, width: 1.0, length: 1.0, four_terminal
                },
                terminals: terminals(macro_name, pins, names)?
            })
        };
        match macro_name {
            "nmos" => mos(MosPolarity::N, false),
            "pmos" => mos(MosPolarity::P, false),
            "nmos4" => mos(MosPolarity::N, true),
            "pmos4" => mos(MosPolarity::P, true),
            "npn" | "pnp" => Ok(LeafDevice {
                kind: DeviceKind::Bipolar { npn: macro_name == "npn", area: 1.0 },
                terminals: terminals(macro_name, pins, &["e", "b", "c"])?
            }),
            "res" => Ok(LeafDevice {
                kind: DeviceKind::Resistor { model: None, width: 1.0, length: 1.0 },
                terminals: terminals(macro_name, pins, &["a", "b"])?
            }),
            _ => {
                let mut order: Vec<usize> = (0..pins.len()).collect();
                order.sort_by(|&a, &b| pins[a].cmp(&pins[b]));
                Ok(LeafDevice {
                    kind: DeviceKind::Primitive {
                        typ: macro_name.into(),
                        pin_names: order.iter().map(|&i| pins[i].clone()).collect()
                    },
                    terminals: order
                })
            }
        }
    }
}

#[test]
fn test_default_devices() {
    let pins: Vec<CompactString> = ["d", "g", "s"].into_iter().map(Into::into).collect();
    let dev = DefaultDevices.device_of("nmos", &pins).unwrap();
    assert_eq!(dev.terminals, vec![2, 1, 0]);
    assert!(DefaultDevices.device_of("nmos4", &pins).is_err());

    let pins: Vec<CompactString> = ["y", "a"].into_iter().map(Into::into).collect();
    let dev = DefaultDevices.device_of("buf", &pins).unwrap();
    assert_eq!(dev.terminals, vec![1, 0]);
    match dev.kind {
        DeviceKind::Primitive { typ, pin_names } => {
            assert_eq!(typ, "buf");
            assert_eq!(pin_names, vec!["a", "y"]);
        }
        _ => panic!("expected a primitive"),
    }
}

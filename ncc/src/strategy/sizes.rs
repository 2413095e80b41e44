//! Size checking of matched parts.

use std::fmt;
use compact_str::CompactString;
use crate::{NccGlobals, NetObjKind, RecordId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeParam {
    /// transistor or resistor width, bipolar area.
    Width,
    Length,
}

/// Two matched parts whose sizes disagree.
#[derive(Debug, Clone, PartialEq)]
pub struct SizeMismatch {
    pub record: RecordId,
    pub param: SizeParam,
    /// the part of design 0 and its value.
    pub reference: (CompactString, f64),
    /// the other design, its part and value.
    pub design: usize,
    pub other: (CompactString, f64),
}

impl fmt::Display for SizeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} of {} is {} but of {} in design {} is {}",
               self.param, self.reference.0, self.reference.1,
               self.other.0, self.design, self.other.1)
    }
}

/// Compare the sizes of the parts in every matched class.
///
/// Members of a class are compared in sorted size order, so the
/// pairing chosen inside a class does not matter.
pub fn check_sizes(globals: &NccGlobals) -> Vec<SizeMismatch> {
    let options = globals.options();
    let arena = globals.arena();
    let mut mismatches = Vec::new();
    for r in globals.leaves(NetObjKind::Part) {
        let rec = &arena[r];
        if !rec.is_matched() {
            continue
        }
        for (param, pick) in [
            (SizeParam::Width, (|s: (f64, f64)| s.0) as fn((f64, f64)) -> f64),
            (SizeParam::Length, |s: (f64, f64)| s.1),
        ] {
            let sorted: Vec<Vec<(f64, &CompactString)>> = rec.circuits.iter().enumerate()
                .map(|(d, c)| {
                    let nl = globals.netlist(d);
                    let mut v: Vec<(f64, &CompactString)> = c.members().iter()
                        .filter_map(|&m| nl.parts[m].sizes().map(|s| (pick(s), &nl.parts[m].name)))
                        .collect();
                    v.sort_by(|a, b| a.0.total_cmp(&b.0));
                    v
                })
                .collect();
            for (d, other) in sorted.iter().enumerate().skip(1) {
                for (a, b) in sorted[0].iter().zip(other) {
                    if !options.sizes_match(a.0, b.0) {
                        mismatches.push(SizeMismatch {
                            record: r, param,
                            reference: (a.1.clone(), a.0),
                            design: d,
                            other: (b.1.clone(), b.0),
                        });
                    }
                }
            }
        }
    }
    for m in &mismatches {
        clilog::warn!(NCC_SIZE, "size mismatch: {}", m);
    }
    mismatches
}

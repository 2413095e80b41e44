//! Serial and parallel merging of devices.
//!
//! Parallel devices of one type on the same wires collapse into one
//! wider device, and transistors (or resistors) chained through a
//! private wire collapse into a stack. This lets two parallel
//! transistors match one transistor of twice the width.

use std::collections::HashMap;
use crate::{NccNetlist, NccOptions, Part, PartKind, VecCSR};

/// Number of devices removed by merging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub parallel: usize,
    pub series: usize,
}

/// Reverse a transistor stack so that source and drain swap.
#[inline]
fn reverse_mos(p: &mut Part) {
    if let PartKind::Mos { num_gates, .. } = p.kind {
        p.pins[..num_gates + 2].reverse();
    }
}

/// Pins of a device up to its symmetry, used as the parallel
/// merging key.
fn normalized_pins(p: &Part) -> Vec<usize> {
    match p.kind {
        PartKind::Mos { .. } => {
            let mut rev = p.clone();
            reverse_mos(&mut rev);
            p.pins.clone().min(rev.pins)
        }
        PartKind::Resistor { .. } => {
            let mut pins = p.pins.clone();
            pins.sort_unstable();
            pins
        }
        _ => p.pins.clone()
    }
}

/// Try to absorb part `b` into part `a`, which sits on the same
/// wires. Returns false if sizes forbid it.
fn absorb_parallel(a: &mut Part, b: &Part, options: &NccOptions) -> bool {
    match (&mut a.kind, &b.kind) {
        (PartKind::Mos { width: wa, length: la, .. },
         PartKind::Mos { width: wb, length: lb, .. }) |
        (PartKind::Resistor { width: wa, length: la, .. },
         PartKind::Resistor { width: wb, length: lb, .. }) => {
            if options.check_sizes && !options.sizes_match(*la, *lb) {
                return false
            }
            *wa += wb;
            true
        }
        (PartKind::Bipolar { area: aa, .. }, PartKind::Bipolar { area: ab, .. }) => {
            *aa += ab;
            true
        }
        _ => false
    }
}

fn merge_parallel(nl: &mut NccNetlist, options: &NccOptions, deleted: &mut [bool]) -> usize {
    let mut reps: HashMap<(u64, Vec<usize>), Vec<usize>> = HashMap::new();
    let mut merged = 0;
    for i in 0..nl.parts.len() {
        if deleted[i] || !matches!(nl.parts[i].kind,
                                   PartKind::Mos { .. } |
                                   PartKind::Resistor { .. } |
                                   PartKind::Bipolar { .. }) {
            continue
        }
        let key = (nl.parts[i].type_code(), normalized_pins(&nl.parts[i]));
        let list = reps.entry(key).or_default();
        let mut absorbed = false;
        for &j in list.iter() {
            let (head, tail) = nl.parts.split_at_mut(i);
            if absorb_parallel(&mut head[j], &tail[0], options) {
                absorbed = true;
                break
            }
        }
        if absorbed {
            deleted[i] = true;
            merged += 1;
        }
        else {
            list.push(i);
        }
    }
    merged
}

/// The wire at the end of a transistor stack or resistor away from
/// wire `w`.
fn far_end(p: &Part, w: usize) -> Option<usize> {
    let last = match p.kind {
        PartKind::Mos { num_gates, .. } => num_gates + 1,
        PartKind::Resistor { .. } => 1,
        _ => return None
    };
    Some(if p.pins[0] == w { p.pins[last] } else { p.pins[0] })
}

/// Join `b` into `a` through wire `w`, which only they touch.
fn absorb_series(a: &mut Part, b: &mut Part, w: usize, options: &NccOptions) -> bool {
    match (&a.kind, &b.kind) {
        (PartKind::Mos { typ: ta, width: wa, has_body: ba, .. },
         PartKind::Mos { typ: tb, width: wb, has_body: bb, .. }) => {
            if ta != tb || ba != bb || a.mos_body_pin().map(|p| a.pins[p]) !=
                b.mos_body_pin().map(|p| b.pins[p]) {
                return false
            }
            if options.check_sizes && !options.sizes_match(*wa, *wb) {
                return false
            }
        }
        (PartKind::Resistor { typ: ta, width: wa, .. },
         PartKind::Resistor { typ: tb, width: wb, .. }) => {
            if ta != tb || (options.check_sizes && !options.sizes_match(*wa, *wb)) {
                return false
            }
        }
        _ => return false
    }
    // the joined device would have both ends on one wire.
    if far_end(a, w) == far_end(b, w) {
        return false
    }

    match b.kind {
        PartKind::Mos { num_gates: nb, length: lb, .. } => {
            let PartKind::Mos { num_gates: na, .. } = a.kind else {
                return false
            };
            // a must end at w, b must start at it.
            if a.pins[0] == w {
                reverse_mos(a);
            }
            if b.pins[0] != w {
                reverse_mos(b);
            }
            let body = a.mos_body_pin().map(|p| a.pins[p]);
            let mut pins = a.pins[..na + 1].to_vec();
            pins.extend_from_slice(&b.pins[1..nb + 2]);
            pins.extend(body);
            a.pins = pins;
            if let PartKind::Mos { num_gates, length, .. } = &mut a.kind {
                *num_gates += nb;
                *length += lb;
            }
            true
        }
        PartKind::Resistor { length: lb, .. } => {
            let ea = if a.pins[0] == w { a.pins[1] } else { a.pins[0] };
            let eb = if b.pins[0] == w { b.pins[1] } else { b.pins[0] };
            a.pins = vec![ea, eb];
            if let PartKind::Resistor { length, .. } = &mut a.kind {
                *length += lb;
            }
            true
        }
        _ => false
    }
}

fn merge_series(nl: &mut NccNetlist, options: &NccOptions, deleted: &mut [bool]) -> usize {
    // flatten all live pins and group them by wire.
    let mut pin_owner = Vec::new();
    let mut inset = Vec::new();
    for (i, p) in nl.parts.iter().enumerate() {
        for (k, &w) in p.pins.iter().enumerate() {
            pin_owner.push((i, k));
            inset.push(if deleted[i] { usize::MAX } else { w });
        }
    }
    let wire_pins = VecCSR::from(nl.wires.len(), &inset);
    let mut has_port = vec![false; nl.wires.len()];
    for p in &nl.ports {
        has_port[p.wire] = true;
    }

    let mut touched = vec![false; nl.parts.len()];
    let mut merged = 0;
    for w in 0..nl.wires.len() {
        if has_port[w] || wire_pins.len(w) != 2 {
            continue
        }
        let mut it = wire_pins.iter_set(w).map(|pin| pin_owner[pin]);
        let (Some((a, pa)), Some((b, pb))) = (it.next(), it.next()) else {
            continue
        };
        if a == b || touched[a] || touched[b] {
            continue
        }
        let diffusion = |i: usize, k: usize| match nl.parts[i].kind {
            PartKind::Resistor { .. } => true,
            _ => nl.parts[i].is_diffusion(k)
        };
        if !diffusion(a, pa) || !diffusion(b, pb) {
            continue
        }
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let (head, tail) = nl.parts.split_at_mut(hi);
        let (pa_ref, pb_ref) = match a < b {
            true => (&mut head[lo], &mut tail[0]),
            false => (&mut tail[0], &mut head[lo])
        };
        if absorb_series(pa_ref, pb_ref, w, options) {
            deleted[b] = true;
            touched[a] = true;
            touched[b] = true;
            merged += 1;
        }
    }
    merged
}

/// Drop deleted parts and unused wires, renumbering what is left.
fn compact(nl: &mut NccNetlist, deleted: &[bool]) {
    let parts = std::mem::take(&mut nl.parts);
    nl.parts = parts.into_iter().zip(deleted.iter())
        .filter(|(_, &d)| !d)
        .map(|(p, _)| p)
        .collect();
    let mut used = vec![false; nl.wires.len()];
    for p in &nl.parts {
        for &w in &p.pins {
            used[w] = true;
        }
    }
    for p in &nl.ports {
        used[p.wire] = true;
    }
    let mut remap = vec![usize::MAX; nl.wires.len()];
    let wires = std::mem::take(&mut nl.wires);
    for (i, w) in wires.into_iter().enumerate() {
        if used[i] {
            remap[i] = nl.wires.len();
            nl.wires.push(w);
        }
    }
    for p in &mut nl.parts {
        for w in &mut p.pins {
            *w = remap[*w];
        }
    }
    for p in &mut nl.ports {
        p.wire = remap[p.wire];
    }
    nl.connect();
}

/// Merge parallel and series devices until nothing changes.
pub fn serial_parallel_merge(nl: &mut NccNetlist, options: &NccOptions) -> MergeStats {
    let mut stats = MergeStats::default();
    let mut deleted = vec![false; nl.parts.len()];
    loop {
        let parallel = merge_parallel(nl, options, &mut deleted);
        let series = merge_series(nl, options, &mut deleted);
        clilog::debug!(NCC_MERGE, "merge round: {} parallel, {} series",
                       parallel, series);
        stats.parallel += parallel;
        stats.series += series;
        if parallel + series == 0 {
            break
        }
    }
    compact(nl, &deleted);
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::*;

    fn netlist(b: CellBuilder, options: &NccOptions) -> NccNetlist {
        let mut lib = Library::new();
        let c = lib.add_cell(b.finish()).unwrap();
        NccNetlist::build(&lib, &NccRoot::new(c), None, options, &NeverAbort).unwrap()
    }

    #[test]
    fn test_parallel_mos() {
        let mut b = CellBuilder::new("p", CellView::Schematic);
        b.export("s", PortCharacteristic::Unknown);
        b.export("g", PortCharacteristic::Unknown);
        b.export("d", PortCharacteristic::Unknown);
        b.mos("m1", MosPolarity::N, ["s", "g", "d"], 1.0, 0.1);
        b.mos("m2", MosPolarity::N, ["d", "g", "s"], 1.5, 0.1);
        b.mos("m3", MosPolarity::P, ["s", "g", "d"], 1.0, 0.1);
        let opt = NccOptions::default();
        let mut nl = netlist(b, &opt);
        let stats = serial_parallel_merge(&mut nl, &opt);
        assert_eq!(stats, MergeStats { parallel: 1, series: 0 });
        assert_eq!(nl.parts.len(), 2);
        assert_eq!(nl.parts[0].sizes(), Some((2.5, 0.1)));
    }

    #[test]
    fn test_parallel_respects_length() {
        let mut b = CellBuilder::new("p", CellView::Schematic);
        b.mos("m1", MosPolarity::N, ["s", "g", "d"], 1.0, 0.1);
        b.mos("m2", MosPolarity::N, ["s", "g", "d"], 1.0, 0.2);
        let opt = NccOptions { check_sizes: true, ..Default::default() };
        let mut nl = netlist(b, &opt);
        assert_eq!(serial_parallel_merge(&mut nl, &opt).parallel, 0);
        assert_eq!(nl.parts.len(), 2);
    }

    #[test]
    fn test_series_refused_when_ends_meet() {
        // different lengths keep the two from merging in parallel.
        let opt = NccOptions { check_sizes: true, ..Default::default() };
        let mut b = CellBuilder::new("s", CellView::Layout);
        b.resistor("r1", ["a", "x"], 1.0, 1.0);
        b.resistor("r2", ["x", "a"], 1.0, 3.0);
        let mut nl = netlist(b, &opt);
        assert_eq!(serial_parallel_merge(&mut nl, &opt), MergeStats::default());
        assert_eq!(nl.parts.len(), 2);
    }

    #[test]
    fn test_series_stack() {
        // nand2 pull-down: gnd - b - x - a - y
        let mut b = CellBuilder::new("s", CellView::Layout);
        b.export("y", PortCharacteristic::Output);
        b.export("a", PortCharacteristic::Input);
        b.export("b", PortCharacteristic::Input);
        b.export("gnd", PortCharacteristic::Ground);
        b.mos("m1", MosPolarity::N, ["y", "a", "x"], 1.0, 0.1);
        b.mos("m2", MosPolarity::N, ["gnd", "b", "x"], 1.0, 0.1);
        let opt = NccOptions::default();
        let mut nl = netlist(b, &opt);
        let stats = serial_parallel_merge(&mut nl, &opt);
        assert_eq!(stats.series, 1);
        assert_eq!(nl.parts.len(), 1);
        assert_eq!(nl.wires.len(), 4);
        let p = &nl.parts[0];
        assert!(matches!(p.kind, PartKind::Mos { num_gates: 2, .. }));
        let names: Vec<&str> = p.pins.iter().map(|&w| nl.wires[w].name.as_str()).collect();
        assert_eq!(names, vec!["y", "a", "b", "gnd"]);
    }

    #[test]
    fn test_series_blocked_by_port() {
        let mut b = CellBuilder::new("s", CellView::Layout);
        b.export("x", PortCharacteristic::Unknown);
        b.resistor("r1", ["a", "x"], 1.0, 1.0);
        b.resistor("r2", ["x", "b"], 1.0, 1.0);
        let opt = NccOptions::default();
        let mut nl = netlist(b, &opt);
        assert_eq!(serial_parallel_merge(&mut nl, &opt).series, 0);

        let mut b = CellBuilder::new("s", CellView::Layout);
        b.resistor("r1", ["a", "x"], 1.0, 1.0);
        b.resistor("r2", ["x", "b"], 1.0, 1.0);
        let mut nl = netlist(b, &opt);
        assert_eq!(serial_parallel_merge(&mut nl, &opt).series, 1);
        assert_eq!(nl.parts[0].sizes(), Some((1.0, 2.0)));
    }
}

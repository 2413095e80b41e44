//! Local partitioning: split classes using only the type of each
//! part and the pin types attached to each wire.

use crate::netobject::fold64;
use crate::{NccError, NccGlobals, NetObjKind, RecordId};
use crate::globals::Stage;

/// Split every refinable leaf of a tree by a per-object key.
fn split_leaves(
    globals: &mut NccGlobals, kind: NetObjKind,
    key: impl Fn(&NccGlobals, usize, usize) -> u64
) -> usize {
    let leaves: Vec<RecordId> = globals.leaves(kind).into_iter()
        .filter(|&r| globals.arena()[r].is_refinable())
        .collect();
    let mut splits = 0;
    for r in leaves {
        let keys: Vec<Vec<u64>> = globals.arena()[r].circuits.iter().enumerate()
            .map(|(d, c)| c.members().iter().map(|&m| key(globals, d, m)).collect())
            .collect();
        if globals.split(r, &keys) {
            splits += 1;
        }
    }
    splits
}

/// Split parts by device type, then wires by the multiset of
/// (device type, pin class) pairs attached to them.
///
/// Returns false if a leaf of the part or wire tree ends up with
/// different sizes in different designs. No further refinement can
/// repair that, so the comparison stops there.
pub fn partition(globals: &mut NccGlobals) -> Result<bool, NccError> {
    globals.advance(Stage::Merged, Stage::LocallyPartitioned)?;
    let timer = clilog::stimer!("local partitioning");

    let mut splits = split_leaves(globals, NetObjKind::Part, |g, d, m| {
        g.netlist(d).parts[m].type_code()
    });
    splits += split_leaves(globals, NetObjKind::Wire, |g, d, m| {
        let nl = g.netlist(d);
        let mut sig: Vec<(u64, u32)> = nl.wires[m].pins.iter()
            .map(|p| {
                let part = &nl.parts[p.part];
                (part.type_code(), part.pin_class(p.pin))
            })
            .collect();
        sig.sort_unstable();
        sig.iter().fold(fold64(0, sig.len() as u64), |k, &(t, c)| {
            fold64(fold64(k, t), c as u64)
        })
    });
    globals.counters.local_splits += splits;

    let mut ok = true;
    for kind in [NetObjKind::Part, NetObjKind::Wire] {
        let arena = globals.arena();
        for r in globals.leaves(kind) {
            if arena[r].is_mismatched() {
                ok = false;
                if globals.options().how_much_status >= 1 {
                    clilog::warn!(NCC_LOCAL, "local partitioning: {} class sizes {:?} differ",
                                  kind, arena[r].sizes);
                }
            }
        }
    }
    clilog::finish!(timer);
    Ok(ok)
}

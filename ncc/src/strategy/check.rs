//! Consistency checks over the record trees.

use crate::{NccError, NccGlobals, NetObjKind, RecordState};
use crate::error::ensure;

/// Verify the structural invariants of all three trees and return
/// the number of mismatched leaves.
///
/// Checked: every record has one circuit per design; every leaf
/// member points back to its leaf; records with unequal sizes are
/// mismatched; the leaves of a tree hold every object of every
/// design exactly once.
pub fn check(globals: &NccGlobals) -> Result<usize, NccError> {
    let n = globals.num_designs();
    let arena = globals.arena();
    let mut mismatched = 0;
    for (id, rec) in arena.iter() {
        ensure(rec.num_circuits() == n, || format!(
            "{} record {:?} has {} circuits, expected {}",
            rec.kind, id, rec.num_circuits(), n))?;
        let equal = rec.sizes.windows(2).all(|w| w[0] == w[1]);
        ensure(equal || rec.state == RecordState::Mismatched, || format!(
            "{} record {:?} has sizes {:?} but is not mismatched",
            rec.kind, id, rec.sizes))?;
        if !rec.is_leaf() {
            continue
        }
        ensure(rec.circuits.len() == n, || format!(
            "leaf {} record {:?} lost its circuits", rec.kind, id))?;
        for (d, c) in rec.circuits.iter().enumerate() {
            ensure(c.len() == rec.sizes[d], || format!(
                "{} record {:?} circuit {} changed size", rec.kind, id, d))?;
            for &m in c.members() {
                ensure(globals.owner(rec.kind, d, m) == id, || format!(
                    "{} {} of design {} is not owned by its record {:?}",
                    rec.kind, m, d, id))?;
            }
        }
        if rec.is_mismatched() {
            mismatched += 1;
        }
    }
    for kind in NetObjKind::ALL {
        let mut totals = vec![0; n];
        for r in globals.leaves(kind) {
            for (d, &s) in arena[r].sizes.iter().enumerate() {
                totals[d] += s;
            }
        }
        for (d, &t) in totals.iter().enumerate() {
            let expected = globals.netlist(d).len(kind);
            ensure(t == expected, || format!(
                "{} tree holds {} objects of design {}, netlist has {}",
                kind, t, d, expected))?;
        }
    }
    Ok(mismatched)
}

//! Hash-code partitioning (color refinement).
//!
//! Each pass gives every part a key computed from the class codes of
//! its wires and splits part classes by key, then does the same for
//! wires from the codes of their parts. New classes get fresh codes,
//! so the next pass sees the refinement. The keys of one stage are
//! all computed from settled codes before any class of that stage is
//! split.
//!
//! Symmetric circuits such as rings stall with classes that hold
//! several objects per design. Then one member per design of the
//! first such class is paired off and refinement resumes.

use std::collections::BTreeSet;
use compact_str::CompactString;
use rayon::prelude::*;
use crate::{NccError, NccGlobals, NetObjKind, RecordId, RecordState};
use crate::globals::Stage;
use crate::netobject::{fold64, name_code};

/// How hash-code partitioning ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashOutcome {
    /// a full pass split nothing.
    Converged,
    /// the pass budget ran out. Reported as a mismatch.
    NotConverged,
    /// the user asked to stop.
    Aborted,
}

/// The kind whose codes form the key of `kind`.
#[inline]
fn neighbor_kind(kind: NetObjKind) -> NetObjKind {
    match kind {
        NetObjKind::Part | NetObjKind::Port => NetObjKind::Wire,
        NetObjKind::Wire => NetObjKind::Part,
    }
}

/// Split the given leaves by per-object keys computed in parallel.
/// Returns the number of records that split.
fn split_by_keys(
    globals: &mut NccGlobals, leaves: &[RecordId],
    key: impl Fn(&NccGlobals, usize, usize) -> u64 + Sync
) -> usize {
    let work: Vec<(usize, usize, usize)> = leaves.iter().enumerate()
        .flat_map(|(i, &r)| {
            globals.arena()[r].circuits.iter().enumerate().flat_map(
                move |(d, c)| c.members().iter().map(move |&m| (i, d, m)))
        })
        .collect();
    let g: &NccGlobals = globals;
    let flat: Vec<u64> = work.par_iter().map(|&(_, d, m)| key(g, d, m)).collect();

    let mut keys: Vec<Vec<Vec<u64>>> = leaves.iter()
        .map(|_| vec![Vec::new(); globals.num_designs()])
        .collect();
    for (&(i, d, _), k) in work.iter().zip(flat) {
        keys[i][d].push(k);
    }
    let mut splits = 0;
    for (&r, ks) in leaves.iter().zip(keys) {
        if globals.split(r, &ks) {
            splits += 1;
        }
    }
    splits
}

/// One hash stage over a tree. Returns the number of splits.
fn refine(globals: &mut NccGlobals, kind: NetObjKind) -> Result<usize, NccError> {
    let leaves: Vec<RecordId> = globals.leaf_records(kind)?.not_matched.iter()
        .copied()
        .collect();
    let leaves: Vec<RecordId> = leaves.into_iter()
        .filter(|&r| globals.arena()[r].is_refinable())
        .collect();
    let nk = neighbor_kind(kind);
    Ok(split_by_keys(globals, &leaves, |g, d, m| {
        g.netlist(d).object(kind, m).hash_contribution(|n| g.code_of(nk, d, n))
    }))
}

/// Export names present in every design, skipping ports marked for
/// renaming.
fn common_export_names(globals: &NccGlobals) -> BTreeSet<CompactString> {
    let mut sets = globals.netlists().iter().map(|nl| {
        nl.ports.iter()
            .filter(|p| !p.to_be_renamed)
            .flat_map(|p| p.names.iter().cloned())
            .collect::<BTreeSet<_>>()
    });
    let first = sets.next().unwrap_or_default();
    sets.fold(first, |acc, s| acc.intersection(&s).cloned().collect())
}

/// Split wire classes by the export names on each wire. Only names
/// that every design has are used, so a name missing in one design
/// does not break the topology by itself.
fn split_wires_by_export_names(globals: &mut NccGlobals) -> Result<usize, NccError> {
    let common = common_export_names(globals);
    if common.is_empty() {
        return Ok(0)
    }
    let leaves: Vec<RecordId> = globals.leaf_records(NetObjKind::Wire)?.not_matched.iter()
        .copied()
        .collect();
    let leaves: Vec<RecordId> = leaves.into_iter()
        .filter(|&r| globals.arena()[r].is_refinable())
        .collect();
    let splits = split_by_keys(globals, &leaves, |g, d, w| {
        let nl = g.netlist(d);
        let mut names: Vec<&str> = nl.wires[w].ports.iter()
            .flat_map(|&p| nl.ports[p].names.iter())
            .filter(|n| common.contains(*n))
            .map(|n| n.as_str())
            .collect();
        if names.is_empty() {
            return 0
        }
        names.sort_unstable();
        names.dedup();
        names.iter().fold(fold64(0, names.len() as u64), |k, n| fold64(k, name_code(n)))
    });
    globals.counters.export_name_splits += splits;
    Ok(splits)
}

/// Pair off one member of each design in the first class that still
/// holds more than one object per design, parts before wires. With
/// size checking on, the smallest part of each design is taken, so
/// that the pairing agrees with the sorted size comparison.
/// Returns false if there is no such class, or if some class is
/// already mismatched.
fn break_symmetry(globals: &mut NccGlobals) -> bool {
    if globals.num_mismatched(NetObjKind::Part) + globals.num_mismatched(NetObjKind::Wire) > 0 {
        return false
    }
    for kind in [NetObjKind::Part, NetObjKind::Wire] {
        let live = globals.leaves(kind).into_iter().find(|&r| {
            let rec = &globals.arena()[r];
            rec.state == RecordState::Live && rec.sizes[0] > 1
        });
        let Some(r) = live else { continue };
        let by_size = kind == NetObjKind::Part && globals.options().check_sizes;
        let keys: Vec<Vec<u64>> = globals.arena()[r].circuits.iter().enumerate()
            .map(|(d, c)| {
                let pick = if by_size { smallest_part(globals, d, c.members()) } else { 0 };
                (0..c.members().len()).map(|i| (i == pick) as u64).collect()
            })
            .collect();
        if globals.options().how_much_status >= 2 {
            clilog::debug!(NCC_HASH, "guessing a pair in a {} class of sizes {:?}",
                           kind, globals.arena()[r].sizes);
        }
        if globals.split(r, &keys) {
            globals.counters.guesses += 1;
            return true
        }
    }
    false
}

/// Position of the part with the smallest width, then length.
fn smallest_part(globals: &NccGlobals, design: usize, members: &[usize]) -> usize {
    let nl = globals.netlist(design);
    let size = |i: usize| nl.parts[members[i]].sizes().unwrap_or((0., 0.));
    (0..members.len())
        .min_by(|&a, &b| {
            let (sa, sb) = (size(a), size(b));
            sa.0.total_cmp(&sb.0).then(sa.1.total_cmp(&sb.1))
        })
        .unwrap_or(0)
}

/// Group ports by the class of their wire.
fn finish(globals: &mut NccGlobals) {
    let ports = globals.root(NetObjKind::Port);
    if globals.arena()[ports].is_refinable() {
        split_by_keys(globals, &[ports], |g, d, p| {
            g.netlist(d).object(NetObjKind::Port, p)
                .hash_contribution(|w| g.code_of(NetObjKind::Wire, d, w))
        });
    }
}

/// Run hash-code partitioning until a full pass splits nothing and no
/// class is left to guess in, the pass budget runs out, or the user
/// aborts. The aborter is polled at the start of each pass and
/// between its part and wire stages.
pub fn partition(globals: &mut NccGlobals) -> Result<HashOutcome, NccError> {
    globals.advance(Stage::LocallyPartitioned, Stage::HashPartitioned)?;
    let timer = clilog::stimer!("hash-code partitioning");
    let verbose = globals.options().how_much_status >= 2;
    let max_passes = globals.options().max_hash_passes;
    let mut used_export_names = false;

    let mut outcome = HashOutcome::NotConverged;
    for pass in 0..max_passes {
        if globals.user_wants_to_abort() {
            outcome = HashOutcome::Aborted;
            break
        }
        let part_splits = refine(globals, NetObjKind::Part)?;
        if globals.user_wants_to_abort() {
            outcome = HashOutcome::Aborted;
            break
        }
        let wire_splits = refine(globals, NetObjKind::Wire)?;
        globals.counters.hash_passes += 1;
        globals.counters.hash_splits += part_splits + wire_splits;
        if verbose {
            clilog::debug!(NCC_HASH, "pass {}: split {} part and {} wire classes",
                           pass, part_splits, wire_splits);
        }
        if part_splits + wire_splits > 0 {
            continue
        }
        if !used_export_names {
            used_export_names = true;
            if split_wires_by_export_names(globals)? > 0 {
                continue
            }
        }
        if break_symmetry(globals) {
            continue
        }
        outcome = HashOutcome::Converged;
        break
    }

    match outcome {
        HashOutcome::Converged => finish(globals),
        HashOutcome::NotConverged => clilog::warn!(
            NCC_HASH, "hash-code partitioning did not converge in {} passes",
            max_passes),
        HashOutcome::Aborted => clilog::info!(
            NCC_ABORT, "hash-code partitioning aborted after {} passes",
            globals.counters.hash_passes),
    }
    clilog::finish!(timer);
    Ok(outcome)
}

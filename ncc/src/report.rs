//! Printing comparison results.

use std::fmt::Write;
use itertools::Itertools;
use crate::{NccGlobals, NccOptions, NccResult, NetObjKind, RecordId};

/// One line naming each aspect of a result.
pub fn summary(result: &NccResult) -> String {
    let yn = |b: bool| if b { "ok" } else { "FAIL" };
    let mut s = format!("{}: {}", result.cell_names.join(" vs "), result.verdict());
    if result.aborted {
        return s
    }
    let _ = write!(s, " [netlists {}, local {}, export names {}, hash {}, \
                       topology {}, export topology {}, sizes {}]",
                   yn(result.netlists_ok), yn(result.local_partition_ok),
                   yn(result.export_names_match), yn(result.hash_converged),
                   yn(result.topology_match), yn(result.export_topology_match),
                   yn(result.sizes_match));
    s
}

/// Describe a record: its kind, sizes and the first members of
/// every design.
pub fn describe_record(globals: &NccGlobals, id: RecordId, max_members: usize) -> String {
    let rec = &globals.arena()[id];
    let mut s = format!("{} class {:?} sizes {:?}", rec.kind, rec.state, rec.sizes);
    for (d, c) in rec.circuits.iter().enumerate() {
        let nl = globals.netlist(d);
        let names = c.members().iter().take(max_members)
            .map(|&m| match rec.kind {
                NetObjKind::Part => format!(
                    "{} ({})", nl.parts[m].name, nl.parts[m].type_description()),
                _ => nl.object(rec.kind, m).name().to_string(),
            });
        let more = c.len().saturating_sub(max_members);
        let _ = write!(s, "\n    {}: {}", nl.cell_name, names.format(", "));
        if more > 0 {
            let _ = write!(s, " and {} more", more);
        }
    }
    s
}

/// Log a result according to the verbosity options.
pub fn report(result: &NccResult, options: &NccOptions) {
    clilog::info!(NCC_RESULT, "{}", summary(result));
    for e in &result.netlist_errors {
        clilog::warn!(NCC_RESULT, "netlist error: {}", e);
    }
    let Some(globals) = &result.globals else { return };
    if options.how_much_status < 1 && result.matched() {
        return
    }
    for (d, c) in result.counts.iter().enumerate() {
        clilog::info!(NCC_COUNTS, "{}: {} parts, {} wires, {} ports",
                      result.cell_names[d], c.parts, c.wires, c.ports);
    }
    for kind in [NetObjKind::Part, NetObjKind::Wire] {
        let leaves = globals.leaves(kind);
        let mismatched = leaves.iter().copied()
            .filter(|&r| globals.arena()[r].is_mismatched())
            .take(options.max_mismatched_equiv_recs_to_print);
        for r in mismatched {
            clilog::warn!(NCC_MISMATCH, "mismatched {}",
                          describe_record(globals, r, options.max_equiv_rec_members_to_print));
        }
        let matched = leaves.iter().copied()
            .filter(|&r| globals.arena()[r].is_matched())
            .take(options.max_matched_equiv_recs_to_print);
        for r in matched {
            clilog::info!(NCC_MATCHED, "matched {}",
                          describe_record(globals, r, options.max_equiv_rec_members_to_print));
        }
    }
    if options.how_much_status >= 1 {
        let c = &globals.counters;
        clilog::info!(NCC_COUNTERS, "merged {} parallel, {} series; {} local splits, \
                                     {} hash passes, {} hash splits, {} export name splits, \
                                     {} guesses",
                      c.parallel_merged, c.series_merged, c.local_splits,
                      c.hash_passes, c.hash_splits, c.export_name_splits, c.guesses);
    }
}

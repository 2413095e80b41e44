//! Strategies that refine the equivalence record trees.
//!
//! Every strategy takes the run's [`NccGlobals`](crate::NccGlobals)
//! explicitly and observes the fully settled result of the previous
//! one.

mod check;
pub use check::check;

mod local;
pub use local::partition as local_partition;

mod hash;
pub use hash::{partition as hash_partition, HashOutcome};

mod sizes;
pub use sizes::{check_sizes, SizeMismatch, SizeParam};

use crate::{serial_parallel_merge, MergeStats, NccError, NccGlobals};
use crate::globals::Stage;

/// Merge serial and parallel devices of every design, then rebuild
/// the trees over the reduced netlists. Runs exactly once, before
/// any other refinement.
pub fn serial_parallel(globals: &mut NccGlobals) -> Result<MergeStats, NccError> {
    globals.advance(Stage::Built, Stage::Merged)?;
    let timer = clilog::stimer!("serial/parallel merge");
    let mut total = MergeStats::default();
    globals.rebuild_with(|netlists, options| {
        for nl in netlists {
            let stats = serial_parallel_merge(nl, options);
            total.parallel += stats.parallel;
            total.series += stats.series;
        }
    });
    globals.counters.parallel_merged += total.parallel;
    globals.counters.series_merged += total.series;
    if globals.options().how_much_status >= 1 {
        clilog::info!(NCC_MERGE, "merged {} parallel and {} series devices",
                      total.parallel, total.series);
    }
    clilog::finish!(timer);
    Ok(total)
}

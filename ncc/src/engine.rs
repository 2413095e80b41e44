//! One comparison of two or more designs.

use std::fmt;
use std::sync::Arc;
use compact_str::CompactString;
use crate::{
    Aborter, DesignCounts, ExportChecker, ExportMismatch, HierarchyInfo,
    Library, NccError, NccGlobals, NccNetlist, NccOptions, NccRoot,
    NetObjKind, SizeMismatch,
};
use crate::strategy::{self, HashOutcome};

/// Overall outcome of a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Match,
    Mismatch,
    /// the user aborted before the comparison finished.
    Incomplete,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::Match => "match",
            Verdict::Mismatch => "MISMATCH",
            Verdict::Incomplete => "incomplete",
        })
    }
}

/// The result of one comparison.
///
/// Each aspect is tracked separately so that callers can tell which
/// one failed. Aspects that were never evaluated, because an earlier
/// one failed or the run was aborted, are false. `sizes_match` is
/// true when sizes are not checked.
#[readonly::make]
#[derive(Debug)]
pub struct NccResult {
    /// root cell name of each design.
    pub cell_names: Vec<CompactString>,
    pub netlists_ok: bool,
    pub local_partition_ok: bool,
    pub export_names_match: bool,
    pub hash_converged: bool,
    pub topology_match: bool,
    pub export_topology_match: bool,
    pub sizes_match: bool,
    pub aborted: bool,
    pub counts: Vec<DesignCounts>,
    pub netlist_errors: Vec<String>,
    pub export_mismatches: Vec<ExportMismatch>,
    pub size_mismatches: Vec<SizeMismatch>,
    pub suggestions: Vec<String>,
    /// the run context, for drill-down into the equivalence
    /// classes. None if the netlists could not be built.
    pub globals: Option<NccGlobals>,
}

impl NccResult {
    fn new(cell_names: Vec<CompactString>) -> NccResult {
        NccResult {
            cell_names,
            netlists_ok: false,
            local_partition_ok: false,
            export_names_match: false,
            hash_converged: false,
            topology_match: false,
            export_topology_match: false,
            sizes_match: false,
            aborted: false,
            counts: Vec::new(),
            netlist_errors: Vec::new(),
            export_mismatches: Vec::new(),
            size_mismatches: Vec::new(),
            suggestions: Vec::new(),
            globals: None,
        }
    }

    fn incomplete(mut self) -> NccResult {
        self.aborted = true;
        self
    }

    /// true if every aspect matched.
    pub fn matched(&self) -> bool {
        !self.aborted && self.netlists_ok && self.local_partition_ok &&
            self.export_names_match && self.hash_converged &&
            self.topology_match && self.export_topology_match &&
            self.sizes_match
    }

    pub fn verdict(&self) -> Verdict {
        if self.aborted {
            Verdict::Incomplete
        }
        else if self.matched() {
            Verdict::Match
        }
        else {
            Verdict::Mismatch
        }
    }
}

/// Orchestrates a single comparison.
pub struct NccEngine;

impl NccEngine {
    /// Compare the root cells of two or more designs.
    ///
    /// With `hier`, instances of cells already proven equivalent are
    /// compared as subcircuits, and on a full match the roots are
    /// recorded as subcircuits for later parent comparisons.
    ///
    /// Mismatches and aborts are reported in the [`NccResult`].
    /// Errors are returned only for invalid input and broken internal
    /// invariants.
    pub fn compare(
        lib: &Library, roots: &[NccRoot],
        hier: Option<&mut HierarchyInfo>,
        options: &NccOptions, aborter: Arc<dyn Aborter>
    ) -> Result<NccResult, NccError> {
        let timer = clilog::stimer!("ncc compare");
        let result = Self::run_stages(lib, roots, hier, options, aborter)?;
        crate::report::report(&result, options);
        clilog::finish!(timer);
        Ok(result)
    }

    fn run_stages(
        lib: &Library, roots: &[NccRoot],
        mut hier: Option<&mut HierarchyInfo>,
        options: &NccOptions, aborter: Arc<dyn Aborter>
    ) -> Result<NccResult, NccError> {
        if roots.len() < 2 {
            return Err(NccError::invalid(format!(
                "need at least two designs to compare, got {}", roots.len())))
        }
        let cell_names = roots.iter()
            .map(|r| lib.checked(r.cell).map(|c| c.name.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        let mut result = NccResult::new(cell_names);
        clilog::info!(NCC_COMPARE, "comparing {}", result.cell_names.join(" with "));

        let timer = clilog::stimer!("build netlists");
        let mut netlists = Vec::with_capacity(roots.len());
        for root in roots {
            let nl = NccNetlist::build(lib, root, hier.as_deref(), options, &*aborter)?;
            if nl.aborted {
                clilog::finish!(timer);
                return Ok(result.incomplete())
            }
            result.netlist_errors.extend(
                nl.errors.iter().map(|e| format!("{}: {}", nl.cell_name, e)));
            netlists.push(nl);
        }
        clilog::finish!(timer);
        result.netlists_ok = result.netlist_errors.is_empty();

        let mut globals = NccGlobals::new(netlists, options, aborter)?;
        result.counts = globals.counts();
        strategy::check(&globals)?;
        if !result.netlists_ok {
            result.globals = Some(globals);
            return Ok(result)
        }

        if result.counts.iter().all(|c| *c == DesignCounts::default()) {
            clilog::info!(NCC_COMPARE, "all cells are empty");
            result.local_partition_ok = true;
            result.export_names_match = true;
            result.hash_converged = true;
            result.topology_match = true;
            result.export_topology_match = true;
            result.sizes_match = true;
            result.globals = Some(globals);
            return Ok(result)
        }
        if globals.user_wants_to_abort() {
            result.globals = Some(globals);
            return Ok(result.incomplete())
        }

        strategy::serial_parallel(&mut globals)?;
        result.counts = globals.counts();
        strategy::check(&globals)?;

        let mut checker = ExportChecker::new();
        result.export_mismatches = checker.match_by_name(&globals);
        result.export_names_match = result.export_mismatches.is_empty();
        if globals.user_wants_to_abort() {
            result.globals = Some(globals);
            return Ok(result.incomplete())
        }

        result.local_partition_ok = strategy::local_partition(&mut globals)?;
        let mismatched = strategy::check(&globals)?;
        if options.how_much_status >= 1 {
            clilog::info!(NCC_LOCAL, "after local partitioning: {} mismatched classes",
                          mismatched);
        }
        if !result.local_partition_ok {
            result.sizes_match = !options.check_sizes;
            result.globals = Some(globals);
            return Ok(result)
        }
        if globals.user_wants_to_abort() {
            result.globals = Some(globals);
            return Ok(result.incomplete())
        }

        let outcome = strategy::hash_partition(&mut globals)?;
        strategy::check(&globals)?;
        if outcome == HashOutcome::Aborted {
            result.globals = Some(globals);
            return Ok(result.incomplete())
        }
        result.hash_converged = outcome == HashOutcome::Converged;
        result.topology_match = result.hash_converged &&
            globals.num_mismatched(NetObjKind::Part) == 0 &&
            globals.num_mismatched(NetObjKind::Wire) == 0;

        if result.hash_converged {
            let topo = checker.ensure_exports_on_equivalent_nets(&globals);
            result.export_topology_match = topo.is_empty();
            result.export_mismatches.extend(topo);
            result.suggestions = checker.suggest_port_matches(&globals);
        }
        result.sizes_match = true;
        if options.check_sizes && result.topology_match {
            result.size_mismatches = strategy::check_sizes(&globals);
            result.sizes_match = result.size_mismatches.is_empty();
        }

        if result.matched() {
            if let Some(h) = hier.as_deref_mut() {
                checker.save_subcircuit_info(&globals, lib, h);
            }
        }
        result.globals = Some(globals);
        Ok(result)
    }
}

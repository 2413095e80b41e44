//! Netlist comparison (NCC).
//!
//! Proves two (or more) circuit netlists, e.g. a schematic and a
//! layout, topologically equivalent. Each design is flattened into
//! parts, wires and ports; parallel and series devices are merged;
//! then equivalence classes are refined by local signatures and by
//! hash-code partitioning until nothing splits. Designs match when
//! every class holds the same number of objects from every design
//! and the exports agree.
//!
//! Hierarchical runs compare cell groups bottom-up and reuse the
//! groups that matched as black-box subcircuits of their parents.

mod error;
pub use error::NccError;

mod options;
pub use options::{NccOperation, NccOptions};

mod abort;
pub use abort::{Aborter, CancelToken, NeverAbort};

mod annotations;
pub use annotations::{CellAnnotations, NamePattern};

mod design;
pub use design::{
    Cell, CellBuilder, CellId, CellView, DeviceKind, Export, GlobalSignal,
    Instance, InstanceKind, Library, MosPolarity, NccRoot,
    PortCharacteristic, VarContext,
};

mod disjoint_set;
pub use disjoint_set::DisjointSet;

mod csr;
pub use csr::VecCSR;

mod netobject;
pub use netobject::{NetObjKind, NetObject, Part, PartKind, Port, Wire, WirePin};

mod netlist;
pub use netlist::NccNetlist;

mod merge;
pub use merge::{serial_parallel_merge, MergeStats};

mod trees;
pub use trees::{Circuit, EquivRecord, RecordArena, RecordId, RecordState};

mod globals;
pub use globals::{Counters, DesignCounts, LeafLists, NccGlobals, Stage};

pub mod strategy;
pub use strategy::{SizeMismatch, SizeParam};

mod hierarchy;
pub use hierarchy::{HierarchyInfo, SubcircuitInfo};

mod export_checker;
pub use export_checker::{ExportChecker, ExportMismatch};

mod engine;
pub use engine::{NccEngine, NccResult, Verdict};

mod bottom_up;
pub use bottom_up::{BottomUpResult, CellUsage, GroupComparison, NccBottomUp};

pub mod report;

use std::sync::Arc;

/// The result of [`run`]: a single flat comparison or a bottom-up
/// walk.
#[derive(Debug)]
pub enum NccOutcome {
    Flat(NccResult),
    BottomUp(BottomUpResult),
}

impl NccOutcome {
    pub fn verdict(&self) -> Verdict {
        match self {
            NccOutcome::Flat(r) => r.verdict(),
            NccOutcome::BottomUp(r) => r.verdict(),
        }
    }

    #[inline]
    pub fn matched(&self) -> bool {
        self.verdict() == Verdict::Match
    }
}

/// Compare the designs under `roots` as selected by
/// `options.operation`.
pub fn run(
    lib: &Library, roots: &[NccRoot], options: &NccOptions,
    aborter: Arc<dyn Aborter>
) -> Result<NccOutcome, NccError> {
    Ok(match options.operation {
        NccOperation::FlatTopCells => NccOutcome::Flat(
            NccEngine::compare(lib, roots, None, options, aborter)?),
        NccOperation::FlatEachCell => NccOutcome::BottomUp(
            NccBottomUp::compare(lib, roots, options, aborter, false)?),
        NccOperation::HierEachCell => NccOutcome::BottomUp(
            NccBottomUp::compare(lib, roots, options, aborter, true)?),
    })
}

//! The per-comparison run context.
//!
//! An [`NccGlobals`] is created at the start of one comparison and
//! dropped at the end. It owns everything the strategies mutate, so
//! independent comparisons can run on different threads without
//! sharing any state.

use std::fmt;
use std::sync::Arc;
use compact_str::CompactString;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use crate::{
    Aborter, Circuit, NccError, NccNetlist, NccOptions, NccRoot,
    NetObjKind, RecordArena, RecordId, RecordState,
};
use crate::error::ensure;

/// How far a comparison has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// netlists built and the three root records created.
    Built,
    /// serial/parallel merge done.
    Merged,
    /// local partitioning done.
    LocallyPartitioned,
    /// hash-code partitioning finished, converged or not.
    HashPartitioned,
}

/// Cached leaf records of one tree, split by state.
///
/// The cache is only valid after merging and local partitioning,
/// since merging rebuilds the trees from scratch.
#[derive(Debug, Clone, Default)]
pub struct LeafLists {
    pub matched: Vec<RecordId>,
    pub not_matched: Vec<RecordId>,
}

impl LeafLists {
    fn build(arena: &RecordArena, root: RecordId) -> LeafLists {
        let mut lists = LeafLists::default();
        lists.classify(arena, arena.leaf_descendants(root));
        lists
    }

    fn classify(&mut self, arena: &RecordArena, leaves: Vec<RecordId>) {
        for r in leaves {
            match arena[r].is_matched() {
                true => self.matched.push(r),
                false => self.not_matched.push(r),
            }
        }
    }

    /// Replace records that were split since the last refresh by
    /// their leaves, and move newly matched records.
    fn refresh(&mut self, arena: &RecordArena) {
        let stale = std::mem::take(&mut self.not_matched);
        for r in stale {
            self.classify(arena, arena.leaf_descendants(r));
        }
    }

    pub fn mismatched<'a>(&'a self, arena: &'a RecordArena) -> impl Iterator<Item = RecordId> + 'a {
        self.not_matched.iter().copied().filter(|&r| arena[r].is_mismatched())
    }
}

/// Benchmark counters of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub parallel_merged: usize,
    pub series_merged: usize,
    pub local_splits: usize,
    pub hash_passes: usize,
    pub hash_splits: usize,
    pub export_name_splits: usize,
    /// classes split by pairing off one arbitrary member per design.
    pub guesses: usize,
}

/// Object counts of one design.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DesignCounts {
    pub parts: usize,
    pub wires: usize,
    pub ports: usize,
}

/// The mutable context of one comparison run.
pub struct NccGlobals {
    options: NccOptions,
    aborter: Arc<dyn Aborter>,
    netlists: Vec<NccNetlist>,
    arena: RecordArena,
    roots: [RecordId; 3],
    /// `owners[kind][design][object]` is the leaf record of an object.
    owners: [Vec<Vec<RecordId>>; 3],
    rng: Xoshiro256PlusPlus,
    stage: Stage,
    leaf_lists: [Option<LeafLists>; 3],
    pub counters: Counters,
}

impl fmt::Debug for NccGlobals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NccGlobals")
            .field("designs", &self.root_cell_names())
            .field("stage", &self.stage)
            .field("records", &self.arena.len())
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl NccGlobals {
    /// Set up a run over already built netlists.
    pub fn new(
        netlists: Vec<NccNetlist>, options: &NccOptions,
        aborter: Arc<dyn Aborter>
    ) -> Result<NccGlobals, NccError> {
        if netlists.len() < 2 {
            return Err(NccError::invalid(format!(
                "need at least two designs to compare, got {}", netlists.len())))
        }
        let mut globals = NccGlobals {
            options: options.clone(),
            aborter,
            netlists,
            arena: RecordArena::default(),
            roots: [RecordId(0); 3],
            owners: Default::default(),
            rng: Xoshiro256PlusPlus::seed_from_u64(options.random_seed),
            stage: Stage::Built,
            leaf_lists: Default::default(),
            counters: Counters::default(),
        };
        globals.build_forest();
        Ok(globals)
    }

    /// (Re)create the three root records, each holding every object
    /// of its kind.
    fn build_forest(&mut self) {
        self.arena = RecordArena::default();
        self.leaf_lists = Default::default();
        for kind in NetObjKind::ALL {
            let owners: Vec<Vec<RecordId>> = self.netlists.iter()
                .map(|nl| vec![RecordId(0); nl.len(kind)])
                .collect();
            self.owners[kind.index()] = owners;
            let circuits = self.netlists.iter()
                .map(|nl| Circuit::new((0..nl.len(kind)).collect()))
                .collect();
            let code = rand::RngCore::next_u64(&mut self.rng);
            self.roots[kind.index()] = self.arena.new_root(
                kind, circuits, code, &mut self.owners[kind.index()]);
        }
    }

    #[inline]
    pub fn options(&self) -> &NccOptions {
        &self.options
    }

    #[inline]
    pub fn num_designs(&self) -> usize {
        self.netlists.len()
    }

    #[inline]
    pub fn netlist(&self, design: usize) -> &NccNetlist {
        &self.netlists[design]
    }

    #[inline]
    pub fn netlists(&self) -> &[NccNetlist] {
        &self.netlists
    }

    pub fn roots(&self) -> impl Iterator<Item = &NccRoot> + '_ {
        self.netlists.iter().map(|nl| &nl.root)
    }

    pub fn root_cell_names(&self) -> Vec<CompactString> {
        self.netlists.iter().map(|nl| nl.cell_name.clone()).collect()
    }

    #[inline]
    pub fn arena(&self) -> &RecordArena {
        &self.arena
    }

    #[inline]
    pub fn root(&self, kind: NetObjKind) -> RecordId {
        self.roots[kind.index()]
    }

    #[inline]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The leaf record an object belongs to.
    #[inline]
    pub fn owner(&self, kind: NetObjKind, design: usize, obj: usize) -> RecordId {
        self.owners[kind.index()][design][obj]
    }

    /// The class code of an object: the code of its leaf record.
    #[inline]
    pub fn code_of(&self, kind: NetObjKind, design: usize, obj: usize) -> u64 {
        self.arena[self.owner(kind, design, obj)].code
    }

    #[inline]
    pub fn user_wants_to_abort(&self) -> bool {
        self.aborter.user_wants_to_abort()
    }

    /// Object counts of every design.
    pub fn counts(&self) -> Vec<DesignCounts> {
        self.netlists.iter().map(|nl| DesignCounts {
            parts: nl.parts.len(),
            wires: nl.wires.len(),
            ports: nl.ports.len(),
        }).collect()
    }

    /// Advance to `next`, which must directly follow the current
    /// stage.
    pub(crate) fn advance(&mut self, from: Stage, next: Stage) -> Result<(), NccError> {
        ensure(self.stage == from, || format!(
            "stage {:?} requested while at {:?}, expected {:?}", next, self.stage, from))?;
        self.stage = next;
        Ok(())
    }

    /// Mutate the netlists (used by merging) and rebuild the trees.
    pub(crate) fn rebuild_with(&mut self, f: impl FnOnce(&mut [NccNetlist], &NccOptions)) {
        f(&mut self.netlists, &self.options);
        self.build_forest();
    }

    /// Split a leaf record by per-member keys. Returns true if it
    /// split.
    pub(crate) fn split(&mut self, id: RecordId, keys: &[Vec<u64>]) -> bool {
        let kind = self.arena[id].kind;
        self.arena.split(id, keys, &mut self.rng, &mut self.owners[kind.index()]).is_some()
    }

    /// Leaf records of one tree.
    ///
    /// Only available once merging and local partitioning are done:
    /// before that the trees are still rebuilt wholesale.
    pub fn leaf_records(&mut self, kind: NetObjKind) -> Result<&LeafLists, NccError> {
        ensure(self.stage >= Stage::LocallyPartitioned, || format!(
            "leaf records requested at stage {:?}", self.stage))?;
        let arena = &self.arena;
        let root = self.roots[kind.index()];
        let lists = self.leaf_lists[kind.index()]
            .get_or_insert_with(|| LeafLists::build(arena, root));
        lists.refresh(arena);
        Ok(lists)
    }

    /// Leaves of a tree in left-to-right order, without caching.
    pub fn leaves(&self, kind: NetObjKind) -> Vec<RecordId> {
        self.arena.leaf_descendants(self.root(kind))
    }

    /// Number of mismatched leaves of a tree.
    pub fn num_mismatched(&self, kind: NetObjKind) -> usize {
        self.leaves(kind).into_iter()
            .filter(|&r| self.arena[r].is_mismatched())
            .count()
    }

    /// For each design, the object in it equivalent to each object
    /// of design 0. Only objects in classes with exactly one member
    /// per design are mapped.
    fn equivalent(&self, kind: NetObjKind) -> Vec<Vec<Option<usize>>> {
        let n0 = self.netlists[0].len(kind);
        let mut map = vec![vec![None; n0]; self.num_designs()];
        for r in self.leaves(kind) {
            let rec = &self.arena[r];
            if rec.state != RecordState::Matched || rec.sizes.iter().any(|&s| s != 1) {
                continue
            }
            let m0 = rec.circuits[0].members()[0];
            for (d, c) in rec.circuits.iter().enumerate() {
                map[d][m0] = Some(c.members()[0]);
            }
        }
        map
    }

    /// `equivalent_nets()[d][w]` is the wire of design `d`
    /// equivalent to wire `w` of design 0.
    pub fn equivalent_nets(&self) -> Vec<Vec<Option<usize>>> {
        self.equivalent(NetObjKind::Wire)
    }

    /// `equivalent_parts()[d][p]` is the part of design `d`
    /// equivalent to part `p` of design 0.
    pub fn equivalent_parts(&self) -> Vec<Vec<Option<usize>>> {
        self.equivalent(NetObjKind::Part)
    }
}

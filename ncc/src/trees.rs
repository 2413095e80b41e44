//! The equivalence record tree.
//!
//! Each [`EquivRecord`] is a candidate equivalence class holding one
//! [`Circuit`] per compared design. Records live in a
//! [`RecordArena`] and refer to each other by [`RecordId`]. The tree
//! only ever grows by splitting a leaf into children, so two objects
//! separated once are never joined again.

use std::collections::BTreeMap;
use std::ops::Index;
use rand::RngCore;
use crate::NetObjKind;

/// Index of a record in its [`RecordArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(pub usize);

/// The verdict on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordState {
    /// sizes agree, but the class may still split.
    Live,
    /// sizes agree and no further refinement can separate the
    /// members.
    Matched,
    /// the designs contribute different numbers of members.
    Mismatched,
}

impl RecordState {
    /// The state of a fresh record with the given circuit sizes.
    pub fn classify(sizes: &[usize]) -> RecordState {
        match sizes.split_first() {
            Some((&first, rest)) if rest.iter().all(|&s| s == first) => match first {
                0 | 1 => RecordState::Matched,
                _ => RecordState::Live
            },
            Some(_) => RecordState::Mismatched,
            None => RecordState::Matched,
        }
    }
}

/// The members one design contributes to a record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Circuit {
    members: Vec<usize>,
}

impl Circuit {
    #[inline]
    pub fn new(members: Vec<usize>) -> Circuit {
        Circuit { members }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Object indices in the design's netlist.
    #[inline]
    pub fn members(&self) -> &[usize] {
        &self.members
    }
}

/// A candidate equivalence class.
#[readonly::make]
#[derive(Debug, Clone)]
pub struct EquivRecord {
    pub kind: NetObjKind,
    pub parent: Option<RecordId>,
    /// empty for a leaf.
    pub children: Vec<RecordId>,
    /// one circuit per design. Emptied once the record is split.
    pub circuits: Vec<Circuit>,
    /// circuit sizes at creation.
    pub sizes: Vec<usize>,
    /// class code that neighbors read during hash partitioning.
    pub code: u64,
    pub state: RecordState,
}

impl EquivRecord {
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    #[inline]
    pub fn num_circuits(&self) -> usize {
        self.sizes.len()
    }

    #[inline]
    pub fn max_size(&self) -> usize {
        self.sizes.iter().copied().max().unwrap_or(0)
    }

    #[inline]
    pub fn is_matched(&self) -> bool {
        self.state == RecordState::Matched
    }

    #[inline]
    pub fn is_mismatched(&self) -> bool {
        self.state == RecordState::Mismatched
    }

    /// true if partitioning may still split this leaf.
    #[inline]
    pub fn is_refinable(&self) -> bool {
        self.is_leaf() && !self.is_matched() && self.sizes.iter().sum::<usize>() > 1
    }
}

/// Storage of all records of one comparison.
#[derive(Debug, Clone, Default)]
pub struct RecordArena {
    records: Vec<EquivRecord>,
}

impl RecordArena {
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RecordId, &EquivRecord)> + '_ {
        self.records.iter().enumerate().map(|(i, r)| (RecordId(i), r))
    }

    /// Create a root record. Every member of `circuits` is owned by
    /// it, so `owners[design][member]` is set to the new id.
    ///
    /// A root is never matched on creation: nothing has compared its
    /// members yet.
    pub fn new_root(
        &mut self, kind: NetObjKind, circuits: Vec<Circuit>, code: u64,
        owners: &mut [Vec<RecordId>]
    ) -> RecordId {
        let id = self.push(kind, None, circuits, code, owners);
        let r = &mut self.records[id.0];
        if r.state == RecordState::Matched {
            r.state = RecordState::Live;
        }
        id
    }

    fn push(
        &mut self, kind: NetObjKind, parent: Option<RecordId>,
        circuits: Vec<Circuit>, code: u64,
        owners: &mut [Vec<RecordId>]
    ) -> RecordId {
        let id = RecordId(self.records.len());
        for (c, owner) in circuits.iter().zip(owners.iter_mut()) {
            for &m in c.members() {
                owner[m] = id;
            }
        }
        let sizes: Vec<usize> = circuits.iter().map(|c| c.len()).collect();
        self.records.push(EquivRecord {
            kind, parent,
            children: Vec::new(),
            state: RecordState::classify(&sizes),
            circuits, sizes, code,
        });
        id
    }

    /// Split a leaf by one key per member (`keys[design][i]` belongs
    /// to the i-th member of that design's circuit).
    ///
    /// Children are created in ascending key order, each with a fresh
    /// code from `rng`. Returns the children, or None if all members
    /// share a key and nothing changed.
    pub fn split(
        &mut self, id: RecordId, keys: &[Vec<u64>],
        rng: &mut impl RngCore,
        owners: &mut [Vec<RecordId>]
    ) -> Option<Vec<RecordId>> {
        let rec = &self.records[id.0];
        let n = rec.circuits.len();
        let mut groups: BTreeMap<u64, Vec<Vec<usize>>> = BTreeMap::new();
        for (d, (c, ks)) in rec.circuits.iter().zip(keys).enumerate() {
            for (&m, &k) in c.members().iter().zip(ks) {
                groups.entry(k).or_insert_with(|| vec![Vec::new(); n])[d].push(m);
            }
        }
        if groups.len() <= 1 {
            return None
        }
        let kind = rec.kind;
        self.records[id.0].circuits = Vec::new();
        let children: Vec<RecordId> = groups.into_values().map(|members| {
            let circuits = members.into_iter().map(Circuit::new).collect();
            let code = rng.next_u64();
            self.push(kind, Some(id), circuits, code, owners)
        }).collect();
        self.records[id.0].children = children.clone();
        Some(children)
    }

    /// All leaves under (and including) a record, left to right.
    pub fn leaf_descendants(&self, id: RecordId) -> Vec<RecordId> {
        let mut leaves = Vec::new();
        let mut stack = vec![id];
        while let Some(r) = stack.pop() {
            let rec = &self.records[r.0];
            if rec.is_leaf() {
                leaves.push(r);
            }
            else {
                stack.extend(rec.children.iter().rev());
            }
        }
        leaves
    }
}

impl Index<RecordId> for RecordArena {
    type Output = EquivRecord;

    #[inline]
    fn index(&self, id: RecordId) -> &EquivRecord {
        &self.records[id.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_classify() {
        assert_eq!(RecordState::classify(&[3, 3]), RecordState::Live);
        assert_eq!(RecordState::classify(&[1, 1, 1]), RecordState::Matched);
        assert_eq!(RecordState::classify(&[3, 2]), RecordState::Mismatched);
    }

    #[test]
    fn test_split_keeps_partition() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let mut owners = vec![vec![RecordId(0); 3], vec![RecordId(0); 3]];
        let mut arena = RecordArena::default();
        let root = arena.new_root(NetObjKind::Part, vec![
            Circuit::new(vec![0, 1, 2]), Circuit::new(vec![0, 1, 2])
        ], 7, &mut owners);
        assert_eq!(arena[root].state, RecordState::Live);

        assert!(arena.split(root, &[vec![5, 5, 5], vec![5, 5, 5]],
                            &mut rng, &mut owners).is_none());
        let children = arena.split(root, &[vec![9, 4, 9], vec![4, 9, 9]],
                                   &mut rng, &mut owners).unwrap();
        assert_eq!(children.len(), 2);
        // key 4 comes first.
        assert_eq!(arena[children[0]].circuits[0].members(), &[1]);
        assert_eq!(arena[children[0]].circuits[1].members(), &[0]);
        assert!(arena[children[0]].is_matched());
        assert_eq!(arena[children[1]].sizes, vec![2, 2]);
        assert!(arena[root].circuits.is_empty());
        assert_eq!(owners[1][0], children[0]);
        assert_eq!(owners[1][2], children[1]);
        assert_eq!(arena.leaf_descendants(root), children);
    }
}

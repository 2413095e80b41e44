//! Union-find set for merging electrically connected nodes.

/// A union-find set (disjoint set) over node indices.
///
/// Nodes do not need to be added explicitly: touching an index
/// grows the set with singleton nodes up to it.
///
/// Paths are compressed on every lookup. There is no union by
/// rank, since the sets we merge (nets through a hierarchy) stay
/// shallow.
#[derive(Debug, Clone, Default)]
pub struct DisjointSet {
    fa: Vec<usize>,
}

impl DisjointSet {
    /// Create a disjoint set with certain pre-allocated space.
    pub fn with_capacity(c: usize) -> DisjointSet {
        DisjointSet { fa: Vec::with_capacity(c) }
    }

    /// Number of nodes touched so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.fa.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fa.is_empty()
    }

    /// Append `n` fresh singleton nodes and return the first index.
    pub fn extend(&mut self, n: usize) -> usize {
        let base = self.fa.len();
        self.fa.extend(base..base + n);
        base
    }

    /// Find the current group leader of a node.
    pub fn find(&mut self, mut u: usize) -> usize {
        if self.fa.len() <= u {
            self.fa.extend(self.fa.len()..=u);
        }
        let mut s = u;
        while self.fa[s] != s {
            s = self.fa[s];
        }
        while self.fa[u] != s {
            let t = self.fa[u];
            self.fa[u] = s;
            u = t;
        }
        s
    }

    /// Join (merge) two sets.
    pub fn merge(&mut self, a: usize, b: usize) {
        let (a, b) = (self.find(a), self.find(b));
        self.fa[a] = b;
    }

    /// true if the two nodes are in the same set.
    #[inline]
    pub fn same(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }

    /// Finalize and output the number of sets and the set index of
    /// every node among the first `num_nodes`. Set indices follow
    /// the order of each set's smallest node.
    ///
    /// This consumes the whole disjoint set to warn the user that it
    /// is an expensive operation.
    pub fn finalize(mut self, num_nodes: usize) -> (usize, Vec<usize>) {
        if self.fa.len() < num_nodes {
            self.fa.extend(self.fa.len()..num_nodes);
        }
        let mut set_indices = vec![usize::MAX; num_nodes];
        let mut leader_set = vec![usize::MAX; self.fa.len()];
        let mut num_sets = 0;
        for i in 0..num_nodes {
            let l = self.find(i);
            if leader_set[l] == usize::MAX {
                leader_set[l] = num_sets;
                num_sets += 1;
            }
            set_indices[i] = leader_set[l];
        }
        (num_sets, set_indices)
    }
}

#[test]
fn test_disjoint_set() {
    let mut ds = DisjointSet::default();
    ds.merge(3, 1);
    ds.merge(4, 5);
    ds.merge(1, 5);
    assert!(ds.same(3, 4));
    assert!(!ds.same(0, 3));
    let (n, sets) = ds.finalize(7);
    assert_eq!(n, 4);
    assert_eq!(sets, vec![0, 1, 2, 1, 1, 1, 3]);
}

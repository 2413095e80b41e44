//! Compressed sparse row (CSR) adjacency.

/// A one-layer CSR: a list of sets, each a slice of item indices.
#[derive(Debug, Default, Clone)]
pub struct VecCSR {
    /// start of each set in [VecCSR::items], with one extra
    /// sentinel at the end.
    pub start: Vec<usize>,
    /// flattened items, grouped by set.
    pub items: Vec<usize>,
}

impl VecCSR {
    /// Build CSR from the set index of every item. Items with set
    /// index `usize::MAX` belong to no set and are left out.
    /// Items keep their relative order within a set.
    pub fn from(num_sets: usize, inset: &[usize]) -> VecCSR {
        let mut start: Vec<usize> = vec![0; num_sets + 1];
        for &s in inset {
            if s != usize::MAX {
                start[s + 1] += 1;
            }
        }
        for i in 1..num_sets + 1 {
            start[i] += start[i - 1];
        }
        let mut fill = start.clone();
        let mut items: Vec<usize> = vec![0; start[num_sets]];
        for (i, &s) in inset.iter().enumerate() {
            if s != usize::MAX {
                items[fill[s]] = i;
                fill[s] += 1;
            }
        }
        VecCSR { start, items }
    }

    #[inline]
    pub fn num_sets(&self) -> usize {
        self.start.len().saturating_sub(1)
    }

    /// Convenient method to get an iterator of set items.
    #[inline]
    pub fn iter_set(&self, set_id: usize) -> impl Iterator<Item = usize> + '_ {
        self.items[self.start[set_id]..self.start[set_id + 1]].iter().copied()
    }

    /// Get the size of a set.
    #[inline]
    pub fn len(&self, set_id: usize) -> usize {
        self.start[set_id + 1] - self.start[set_id]
    }
}

#[test]
fn test_csr_from_inset() {
    let csr = VecCSR::from(3, &[2, 0, usize::MAX, 2, 0]);
    assert_eq!(csr.num_sets(), 3);
    assert_eq!(csr.iter_set(0).collect::<Vec<_>>(), vec![1, 4]);
    assert_eq!(csr.len(1), 0);
    assert_eq!(csr.iter_set(2).collect::<Vec<_>>(), vec![0, 3]);
}

//! Comparison options.
//!
//! The options are read once when a comparison starts and never
//! change during it. Every run gets its own copy.

use serde::{Deserialize, Serialize};

/// Which kind of comparison to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NccOperation {
    /// Flatten the top cells and compare them once.
    FlatTopCells,
    /// Compare every cell group bottom-up, each one flattened.
    FlatEachCell,
    /// Compare every cell group bottom-up, replacing cells that
    /// already matched by black-box subcircuits.
    HierEachCell,
}

/// Options recognized by the comparison engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NccOptions {
    /// comparison mode.
    pub operation: NccOperation,
    /// compare transistor and resistor sizes of matched parts.
    pub check_sizes: bool,
    /// sizes within this absolute difference are equal.
    pub absolute_size_tolerance: f64,
    /// sizes within this fraction of the larger one are equal.
    pub relative_size_tolerance: f64,
    /// stop a hierarchical walk at the first cell group that fails.
    pub halt_after_first_mismatch: bool,
    /// verbosity: 0 is quiet, 1 reports stages and mismatches,
    /// 2 and above trace every pass.
    pub how_much_status: u32,
    pub max_mismatched_equiv_recs_to_print: usize,
    pub max_matched_equiv_recs_to_print: usize,
    pub max_equiv_rec_members_to_print: usize,
    /// each export name forms its own port. When false, all the
    /// exports on one network share a port and match if any name
    /// matches.
    pub one_name_per_port: bool,
    /// keep the body terminal of 4-terminal transistors.
    pub check_body: bool,
    /// upper bound of hash-code partitioning passes. Running out
    /// is reported as a mismatch.
    pub max_hash_passes: usize,
    /// seed of the generator that hands out class codes.
    pub random_seed: u64,
}

impl Default for NccOptions {
    fn default() -> NccOptions {
        NccOptions {
            operation: NccOperation::HierEachCell,
            check_sizes: false,
            absolute_size_tolerance: 0.0,
            relative_size_tolerance: 0.0,
            halt_after_first_mismatch: true,
            how_much_status: 0,
            max_mismatched_equiv_recs_to_print: 10,
            max_matched_equiv_recs_to_print: 0,
            max_equiv_rec_members_to_print: 10,
            one_name_per_port: true,
            check_body: false,
            max_hash_passes: 1000,
            random_seed: 204,
        }
    }
}

impl NccOptions {
    /// Decide whether two sizes agree. They do if they are within
    /// either the absolute or the relative tolerance.
    pub fn sizes_match(&self, a: f64, b: f64) -> bool {
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let abs_err = hi - lo;
        if abs_err <= self.absolute_size_tolerance {
            return true
        }
        let scale = hi.abs().max(lo.abs());
        scale > 0.0 && abs_err / scale <= self.relative_size_tolerance
    }
}

#[test]
fn test_sizes_match() {
    let mut opt = NccOptions::default();
    assert!(opt.sizes_match(2.0, 2.0));
    assert!(!opt.sizes_match(2.0, 2.1));
    opt.relative_size_tolerance = 0.05;
    assert!(opt.sizes_match(2.0, 2.1));
    assert!(!opt.sizes_match(2.0, 2.5));
    opt.absolute_size_tolerance = 0.5;
    assert!(opt.sizes_match(2.0, 2.5));
}

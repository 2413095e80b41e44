use ncc::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn flat_options() -> NccOptions {
    NccOptions {
        operation: NccOperation::FlatTopCells,
        ..Default::default()
    }
}

fn compare(lib: &Library, a: CellId, b: CellId, options: &NccOptions) -> NccResult {
    NccEngine::compare(
        lib, &[NccRoot::new(a), NccRoot::new(b)], None,
        options, Arc::new(NeverAbort)
    ).unwrap()
}

/// `n` buffers connected in a ring.
fn buffer_ring(lib: &mut Library, name: &str, n: usize, view: CellView) -> CellId {
    let mut b = CellBuilder::new(name, view);
    for i in 0..n {
        let a = format!("r{}", i);
        let y = format!("r{}", (i + 1) % n);
        b.primitive(&format!("b{}", i), "buf", &[("a", a.as_str()), ("y", y.as_str())]);
    }
    lib.add_cell(b.finish()).unwrap()
}

/// `n` buffers in a chain with unexported internal nets.
fn buffer_chain(lib: &mut Library, name: &str, n: usize) -> CellId {
    let mut b = CellBuilder::new(name, CellView::Layout);
    for i in 0..n {
        let (a, y) = (format!("n{}", i), format!("n{}", i + 1));
        b.primitive(&format!("b{}", i), "buf", &[("a", a.as_str()), ("y", y.as_str())]);
    }
    lib.add_cell(b.finish()).unwrap()
}

/// A two-input NAND gate. `mid` names the net inside the pull-down
/// stack, and `reversed` lists the devices in the opposite order.
fn nand2(lib: &mut Library, name: &str, view: CellView, mid: &str, reversed: bool) -> CellId {
    let mut b = CellBuilder::new(name, view);
    b.export("a", PortCharacteristic::Input);
    b.export("b", PortCharacteristic::Input);
    b.export("y", PortCharacteristic::Output);
    b.global("vdd", "vdd", PortCharacteristic::Power);
    b.global("gnd", "gnd", PortCharacteristic::Ground);
    let mut devices = vec![
        ("mp_a", MosPolarity::P, ["vdd", "a", "y"], 2.0),
        ("mp_b", MosPolarity::P, ["y", "b", "vdd"], 2.0),
        ("mn_a", MosPolarity::N, ["y", "a", mid], 1.0),
        ("mn_b", MosPolarity::N, [mid, "b", "gnd"], 1.0),
    ];
    if reversed {
        devices.reverse();
    }
    for (dev, polarity, sgd, w) in devices {
        b.mos(dev, polarity, sgd, w, 0.1);
    }
    lib.add_cell(b.finish()).unwrap()
}

fn nor2(lib: &mut Library, name: &str) -> CellId {
    let mut b = CellBuilder::new(name, CellView::Layout);
    b.export("a", PortCharacteristic::Input);
    b.export("b", PortCharacteristic::Input);
    b.export("y", PortCharacteristic::Output);
    b.global("vdd", "vdd", PortCharacteristic::Power);
    b.global("gnd", "gnd", PortCharacteristic::Ground);
    b.mos("mp_a", MosPolarity::P, ["vdd", "a", "mid"], 2.0, 0.1);
    b.mos("mp_b", MosPolarity::P, ["mid", "b", "y"], 2.0, 0.1);
    b.mos("mn_a", MosPolarity::N, ["y", "a", "gnd"], 1.0, 0.1);
    b.mos("mn_b", MosPolarity::N, ["gnd", "b", "y"], 1.0, 0.1);
    lib.add_cell(b.finish()).unwrap()
}

fn leaf_sizes(globals: &NccGlobals, kind: NetObjKind) -> Vec<Vec<usize>> {
    globals.leaves(kind).into_iter()
        .map(|r| globals.arena()[r].sizes.clone())
        .collect()
}

#[test]
fn test_identical_rings_match() {
    clilog::init_stdout_simple_trace();
    let mut lib = Library::new();
    let a = buffer_ring(&mut lib, "ring_a", 3, CellView::Schematic);
    let b = buffer_ring(&mut lib, "ring_b", 3, CellView::Layout);
    let r = compare(&lib, a, b, &flat_options());
    assert_eq!(r.verdict(), Verdict::Match);
    assert!(r.hash_converged);

    let g = r.globals.as_ref().unwrap();
    assert_eq!(g.counters.guesses, 1);
    let leaves = g.leaves(NetObjKind::Part);
    assert_eq!(leaves.len(), 3);
    for r in leaves {
        let rec = &g.arena()[r];
        assert_eq!(rec.sizes, vec![1, 1]);
        assert!(rec.is_matched());
    }
    assert!(g.equivalent_nets()[1].iter().all(|w| w.is_some()));
}

#[test]
fn test_two_rings_do_not_match_one_ring() {
    clilog::init_stdout_simple_trace();
    let mut lib = Library::new();
    let mut b = CellBuilder::new("two_rings", CellView::Schematic);
    for (ring, prefix) in ["r", "s"].iter().enumerate() {
        for i in 0..3 {
            let a = format!("{}{}", prefix, i);
            let y = format!("{}{}", prefix, (i + 1) % 3);
            b.primitive(&format!("b{}", ring * 3 + i), "buf",
                        &[("a", a.as_str()), ("y", y.as_str())]);
        }
    }
    let two = lib.add_cell(b.finish()).unwrap();
    let one = buffer_ring(&mut lib, "one_ring", 6, CellView::Layout);

    // every part and every wire looks alike until a pair is guessed.
    for (a, b) in [(two, one), (one, two)] {
        let r = compare(&lib, a, b, &flat_options());
        assert_eq!(r.verdict(), Verdict::Mismatch);
        assert!(r.local_partition_ok);
        assert!(!r.topology_match);
        let g = r.globals.as_ref().unwrap();
        assert!(g.counters.guesses >= 1);
        assert!(g.num_mismatched(NetObjKind::Part) + g.num_mismatched(NetObjKind::Wire) > 0);
    }
}

#[test]
fn test_guessed_pair_follows_sizes() {
    clilog::init_stdout_simple_trace();
    let mut lib = Library::new();
    let mut cells = Vec::new();
    for (name, widths) in [("res_a", [1.0, 2.0]), ("res_b", [2.0, 1.0])] {
        let mut b = CellBuilder::new(name, CellView::Layout);
        b.resistor("r0", ["n0", "n1"], widths[0], 4.0);
        b.resistor("r1", ["n2", "n3"], widths[1], 4.0);
        cells.push(lib.add_cell(b.finish()).unwrap());
    }
    let options = NccOptions { check_sizes: true, ..flat_options() };
    let r = compare(&lib, cells[0], cells[1], &options);
    assert_eq!(r.verdict(), Verdict::Match);
    assert!(r.sizes_match);
    let g = r.globals.as_ref().unwrap();
    // one for the resistors, then one for the ends of each.
    assert_eq!(g.counters.guesses, 3);
    assert_eq!(g.equivalent_parts()[1], vec![Some(1), Some(0)]);
}

#[test]
fn test_part_count_mismatch_stops_early() {
    clilog::init_stdout_simple_trace();
    let mut lib = Library::new();
    let a = buffer_ring(&mut lib, "ring3", 3, CellView::Schematic);
    let b = buffer_ring(&mut lib, "ring2", 2, CellView::Layout);
    let r = compare(&lib, a, b, &flat_options());
    assert_eq!(r.verdict(), Verdict::Mismatch);
    assert!(!r.local_partition_ok);
    assert!(!r.hash_converged);
    assert!(!r.aborted);
    let g = r.globals.as_ref().unwrap();
    assert_eq!(g.counters.hash_passes, 0);
    assert_eq!(g.stage(), Stage::LocallyPartitioned);
    assert!(g.num_mismatched(NetObjKind::Part) > 0);
}

#[test]
fn test_parallel_transistors_match_wide_one() {
    clilog::init_stdout_simple_trace();
    let mut lib = Library::new();
    let mut b = CellBuilder::new("inv_sch", CellView::Schematic);
    b.export("a", PortCharacteristic::Input);
    b.export("y", PortCharacteristic::Output);
    b.global("vdd", "vdd", PortCharacteristic::Power);
    b.global("gnd", "gnd", PortCharacteristic::Ground);
    b.mos("mp", MosPolarity::P, ["vdd", "a", "y"], 2.0, 0.1);
    b.mos("mn", MosPolarity::N, ["gnd", "a", "y"], 2.0, 0.1);
    let sch = lib.add_cell(b.finish()).unwrap();

    let mut b = CellBuilder::new("inv_lay", CellView::Layout);
    b.export("a", PortCharacteristic::Input);
    b.export("y", PortCharacteristic::Output);
    b.global("vdd", "vdd", PortCharacteristic::Power);
    b.global("gnd", "gnd", PortCharacteristic::Ground);
    b.mos("mp", MosPolarity::P, ["vdd", "a", "y"], 2.0, 0.1);
    b.mos("mn_0", MosPolarity::N, ["gnd", "a", "y"], 1.0, 0.1);
    b.mos("mn_1", MosPolarity::N, ["y", "a", "gnd"], 1.0, 0.1);
    let lay = lib.add_cell(b.finish()).unwrap();

    let options = NccOptions { check_sizes: true, ..flat_options() };
    let r = compare(&lib, sch, lay, &options);
    assert_eq!(r.verdict(), Verdict::Match);
    assert!(r.sizes_match);
    assert_eq!(r.counts[0].parts, 2);
    assert_eq!(r.counts[1].parts, 2);
    let g = r.globals.as_ref().unwrap();
    assert_eq!(g.counters.parallel_merged, 1);
    for sizes in leaf_sizes(g, NetObjKind::Part) {
        assert_eq!(sizes, vec![1, 1]);
    }
}

#[test]
fn test_size_mismatch_reported_separately() {
    clilog::init_stdout_simple_trace();
    let mut lib = Library::new();
    let mut cells = Vec::new();
    for (name, w) in [("inv_a", 1.0), ("inv_b", 1.5)] {
        let mut b = CellBuilder::new(name, CellView::Layout);
        b.export("a", PortCharacteristic::Input);
        b.export("y", PortCharacteristic::Output);
        b.global("vdd", "vdd", PortCharacteristic::Power);
        b.global("gnd", "gnd", PortCharacteristic::Ground);
        b.mos("mp", MosPolarity::P, ["vdd", "a", "y"], 2.0, 0.1);
        b.mos("mn", MosPolarity::N, ["gnd", "a", "y"], w, 0.1);
        cells.push(lib.add_cell(b.finish()).unwrap());
    }

    let r = compare(&lib, cells[0], cells[1], &flat_options());
    assert_eq!(r.verdict(), Verdict::Match);

    let options = NccOptions { check_sizes: true, ..flat_options() };
    let r = compare(&lib, cells[0], cells[1], &options);
    assert_eq!(r.verdict(), Verdict::Mismatch);
    assert!(r.topology_match);
    assert!(!r.sizes_match);
    assert_eq!(r.size_mismatches.len(), 1);
    assert_eq!(r.size_mismatches[0].param, SizeParam::Width);

    let options = NccOptions { relative_size_tolerance: 0.5, ..options };
    let r = compare(&lib, cells[0], cells[1], &options);
    assert_eq!(r.verdict(), Verdict::Match);
}

#[test]
fn test_export_name_and_topology_reported_separately() {
    clilog::init_stdout_simple_trace();
    let mut lib = Library::new();
    let mut b = CellBuilder::new("bufs_sch", CellView::Schematic);
    b.export("in", PortCharacteristic::Input);
    b.export("out", PortCharacteristic::Output);
    b.export("VDD", PortCharacteristic::Unknown);
    b.primitive("b0", "buf", &[("a", "in"), ("y", "VDD")]);
    b.primitive("b1", "buf", &[("a", "VDD"), ("y", "out")]);
    let a = lib.add_cell(b.finish()).unwrap();

    let mut b = CellBuilder::new("bufs_lay", CellView::Layout);
    b.export("in", PortCharacteristic::Input);
    b.export("out", PortCharacteristic::Output);
    b.primitive("b0", "buf", &[("a", "in"), ("y", "net47")]);
    b.primitive("b1", "buf", &[("a", "net47"), ("y", "out")]);
    let b = lib.add_cell(b.finish()).unwrap();

    let r = compare(&lib, a, b, &flat_options());
    assert_eq!(r.verdict(), Verdict::Mismatch);
    assert!(!r.export_names_match);
    assert!(r.topology_match);
    assert!(r.export_topology_match);
    assert!(r.export_mismatches.iter().any(|m| matches!(
        m, ExportMismatch::NoMatch { design: 0, names, .. } if names[0].as_str() == "VDD")));
    assert!(r.suggestions.iter().any(|s| s.contains("net47")), "{:?}", r.suggestions);
}

#[test]
fn test_export_on_wrong_net() {
    clilog::init_stdout_simple_trace();
    let mut lib = Library::new();
    let mut cells = Vec::new();
    for (name, tap) in [("chain_a", "n1"), ("chain_b", "n2")] {
        let mut b = CellBuilder::new(name, CellView::Layout);
        b.export("in", PortCharacteristic::Input);
        b.export_net("tap", tap, PortCharacteristic::Output);
        b.primitive("b0", "buf", &[("a", "in"), ("y", "n1")]);
        b.primitive("b1", "buf", &[("a", "n1"), ("y", "n2")]);
        b.primitive("b2", "buf", &[("a", "n2"), ("y", "n3")]);
        cells.push(lib.add_cell(b.finish()).unwrap());
    }
    let r = compare(&lib, cells[0], cells[1], &flat_options());
    assert_eq!(r.verdict(), Verdict::Mismatch);
    assert!(r.export_names_match);
    assert!(!r.export_topology_match);
    assert!(r.export_mismatches.iter().any(|m| matches!(
        m, ExportMismatch::Topology { reference_names, .. } if reference_names[0].as_str() == "tap")));
}

#[test]
fn test_abort_after_first_pass_is_incomplete() {
    clilog::init_stdout_simple_trace();
    let mut lib = Library::new();
    let a = buffer_chain(&mut lib, "chain_a", 6);
    let b = buffer_chain(&mut lib, "chain_b", 6);

    // polls: one per flattened root, three between stages, then the
    // start and the middle of the first hash pass. The next poll
    // opens the second pass.
    let polls = Arc::new(AtomicUsize::new(0));
    let counter = polls.clone();
    let aborter = move || counter.fetch_add(1, Ordering::Relaxed) + 1 >= 8;
    let r = NccEngine::compare(
        &lib, &[NccRoot::new(a), NccRoot::new(b)], None,
        &flat_options(), Arc::new(aborter)
    ).unwrap();
    assert!(r.aborted);
    assert_eq!(r.verdict(), Verdict::Incomplete);
    assert!(!r.hash_converged);
    let g = r.globals.as_ref().unwrap();
    assert_eq!(g.counters.hash_passes, 1);
    assert_eq!(polls.load(Ordering::Relaxed), 8);
}

#[test]
fn test_cancel_before_start() {
    clilog::init_stdout_simple_trace();
    let mut lib = Library::new();
    let a = buffer_ring(&mut lib, "ring_a", 3, CellView::Schematic);
    let b = buffer_ring(&mut lib, "ring_b", 3, CellView::Layout);
    let token = CancelToken::new();
    token.cancel();
    let r = NccEngine::compare(
        &lib, &[NccRoot::new(a), NccRoot::new(b)], None,
        &flat_options(), Arc::new(token)
    ).unwrap();
    assert_eq!(r.verdict(), Verdict::Incomplete);
}

#[test]
fn test_pass_budget_exhausted() {
    clilog::init_stdout_simple_trace();
    let mut lib = Library::new();
    let a = buffer_chain(&mut lib, "chain_a", 8);
    let b = buffer_chain(&mut lib, "chain_b", 8);
    let options = NccOptions { max_hash_passes: 1, ..flat_options() };
    let r = compare(&lib, a, b, &options);
    assert!(!r.hash_converged);
    assert!(!r.aborted);
    assert_eq!(r.verdict(), Verdict::Mismatch);

    let r = compare(&lib, a, b, &flat_options());
    assert_eq!(r.verdict(), Verdict::Match);
}

#[test]
fn test_nand_matches_reordered_copy() {
    clilog::init_stdout_simple_trace();
    let mut lib = Library::new();
    let a = nand2(&mut lib, "nand_sch", CellView::Schematic, "mid", false);
    let b = nand2(&mut lib, "nand_lay", CellView::Layout, "net47", true);
    let r = compare(&lib, a, b, &flat_options());
    assert_eq!(r.verdict(), Verdict::Match);
    let g = r.globals.as_ref().unwrap();
    assert_eq!(g.counters.series_merged, 2);

    // every net is pinned down one to one.
    let nets = g.equivalent_nets();
    for (w, wire) in g.netlist(0).wires.iter().enumerate() {
        let other = nets[1][w].expect("wire without equivalent");
        assert_eq!(g.netlist(1).wires[other].name, wire.name);
    }
    let parts = g.equivalent_parts();
    assert!(parts[1].iter().all(|p| p.is_some()));
}

#[test]
fn test_nand_does_not_match_nor() {
    clilog::init_stdout_simple_trace();
    let mut lib = Library::new();
    let a = nand2(&mut lib, "nand", CellView::Schematic, "mid", false);
    let b = nor2(&mut lib, "nor");
    let r = compare(&lib, a, b, &flat_options());
    assert_eq!(r.verdict(), Verdict::Mismatch);
    assert!(!r.topology_match);
    assert!(r.export_names_match);
}

#[test]
fn test_reflexive() {
    clilog::init_stdout_simple_trace();
    let mut lib = Library::new();
    let a = nand2(&mut lib, "nand", CellView::Schematic, "mid", false);
    let r = compare(&lib, a, a, &flat_options());
    assert_eq!(r.verdict(), Verdict::Match);
    let ring = buffer_ring(&mut lib, "ring", 5, CellView::Layout);
    let r = compare(&lib, ring, ring, &flat_options());
    assert_eq!(r.verdict(), Verdict::Match);
}

#[test]
fn test_symmetric() {
    clilog::init_stdout_simple_trace();
    let mut lib = Library::new();
    let nand = nand2(&mut lib, "nand", CellView::Schematic, "mid", false);
    let nor = nor2(&mut lib, "nor");
    let nand_lay = nand2(&mut lib, "nand_lay", CellView::Layout, "x", true);
    for (a, b) in [(nand, nor), (nand, nand_lay)] {
        let ab = compare(&lib, a, b, &flat_options());
        let ba = compare(&lib, b, a, &flat_options());
        assert_eq!(ab.verdict(), ba.verdict());
        assert_eq!(ab.local_partition_ok, ba.local_partition_ok);
        assert_eq!(ab.export_names_match, ba.export_names_match);
        assert_eq!(ab.hash_converged, ba.hash_converged);
        assert_eq!(ab.topology_match, ba.topology_match);
        assert_eq!(ab.counts[0], ba.counts[1]);
        assert_eq!(ab.counts[1], ba.counts[0]);
    }
}

#[test]
fn test_deterministic() {
    clilog::init_stdout_simple_trace();
    let mut lib = Library::new();
    let a = buffer_chain(&mut lib, "chain_a", 7);
    let b = buffer_chain(&mut lib, "chain_b", 7);
    let r1 = compare(&lib, a, b, &flat_options());
    let r2 = compare(&lib, a, b, &flat_options());
    assert_eq!(r1.verdict(), r2.verdict());
    let (g1, g2) = (r1.globals.as_ref().unwrap(), r2.globals.as_ref().unwrap());
    for kind in NetObjKind::ALL {
        assert_eq!(leaf_sizes(g1, kind), leaf_sizes(g2, kind));
    }
    assert_eq!(g1.counters.hash_passes, g2.counters.hash_passes);
}

#[test]
fn test_record_sizes_consistent() {
    clilog::init_stdout_simple_trace();
    let mut lib = Library::new();
    let a = nand2(&mut lib, "nand", CellView::Schematic, "mid", false);
    let b = nor2(&mut lib, "nor");
    let c = nand2(&mut lib, "nand_lay", CellView::Layout, "m", true);
    for other in [b, c] {
        let r = compare(&lib, a, other, &flat_options());
        let g = r.globals.as_ref().unwrap();
        for (_, rec) in g.arena().iter() {
            let equal = rec.sizes.iter().all(|&s| s == rec.sizes[0]);
            assert!(equal || rec.is_mismatched(), "{:?}", rec.sizes);
            if rec.is_leaf() && rec.is_matched() {
                assert!(equal && rec.sizes[0] > 0);
            }
        }
        assert_eq!(strategy::check(g).unwrap(), g.num_mismatched(NetObjKind::Part) +
                   g.num_mismatched(NetObjKind::Wire) + g.num_mismatched(NetObjKind::Port));
    }
}

#[test]
fn test_three_designs() {
    clilog::init_stdout_simple_trace();
    let mut lib = Library::new();
    let a = nand2(&mut lib, "nand_a", CellView::Schematic, "mid", false);
    let b = nand2(&mut lib, "nand_b", CellView::Layout, "n1", true);
    let c = nand2(&mut lib, "nand_c", CellView::Layout, "n2", false);
    let roots = [NccRoot::new(a), NccRoot::new(b), NccRoot::new(c)];
    let r = NccEngine::compare(&lib, &roots, None, &flat_options(), Arc::new(NeverAbort))
        .unwrap();
    assert_eq!(r.verdict(), Verdict::Match);
    assert_eq!(r.counts.len(), 3);
}

#[test]
fn test_concurrent_runs() {
    clilog::init_stdout_simple_trace();
    let mut lib = Library::new();
    let a = nand2(&mut lib, "nand_sch", CellView::Schematic, "mid", false);
    let b = nand2(&mut lib, "nand_lay", CellView::Layout, "net47", true);
    let c = nor2(&mut lib, "nor");
    let lib = Arc::new(lib);
    let handles: Vec<_> = (0..4).map(|i| {
        let lib = lib.clone();
        std::thread::spawn(move || {
            let other = if i % 2 == 0 { b } else { c };
            compare(&lib, a, other, &flat_options()).verdict()
        })
    }).collect();
    for (i, h) in handles.into_iter().enumerate() {
        let expected = if i % 2 == 0 { Verdict::Match } else { Verdict::Mismatch };
        assert_eq!(h.join().unwrap(), expected);
    }
}

#[test]
fn test_leaf_records_need_local_partitioning() {
    clilog::init_stdout_simple_trace();
    let mut lib = Library::new();
    let a = buffer_ring(&mut lib, "ring_a", 3, CellView::Schematic);
    let b = buffer_ring(&mut lib, "ring_b", 3, CellView::Layout);
    let options = flat_options();
    let netlists = [a, b].iter()
        .map(|&c| NccNetlist::build(&lib, &NccRoot::new(c), None, &options, &NeverAbort).unwrap())
        .collect();
    let mut g = NccGlobals::new(netlists, &options, Arc::new(NeverAbort)).unwrap();
    assert!(matches!(g.leaf_records(NetObjKind::Part), Err(NccError::Invariant(_))));
    strategy::serial_parallel(&mut g).unwrap();
    assert!(g.leaf_records(NetObjKind::Part).is_err());
    // stages run in order only.
    assert!(strategy::hash_partition(&mut g).is_err());
    assert!(strategy::local_partition(&mut g).unwrap());
    assert_eq!(g.leaf_records(NetObjKind::Part).unwrap().not_matched.len(), 1);
    assert_eq!(strategy::hash_partition(&mut g).unwrap(), strategy::HashOutcome::Converged);
    let lists = g.leaf_records(NetObjKind::Part).unwrap();
    assert_eq!(lists.matched.len(), 3);
    assert!(lists.not_matched.is_empty());
}

#[test]
fn test_single_design_rejected() {
    clilog::init_stdout_simple_trace();
    let mut lib = Library::new();
    let a = buffer_ring(&mut lib, "ring", 3, CellView::Schematic);
    let r = NccEngine::compare(&lib, &[NccRoot::new(a)], None,
                               &flat_options(), Arc::new(NeverAbort));
    assert!(matches!(r, Err(NccError::InvalidInput(_))));
}

#[test]
fn test_empty_cells_match() {
    clilog::init_stdout_simple_trace();
    let mut lib = Library::new();
    let a = lib.add_cell(CellBuilder::new("empty_a", CellView::Schematic).finish()).unwrap();
    let b = lib.add_cell(CellBuilder::new("empty_b", CellView::Layout).finish()).unwrap();
    assert_eq!(compare(&lib, a, b, &flat_options()).verdict(), Verdict::Match);
}

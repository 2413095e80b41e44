use ncc::*;
use std::sync::Arc;

fn options(operation: NccOperation) -> NccOptions {
    NccOptions { operation, ..Default::default() }
}

/// An inverter in group "inv". Without `pull_up` the p-device is
/// missing.
fn inverter(lib: &mut Library, name: &str, view: CellView,
            ann: CellAnnotations, pull_up: bool) -> CellId {
    let mut b = CellBuilder::new(name, view);
    b.group("inv").annotations(ann);
    b.export("a", PortCharacteristic::Input);
    b.export("y", PortCharacteristic::Output);
    b.global("vdd", "vdd", PortCharacteristic::Power);
    b.global("gnd", "gnd", PortCharacteristic::Ground);
    if pull_up {
        b.mos("mp", MosPolarity::P, ["vdd", "a", "y"], 2.0, 0.1);
    }
    b.mos("mn", MosPolarity::N, ["gnd", "a", "y"], 1.0, 0.1);
    lib.add_cell(b.finish()).unwrap()
}

/// A chain of `n` instances of `inv` from `in` to `out`.
fn chain(lib: &mut Library, name: &str, view: CellView, inv: CellId, n: usize) -> CellId {
    let mut b = CellBuilder::new(name, view);
    b.export("in", PortCharacteristic::Input);
    b.export("out", PortCharacteristic::Output);
    let net = |i: usize| match i {
        0 => "in".to_string(),
        i if i == n => "out".to_string(),
        i => format!("n{}", i),
    };
    for i in 0..n {
        let (a, y) = (net(i), net(i + 1));
        b.instance(&format!("x{}", i), inv, &[a.as_str(), y.as_str()]);
    }
    lib.add_cell(b.finish()).unwrap()
}

struct Designs {
    lib: Library,
    roots: [NccRoot; 2],
}

fn designs(sch_len: usize, lay_len: usize,
           sch_ann: CellAnnotations, lay_ann: CellAnnotations,
           lay_pull_up: bool) -> Designs {
    let mut lib = Library::new();
    let inv_sch = inverter(&mut lib, "inv_sch", CellView::Schematic, sch_ann, true);
    let inv_lay = inverter(&mut lib, "inv_lay", CellView::Layout, lay_ann, lay_pull_up);
    let top_sch = chain(&mut lib, "top_sch", CellView::Schematic, inv_sch, sch_len);
    let top_lay = chain(&mut lib, "top_lay", CellView::Layout, inv_lay, lay_len);
    Designs { lib, roots: [NccRoot::new(top_sch), NccRoot::new(top_lay)] }
}

fn bottom_up(d: &Designs, options: &NccOptions) -> BottomUpResult {
    match run(&d.lib, &d.roots, options, Arc::new(NeverAbort)).unwrap() {
        NccOutcome::BottomUp(r) => r,
        NccOutcome::Flat(_) => panic!("expected a bottom-up result"),
    }
}

fn top_parts(r: &BottomUpResult) -> &[Part] {
    let top = r.group("top_sch").expect("top group not compared");
    &top.results[0].globals.as_ref().unwrap().netlist(0).parts
}

#[test]
fn test_hierarchical_agrees_with_flat() {
    clilog::init_stdout_simple_trace();
    for n in [1, 3] {
        let d = designs(n, n, Default::default(), Default::default(), true);
        let r = bottom_up(&d, &options(NccOperation::HierEachCell));
        assert_eq!(r.verdict(), Verdict::Match);
        assert_eq!(r.comparisons.len(), 2);
        assert!(r.group("inv").unwrap().matched());
        let parts = top_parts(&r);
        assert_eq!(parts.len(), n);
        assert!(parts.iter().all(|p| matches!(p.kind, PartKind::Subcircuit { .. })));

        let flat = run(&d.lib, &d.roots, &options(NccOperation::FlatTopCells),
                       Arc::new(NeverAbort)).unwrap();
        assert_eq!(flat.verdict(), Verdict::Match);
        let flat_each = bottom_up(&d, &options(NccOperation::FlatEachCell));
        assert_eq!(flat_each.verdict(), Verdict::Match);
        assert_eq!(top_parts(&flat_each).len(), 2 * n);
    }
}

#[test]
fn test_hierarchical_parent_mismatch() {
    clilog::init_stdout_simple_trace();
    let d = designs(2, 3, Default::default(), Default::default(), true);
    let r = bottom_up(&d, &options(NccOperation::HierEachCell));
    assert_eq!(r.verdict(), Verdict::Mismatch);
    assert!(r.group("inv").unwrap().matched());
    assert_eq!(r.first_mismatch().unwrap().group, "top_sch");

    let flat = run(&d.lib, &d.roots, &options(NccOperation::FlatTopCells),
                   Arc::new(NeverAbort)).unwrap();
    assert_eq!(flat.verdict(), Verdict::Mismatch);
}

#[test]
fn test_halt_after_first_mismatch() {
    clilog::init_stdout_simple_trace();
    let d = designs(2, 2, Default::default(), Default::default(), false);
    let r = bottom_up(&d, &options(NccOperation::HierEachCell));
    assert!(r.halted);
    assert_eq!(r.comparisons.len(), 1);
    assert_eq!(r.first_mismatch().unwrap().group, "inv");

    let opts = NccOptions {
        halt_after_first_mismatch: false,
        ..options(NccOperation::HierEachCell)
    };
    let r = bottom_up(&d, &opts);
    assert!(!r.halted);
    assert_eq!(r.comparisons.len(), 2);
    assert_eq!(r.verdict(), Verdict::Mismatch);
    // the mismatched inverters are expanded in the parent.
    assert!(top_parts(&r).iter().all(|p| matches!(p.kind, PartKind::Mos { .. })));
}

#[test]
fn test_skip_annotation() {
    clilog::init_stdout_simple_trace();
    let ann = CellAnnotations::parse("skipNCC analog cell").unwrap();
    let d = designs(2, 2, Default::default(), ann, true);
    let r = bottom_up(&d, &options(NccOperation::HierEachCell));
    assert_eq!(r.verdict(), Verdict::Match);
    assert_eq!(r.skipped.len(), 1);
    assert_eq!(r.skipped[0].0, "inv");
    assert!(r.group("inv").is_none());
    assert!(top_parts(&r).iter().all(|p| matches!(p.kind, PartKind::Mos { .. })));
}

#[test]
fn test_not_subcircuit_annotation() {
    clilog::init_stdout_simple_trace();
    let ann = CellAnnotations::parse("notSubcircuit").unwrap();
    let d = designs(2, 2, ann, Default::default(), true);
    let r = bottom_up(&d, &options(NccOperation::HierEachCell));
    assert_eq!(r.verdict(), Verdict::Match);
    assert!(r.group("inv").unwrap().matched());
    let parts = top_parts(&r);
    assert_eq!(parts.len(), 4);
    assert!(parts.iter().all(|p| matches!(p.kind, PartKind::Mos { .. })));
}

#[test]
fn test_join_group() {
    clilog::init_stdout_simple_trace();
    let mut lib = Library::new();
    let inv_sch = inverter(&mut lib, "inv_sch", CellView::Schematic, Default::default(), true);
    let mut b = CellBuilder::new("not_gate", CellView::Layout);
    b.annotations(CellAnnotations::parse("joinGroup inv_sch").unwrap());
    b.export("a", PortCharacteristic::Input);
    b.export("y", PortCharacteristic::Output);
    b.global("vdd", "vdd", PortCharacteristic::Power);
    b.global("gnd", "gnd", PortCharacteristic::Ground);
    b.mos("p0", MosPolarity::P, ["y", "a", "vdd"], 2.0, 0.1);
    b.mos("n0", MosPolarity::N, ["y", "a", "gnd"], 1.0, 0.1);
    let not_gate = lib.add_cell(b.finish()).unwrap();
    let top_sch = chain(&mut lib, "top_sch", CellView::Schematic, inv_sch, 2);
    let top_lay = chain(&mut lib, "top_lay", CellView::Layout, not_gate, 2);

    let roots = [NccRoot::new(top_sch), NccRoot::new(top_lay)];
    let r = NccBottomUp::compare(&lib, &roots, &options(NccOperation::HierEachCell),
                                 Arc::new(NeverAbort), true).unwrap();
    assert_eq!(r.verdict(), Verdict::Match);
    let inv = r.group("inv").unwrap();
    assert_eq!(inv.reference, inv_sch);
    assert_eq!(inv.cells.len(), 2);
}

#[test]
fn test_cancelled_walk_is_incomplete() {
    clilog::init_stdout_simple_trace();
    let d = designs(2, 2, Default::default(), Default::default(), true);
    let token = CancelToken::new();
    token.cancel();
    let r = run(&d.lib, &d.roots, &options(NccOperation::HierEachCell),
                Arc::new(token)).unwrap();
    assert_eq!(r.verdict(), Verdict::Incomplete);
}

#[test]
fn test_subcircuit_ports_follow_reference() {
    clilog::init_stdout_simple_trace();
    let d = designs(1, 1, Default::default(), Default::default(), true);
    let inv_sch = d.lib.find_cell("inv_sch").unwrap();
    let inv_lay = d.lib.find_cell("inv_lay").unwrap();
    let mut hier = HierarchyInfo::new();
    hier.begin_next_compare_list("inv");
    let r = NccEngine::compare(
        &d.lib, &[NccRoot::new(inv_sch), NccRoot::new(inv_lay)], Some(&mut hier),
        &options(NccOperation::FlatTopCells), Arc::new(NeverAbort)
    ).unwrap();
    assert!(r.matched());
    let a = hier.subcircuit(inv_sch).unwrap();
    let b = hier.subcircuit(inv_lay).unwrap();
    assert_eq!(a.id, b.id);
    assert_eq!(a.num_ports, 4);
    assert_eq!(a.export_ports, b.export_ports);
    assert_eq!(a.port_of("vdd"), b.port_of("vdd"));
    assert_eq!(a.global_ports.len(), 2);

    hier.purge_current_compare_list();
    assert!(hier.subcircuit(inv_sch).is_none());
}

#[test]
fn test_cell_usage() {
    clilog::init_stdout_simple_trace();
    let mut lib = Library::new();
    let leaf = lib.add_cell(CellBuilder::new("leaf", CellView::Schematic).finish()).unwrap();
    let usage = CellUsage::new(&lib, leaf).unwrap();
    assert_eq!(usage.cells_in_reverse_topological_order(), &[leaf]);
    assert!(usage.is_used(leaf));
    assert!(CellUsage::new(&lib, CellId(5)).is_err());
}

/// A cell with two exports on one net, fed by a buffer from `a`.
fn tap(lib: &mut Library, name: &str, view: CellView) -> CellId {
    let mut b = CellBuilder::new(name, view);
    b.group("tap");
    b.export("a", PortCharacteristic::Input);
    b.export_net("g1", "g", PortCharacteristic::Output);
    b.export_net("g2", "g", PortCharacteristic::Output);
    b.primitive("b", "buf", &[("a", "a"), ("y", "g")]);
    lib.add_cell(b.finish()).unwrap()
}

#[test]
fn test_exports_sharing_a_net_share_a_port() {
    clilog::init_stdout_simple_trace();
    let mut lib = Library::new();
    let tap_sch = tap(&mut lib, "tap_sch", CellView::Schematic);
    let tap_lay = tap(&mut lib, "tap_lay", CellView::Layout);

    // the schematic parent keeps g1 and g2 apart, the layout one ties
    // them. Inside the tap they are the same net either way.
    let mut tops = Vec::new();
    for (name, view, child, g2) in [("top_sch", CellView::Schematic, tap_sch, "y"),
                                    ("top_lay", CellView::Layout, tap_lay, "x")] {
        let mut b = CellBuilder::new(name, view);
        b.export("in", PortCharacteristic::Input);
        b.export("out1", PortCharacteristic::Output);
        b.export("out2", PortCharacteristic::Output);
        b.instance("t0", child, &["in", "x", g2]);
        b.primitive("b0", "buf", &[("a", "x"), ("y", "out1")]);
        b.primitive("b1", "buf", &[("a", g2), ("y", "out2")]);
        tops.push(lib.add_cell(b.finish()).unwrap());
    }
    let roots = [NccRoot::new(tops[0]), NccRoot::new(tops[1])];

    let flat = run(&lib, &roots, &options(NccOperation::FlatTopCells),
                   Arc::new(NeverAbort)).unwrap();
    assert_eq!(flat.verdict(), Verdict::Match);
    let d = Designs { lib, roots };
    let r = bottom_up(&d, &options(NccOperation::HierEachCell));
    assert_eq!(r.verdict(), flat.verdict());
    assert!(r.group("tap").unwrap().matched());
    assert!(top_parts(&r).iter().any(|p| matches!(p.kind, PartKind::Subcircuit { .. })));

    let mut hier = HierarchyInfo::new();
    hier.begin_next_compare_list("tap");
    let r = NccEngine::compare(
        &d.lib, &[NccRoot::new(tap_sch), NccRoot::new(tap_lay)], Some(&mut hier),
        &options(NccOperation::FlatTopCells), Arc::new(NeverAbort)
    ).unwrap();
    assert!(r.matched());
    let info = hier.subcircuit(tap_sch).unwrap();
    assert_eq!(info.num_ports, 2);
    assert_eq!(info.port_of("g1"), info.port_of("g2"));
    assert_eq!(info.export_ports[1], info.export_ports[2]);
}

//! Bit-level view of parsed verilog modules.

use std::collections::{HashMap, HashSet};
use compact_str::CompactString;
use either::Either;
use ncc::NccError;
use sverilogparse::*;

/// Enumerate the bit indices of an optional range. A scalar has the
/// single index `None`.
pub fn enum_in_width(
    w: Option<SVerilogRange>
) -> impl Iterator<Item = Option<isize>> {
    match w {
        None => Either::Left(Some(None).into_iter()),
        Some(r) => Either::Right(r.map(Some))
    }
}

/// The name of one bit: `a` for a scalar, `a[3]` for a vector bit.
pub fn bit_name(name: &str, idx: Option<isize>) -> CompactString {
    match idx {
        None => name.into(),
        Some(i) => compact_str::format_compact!("{}[{}]", name, i)
    }
}

/// A constant bit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logic {
    Zero,
    One,
    X,
    Z,
}

/// One bit of a wire expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprBit<'i> {
    Const(Logic),
    Var(&'i CompactString, Option<isize>)
}

/// Widths and directions of the wires and ports of one module.
#[readonly::make]
#[derive(Debug, Clone)]
pub struct ModuleMap {
    /// the range of every vector definition. Scalars are absent.
    pub def_widths: HashMap<CompactString, SVerilogRange>,
    /// the strongest declared type of every definition: a port
    /// redeclared as a wire stays a port.
    pub def_types: HashMap<CompactString, WireDefType>,
    /// the range of every vector port.
    pub port_widths: HashMap<CompactString, SVerilogRange>,
}

fn len_basic(def_widths: &HashMap<CompactString, SVerilogRange>, eb: &WirexprBasic) -> usize {
    match eb {
        WirexprBasic::Full(s) => def_widths.get(s.as_str()).map(|r| r.len()).unwrap_or(1),
        WirexprBasic::SingleBit(_, _) => 1,
        WirexprBasic::Slice(_, range) => range.len(),
        WirexprBasic::Literal(size, _, _) => *size
    }
}

fn expr_len(def_widths: &HashMap<CompactString, SVerilogRange>, expr: &Wirexpr) -> usize {
    match expr {
        Wirexpr::Basic(b) => len_basic(def_widths, b),
        Wirexpr::Concat(v) => v.iter().map(|b| len_basic(def_widths, b)).sum()
    }
}

impl ModuleMap {
    pub fn new(name: &str, m: &SVerilogModule) -> Result<ModuleMap, NccError> {
        let def_widths: HashMap<CompactString, SVerilogRange> = m.defs.iter()
            .filter_map(|d| Some((d.name.clone(), d.width?)))
            .collect();

        let mut def_types: HashMap<CompactString, WireDefType> = HashMap::new();
        for d in &m.defs {
            use WireDefType::*;
            match def_types.get_mut(&d.name) {
                None => { def_types.insert(d.name.clone(), d.typ); }
                Some(t) => match (*t, d.typ) {
                    (Wire, Input | Output | InOut) => *t = d.typ,
                    (_, Wire) => {}
                    (a, b) if a == b => {}
                    (a, b) => return Err(NccError::invalid(format!(
                        "module {}: {} declared both {:?} and {:?}", name, d.name, a, b)))
                }
            }
        }

        // a named port connection `.p(expr)` is a vector if it is
        // wider than one bit or refers to a vector.
        let port_widths = m.ports.iter().filter_map(|p| match p {
            SVerilogPortDef::Basic(n) => def_widths.get(n.as_str()).map(|w| (n.clone(), *w)),
            SVerilogPortDef::Conn(n, expr) => {
                let width = expr_len(&def_widths, expr);
                if width > 1 {
                    return Some((n.clone(), SVerilogRange(width as isize - 1, 0)))
                }
                let is_vec = |eb: &WirexprBasic| match eb {
                    WirexprBasic::Full(s) => def_widths.contains_key(s),
                    WirexprBasic::Slice(_, _) => true,
                    _ => false
                };
                let has_vector = match expr {
                    Wirexpr::Basic(eb) => is_vec(eb),
                    Wirexpr::Concat(v) => v.iter().any(is_vec)
                };
                has_vector.then(|| (n.clone(), SVerilogRange(0, 0)))
            }
        }).collect();

        Ok(ModuleMap { def_widths, def_types, port_widths })
    }

    /// The bits of an expression, most significant first.
    pub fn eval_expr<'a>(
        &'a self, expr: &'a Wirexpr
    ) -> impl Iterator<Item = ExprBit<'a>> + 'a {
        use Either::*;
        fn eval_basic<'a>(
            mm: &'a ModuleMap, eb: &'a WirexprBasic
        ) -> impl Iterator<Item = ExprBit<'a>> + 'a {
            let index = |s: &'a CompactString| move |i| ExprBit::Var(s, Some(i));
            match eb {
                WirexprBasic::Full(s) => match mm.def_widths.get(s.as_str()) {
                    Some(range) => Right(Left(range.map(index(s)))),
                    None => Left(Some(ExprBit::Var(s, None)).into_iter())
                },
                WirexprBasic::SingleBit(s, i) => Left(Some(ExprBit::Var(s, Some(*i))).into_iter()),
                WirexprBasic::Slice(s, range) => Right(Left(range.map(index(s)))),
                WirexprBasic::Literal(size, value, is_xz) => {
                    let (value, is_xz) = (*value, *is_xz);
                    Right(Right((0..*size).rev().map(move |i| {
                        ExprBit::Const(match (is_xz >> i & 1, value >> i & 1) {
                            (0, 0) => Logic::Zero,
                            (0, _) => Logic::One,
                            (_, 0) => Logic::X,
                            _ => Logic::Z,
                        })
                    })))
                }
            }
        }
        match expr {
            Wirexpr::Basic(b) => Left(eval_basic(self, b)),
            Wirexpr::Concat(v) => Right(v.iter().flat_map(move |b| eval_basic(self, b)))
        }
    }

    #[inline]
    pub fn eval_expr_len(&self, expr: &Wirexpr) -> usize {
        expr_len(&self.def_widths, expr)
    }

    /// The bits of a port, in declaration order.
    pub fn port_bits(&self, name: &str) -> impl Iterator<Item = Option<isize>> {
        enum_in_width(self.port_widths.get(name).copied())
    }
}

/// Find the top module: the given one, the only module, or the only
/// module no other module instantiates.
pub fn find_top_module<'i>(
    source: &'i SVerilog, top: Option<&str>
) -> Result<&'i CompactString, NccError> {
    let modules = &source.modules;
    if modules.is_empty() {
        return Err(NccError::invalid("empty verilog netlist"))
    }
    if let Some(top) = top {
        return match modules.iter().find(|(n, _)| n.as_str() == top) {
            Some((n, _)) => Ok(n),
            None => Err(NccError::invalid(format!(
                "top module {} not found in the verilog code", top)))
        }
    }
    if let [(n, _)] = modules.as_slice() {
        return Ok(n)
    }
    let names: HashSet<&CompactString> = modules.iter().map(|(n, _)| n).collect();
    let referenced: HashSet<&CompactString> = modules.iter()
        .flat_map(|(_, m)| m.cells.iter().map(|c| &c.macro_name))
        .filter(|n| names.contains(n))
        .collect();
    let unrefs: Vec<&CompactString> = modules.iter()
        .map(|(n, _)| n)
        .filter(|n| !referenced.contains(n))
        .collect();
    match unrefs.as_slice() {
        [n] => {
            clilog::info!(NCCV_GUESSTOP, "the top module is guessed to be {}", n);
            Ok(*n)
        }
        [] => Err(NccError::invalid(
            "modules reference each other cyclically, cannot guess the top module")),
        _ => Err(NccError::invalid(format!(
            "there are {} potential top modules: {:?}, please specify one",
            unrefs.len(), unrefs)))
    }
}

#[test]
fn test_find_top_module() {
    let sv = SVerilog::parse_str("
module leaf (a);
input a;
endmodule
module top (x);
input x;
leaf l0 (.a(x));
endmodule
module other (y);
input y;
endmodule
").unwrap();
    assert!(find_top_module(&sv, None).is_err());
    assert_eq!(find_top_module(&sv, Some("top")).unwrap().as_str(), "top");
    assert!(find_top_module(&sv, Some("nope")).is_err());
}

//! Compare two structural verilog netlists.
//!
//! Exit status:
//!   0 if the designs match,
//!   1 if they mismatch,
//!   2 if the comparison could not finish or the input is invalid.

use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;
use clap::Parser;
use ncc::{CellView, NccError, NccOperation, NccOptions, NccOutcome, NccRoot, NeverAbort, Verdict};
use nccverilog::*;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// The reference netlist, loaded as a schematic.
    schematic: PathBuf,
    /// The netlist to check, loaded as a layout.
    layout: PathBuf,
    /// Top module of the reference netlist. Guessed if absent.
    #[arg(long)]
    top_a: Option<String>,
    /// Top module of the netlist to check. Guessed if absent.
    #[arg(long)]
    top_b: Option<String>,
    /// A TOML file with comparison options.
    #[arg(long)]
    options: Option<PathBuf>,
    /// Module annotations, one `module keyword args` per line.
    #[arg(long)]
    annotations: Option<PathBuf>,
    /// Flatten both designs into a single comparison.
    #[arg(long)]
    flat: bool,
}

fn read(path: &PathBuf) -> Result<String, NccError> {
    std::fs::read_to_string(path).map_err(|e| NccError::invalid(format!(
        "cannot read {}: {}", path.display(), e)))
}

fn load(
    lib: &mut ncc::Library, path: &PathBuf, view: CellView, top: Option<&str>,
    annotations: &std::collections::HashMap<compact_str::CompactString, ncc::CellAnnotations>
) -> Result<NccRoot, NccError> {
    let source = SVerilog::parse_str(&read(path)?)
        .map_err(|e| NccError::invalid(format!("{}: {}", path.display(), e)))?;
    let design = load_sverilog(lib, &source, view, &DefaultDevices)?;
    apply_annotations(lib, &design, annotations)?;
    let top = find_top_module(&source, top)?;
    match design.cell(top) {
        Some(cell) => Ok(NccRoot::new(cell)),
        None => Err(NccError::invalid(format!("top module {} was not loaded", top)))
    }
}

fn compare(cli: &Cli) -> Result<NccOutcome, NccError> {
    let mut options = match &cli.options {
        Some(path) => toml::from_str::<NccOptions>(&read(path)?)
            .map_err(|e| NccError::invalid(format!("{}: {}", path.display(), e)))?,
        None => NccOptions::default(),
    };
    if cli.flat {
        options.operation = NccOperation::FlatTopCells;
    }
    let annotations = match &cli.annotations {
        Some(path) => parse_module_annotations(&read(path)?)?,
        None => Default::default(),
    };
    let mut lib = ncc::Library::new();
    let roots = [
        load(&mut lib, &cli.schematic, CellView::Schematic, cli.top_a.as_deref(), &annotations)?,
        load(&mut lib, &cli.layout, CellView::Layout, cli.top_b.as_deref(), &annotations)?,
    ];
    ncc::run(&lib, &roots, &options, Arc::new(NeverAbort))
}

fn main() {
    clilog::init_stderr_color_debug();
    let cli = Cli::parse();
    clilog::info!(NCCV_ARGS, "args: {:?}", cli);

    let outcome = match compare(&cli) {
        Ok(o) => o,
        Err(e) => {
            clilog::error!(NCCV_ERR, "{}", e);
            exit(2);
        }
    };
    if let NccOutcome::BottomUp(r) = &outcome {
        for (group, reason) in &r.skipped {
            clilog::info!(NCCV_SKIP, "skipped {}: {}", group, reason);
        }
        if let Some(m) = r.first_mismatch() {
            clilog::warn!(NCCV_MISMATCH, "first mismatch in cell group {}", m.group);
        }
    }
    let verdict = outcome.verdict();
    println!("{}", verdict);
    exit(match verdict {
        Verdict::Match => 0,
        Verdict::Mismatch => 1,
        Verdict::Incomplete => 2,
    });
}

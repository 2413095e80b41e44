//! Structural verilog front end for the ncc netlist comparator.
//!
//! Parses gate-level or transistor-level verilog with
//! [`sverilogparse`] and loads every module as a cell of an
//! [`ncc::Library`], so that two netlists can be compared with
//! [`ncc::run`].
//!
//! ```ignore
//! let mut lib = ncc::Library::new();
//! let sch = SVerilog::parse_file("inv_sch.v")?;
//! let design = load_sverilog(&mut lib, &sch, CellView::Schematic, &DefaultDevices)?;
//! let top = design.cell(find_top_module(&sch, None)?).unwrap();
//! ```

pub use sverilogparse::SVerilog;

mod module_map;
pub use module_map::{bit_name, find_top_module, ExprBit, Logic, ModuleMap};

mod provider;
pub use provider::{DefaultDevices, DeviceProvider, LeafDevice};

mod loader;
pub use loader::{apply_annotations, load_sverilog, parse_module_annotations, LoadedDesign};

//! Per-cell NCC annotations.
//!
//! Annotations are written one per line as a keyword followed by
//! arguments, e.g.
//! ```text
//! exportsConnectedByParent vdd /vdd_[0-9]+/
//! joinGroup inv
//! notSubcircuit
//! ```
//! An argument enclosed in slashes is a regular expression that must
//! match the whole name. Anything else is matched literally.

use compact_str::CompactString;
use regex::Regex;
use crate::NccError;

/// A literal name or an anchored regular expression.
#[derive(Debug, Clone)]
pub enum NamePattern {
    Exact(CompactString),
    Regex(Regex),
}

impl NamePattern {
    #[inline]
    pub fn exact(name: impl Into<CompactString>) -> NamePattern {
        NamePattern::Exact(name.into())
    }

    /// Build a regex pattern. The expression is anchored so it
    /// must match the complete name.
    pub fn regex(expr: &str) -> Result<NamePattern, NccError> {
        match Regex::new(&format!("^(?:{})$", expr)) {
            Ok(r) => Ok(NamePattern::Regex(r)),
            Err(e) => Err(NccError::invalid(format!(
                "bad name pattern /{}/: {}", expr, e)))
        }
    }

    /// Parse an annotation argument: `/re/` or a literal name.
    pub fn parse(arg: &str) -> Result<NamePattern, NccError> {
        if arg.len() >= 2 && arg.starts_with('/') && arg.ends_with('/') {
            NamePattern::regex(&arg[1..arg.len() - 1])
        }
        else {
            Ok(NamePattern::exact(arg))
        }
    }

    #[inline]
    pub fn matches(&self, name: &str) -> bool {
        match self {
            NamePattern::Exact(s) => s.as_str() == name,
            NamePattern::Regex(r) => r.is_match(name)
        }
    }
}

/// Annotations attached to one cell.
#[derive(Debug, Clone, Default)]
pub struct CellAnnotations {
    /// do not compare this cell's group. The string is the reason.
    pub skip_ncc: Option<CompactString>,
    /// never treat this cell as a black-box subcircuit in parents.
    pub not_subcircuit: bool,
    /// compare only the exports of this cell.
    pub black_box: bool,
    /// place this cell into the named cell group.
    pub join_group: Option<CompactString>,
    /// instances whose names match are always expanded.
    pub flatten_instances: Vec<NamePattern>,
    /// groups of exports that every parent connects together.
    pub exports_connected_by_parent: Vec<Vec<NamePattern>>,
    /// exports the designer intends to rename.
    pub exports_to_rename: Vec<NamePattern>,
    /// device type of schematic transistors without a model.
    pub transistor_type: Option<CompactString>,
    /// device type of schematic resistors without a model.
    pub resistor_type: Option<CompactString>,
}

impl CellAnnotations {
    /// Parse a block of annotation text, one annotation per line.
    /// Blank lines and lines starting with `#` are ignored.
    pub fn parse(text: &str) -> Result<CellAnnotations, NccError> {
        let mut ann = CellAnnotations::default();
        for line in text.lines() {
            ann.parse_line(line)?;
        }
        Ok(ann)
    }

    /// Parse a single annotation line and merge it in.
    pub fn parse_line(&mut self, line: &str) -> Result<(), NccError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(())
        }
        let mut words = line.split_whitespace();
        let keyword = words.next().unwrap_or_default();
        let args: Vec<&str> = words.collect();

        let one_arg = |args: &[&str]| -> Result<CompactString, NccError> {
            match args {
                [a] => Ok(CompactString::from(*a)),
                _ => Err(NccError::invalid(format!(
                    "annotation `{}` takes exactly one argument", keyword)))
            }
        };
        let patterns = |args: &[&str]| -> Result<Vec<NamePattern>, NccError> {
            if args.is_empty() {
                return Err(NccError::invalid(format!(
                    "annotation `{}` needs at least one name", keyword)))
            }
            args.iter().map(|a| NamePattern::parse(a)).collect()
        };

        match keyword {
            "skipNCC" => {
                self.skip_ncc = Some(CompactString::from(args.join(" ")));
            }
            "notSubcircuit" => self.not_subcircuit = true,
            "blackBox" => self.black_box = true,
            "joinGroup" => self.join_group = Some(one_arg(&args)?),
            "flattenInstances" => {
                self.flatten_instances.extend(patterns(&args)?);
            }
            "exportsConnectedByParent" => {
                self.exports_connected_by_parent.push(patterns(&args)?);
            }
            "exportsToRename" => {
                self.exports_to_rename.extend(patterns(&args)?);
            }
            "transistorType" => self.transistor_type = Some(one_arg(&args)?),
            "resistorType" => self.resistor_type = Some(one_arg(&args)?),
            _ => {
                return Err(NccError::invalid(format!(
                    "unrecognized NCC annotation: {}", line)))
            }
        }
        Ok(())
    }

    /// true if an instance with this name must be expanded.
    pub fn flatten_instance(&self, inst_name: &str) -> bool {
        self.flatten_instances.iter().any(|p| p.matches(inst_name))
    }

    /// true if the export is marked to be renamed.
    pub fn rename_export(&self, export_name: &str) -> bool {
        self.exports_to_rename.iter().any(|p| p.matches(export_name))
    }
}

#[test]
fn test_parse_annotations() {
    let ann = CellAnnotations::parse("
        # comment
        exportsConnectedByParent gnd /gnd_[0-9]+/
        joinGroup inv
        notSubcircuit
        flattenInstances x1 /tap.*/
        skipNCC analog block
    ").unwrap();
    assert_eq!(ann.exports_connected_by_parent.len(), 1);
    let group = &ann.exports_connected_by_parent[0];
    assert!(group[0].matches("gnd"));
    assert!(group[1].matches("gnd_12"));
    assert!(!group[1].matches("xgnd_12"));
    assert_eq!(ann.join_group.as_deref(), Some("inv"));
    assert!(ann.not_subcircuit);
    assert!(ann.flatten_instance("tap3"));
    assert!(!ann.flatten_instance("x2"));
    assert_eq!(ann.skip_ncc.as_deref(), Some("analog block"));

    assert!(CellAnnotations::parse("joinGroup").is_err());
    assert!(CellAnnotations::parse("frobnicate x").is_err());
    assert!(CellAnnotations::parse("exportsToRename /(/").is_err());
}

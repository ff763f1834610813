//! Internal consistency checks over a compiled catalog.

use std::fmt;

use serde::Serialize;

use crate::encoding::pattern_to_mask_match;
use crate::model::{Catalog, Instruction, LENGTHS};
use crate::resolver::ones;

/// Entries printed before the `... and N more` tail.
pub const DISPLAY_CAP: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part: Option<usize>,
    pub msg: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.part {
            Some(i) => write!(f, "{}: part[{i}] {}", self.id, self.msg),
            None => write!(f, "{}: {}", self.id, self.msg),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub checked: usize,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    /// One violation per line, at most `cap`, then `... and N more`.
    pub fn render(&self, cap: usize) -> String {
        let mut out = String::new();
        for v in self.violations.iter().take(cap) {
            out.push_str(&v.to_string());
            out.push('\n');
        }
        if self.violations.len() > cap {
            out.push_str(&format!("... and {} more\n", self.violations.len() - cap));
        }
        out
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return writeln!(f, "OK ({} instructions)", self.checked);
        }
        f.write_str(&self.render(DISPLAY_CAP))
    }
}

pub fn validate(catalog: &Catalog) -> ValidationReport {
    let mut report = ValidationReport { checked: catalog.instructions.len(), violations: Vec::new() };
    if catalog.instruction_count != catalog.instructions.len() {
        report.violations.push(Violation {
            id: "<catalog>".into(),
            part: None,
            msg: format!(
                "instruction_count {} != {} instructions",
                catalog.instruction_count,
                catalog.instructions.len()
            ),
        });
    }
    for inst in &catalog.instructions {
        check_instruction(inst, &mut report.violations);
    }
    report
}

fn check_instruction(inst: &Instruction, out: &mut Vec<Violation>) {
    let mut push = |part: Option<usize>, msg: String| out.push(Violation { id: inst.id.clone(), part, msg });

    if !LENGTHS.contains(&inst.length_bits) {
        push(None, format!("length_bits {} is not one of {LENGTHS:?}", inst.length_bits));
    }
    if inst.encoding.length_bits != inst.length_bits {
        push(None, format!("encoding.length_bits {} != length_bits {}", inst.encoding.length_bits, inst.length_bits));
    }
    let total: u32 = inst.parts.iter().map(|p| p.width_bits).sum();
    if total != inst.length_bits {
        push(None, format!("part widths sum to {total}, expected {}", inst.length_bits));
    }
    if inst.parts.len() != inst.encoding.parts.len() {
        push(None, format!("parts count {} != encoding.parts count {}", inst.parts.len(), inst.encoding.parts.len()));
        return;
    }

    for (i, (part, enc)) in inst.parts.iter().zip(&inst.encoding.parts).enumerate() {
        let width = part.width_bits;
        if enc.width_bits != width {
            push(Some(i), format!("width_bits {width} != encoding.width_bits {}", enc.width_bits));
            continue;
        }
        let seg_sum: u32 = part.segments.iter().map(|s| s.width).sum();
        if seg_sum != width {
            push(Some(i), format!("segments cover {seg_sum} bits, expected {width}"));
        }

        let outside = !ones(width);
        if enc.mask & outside != 0 {
            push(Some(i), format!("mask {:#x} has bits outside width {width}", enc.mask));
        }
        if enc.match_bits & outside != 0 {
            push(Some(i), format!("match {:#x} has bits outside width {width}", enc.match_bits));
        }
        if enc.match_bits & !enc.mask != 0 {
            let bit = (enc.match_bits & !enc.mask).trailing_zeros();
            push(Some(i), format!("match sets bit {bit} not covered by mask"));
        }

        let plen = enc.pattern.chars().count();
        if plen != width as usize {
            push(Some(i), format!("pattern length {plen} != width {width}"));
            continue;
        }
        match pattern_to_mask_match(&enc.pattern) {
            Err(e) => push(Some(i), e.to_string()),
            Ok((pmask, pmatch)) if pmask != enc.mask || pmatch != enc.match_bits => push(
                Some(i),
                format!(
                    "pattern-derived mask/match disagree (mask {pmask:#x} vs {:#x}, match {pmatch:#x} vs {:#x})",
                    enc.mask, enc.match_bits
                ),
            ),
            Ok(_) => {}
        }
    }
}

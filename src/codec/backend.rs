//! TableGen-style backend description stub, grouped by instruction group.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use crate::encoding::combined;
use crate::model::{Catalog, Field, Instruction};

use super::{source_label, to_ident, Artifact, Emitter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandClass {
    Register,
    Immediate,
}

/// Register-like names mention `Reg` or start with `Src`/`Dst`; everything else is an immediate.
pub fn classify(name: &str) -> OperandClass {
    if name.contains("Reg") || name.starts_with("Src") || name.starts_with("Dst") {
        OperandClass::Register
    } else {
        OperandClass::Immediate
    }
}

fn operand(field: &Field) -> String {
    let var = field.name.to_ascii_lowercase();
    match classify(&field.name) {
        OperandClass::Register => format!("GPR:${var}"),
        OperandClass::Immediate if field.is_signed() => format!("simm{}:${var}", field.bit_width()),
        OperandClass::Immediate => format!("uimm{}:${var}", field.bit_width()),
    }
}

/// Replaces whole-word field names in `template` with `${lowercase}`.
pub fn substitute_placeholders(template: &str, fields: &[Field]) -> String {
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '#';
    let mut out = String::with_capacity(template.len() + 8);
    let mut rest = template;
    while let Some(start) = rest.find(is_word) {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let end = tail.find(|c: char| !is_word(c)).unwrap_or(tail.len());
        let word = &tail[..end];
        if fields.iter().any(|f| f.name == word) {
            let _ = write!(out, "${{{}}}", word.to_ascii_lowercase());
        } else {
            out.push_str(word);
        }
        rest = &tail[end..];
    }
    out.push_str(rest);
    out
}

/// `C_ADD_16`, or `C_ADD_16_<uid>` when two instructions share that name.
fn def_names(catalog: &Catalog) -> HashMap<&str, String> {
    let base = |i: &Instruction| format!("{}_{}", to_ident(&i.mnemonic), i.length_bits);
    let mut counts: HashMap<String, usize> = HashMap::new();
    for inst in &catalog.instructions {
        *counts.entry(base(inst)).or_default() += 1;
    }
    catalog
        .instructions
        .iter()
        .map(|inst| {
            let b = base(inst);
            let name = if counts.get(&b).copied().unwrap_or(0) > 1 { format!("{b}_{}", inst.uid) } else { b };
            (inst.id.as_str(), name)
        })
        .collect()
}

pub fn render_backend(catalog: &Catalog) -> String {
    let class = format!("{}Inst", to_ident(&catalog.isa));
    let names = def_names(catalog);

    let mut groups: BTreeMap<&str, Vec<&Instruction>> = BTreeMap::new();
    for inst in &catalog.instructions {
        let g = if inst.group.is_empty() { "Other" } else { inst.group.as_str() };
        groups.entry(g).or_default().push(inst);
    }

    let mut s = String::new();
    let _ = writeln!(s, "// Auto-generated from the {}.", source_label(catalog));
    s.push_str("// DO NOT EDIT: run `linxisa gen-backend` to regenerate.\n\n");
    let _ = writeln!(s, "// Instruction count: {}\n", catalog.instructions.len());
    let _ = writeln!(
        s,
        "class {class}<int length, string mnemonic> {{\n  int Length = length;\n  string Mnemonic = mnemonic;\n  dag InOperandList = (ins);\n  string AsmString = \"\";\n  bits<64> Mask = 0;\n  bits<64> Match = 0;\n}}\n"
    );

    for (group, insts) in &groups {
        s.push_str("// ========================================\n");
        let _ = writeln!(s, "// {group} ({} instructions)", insts.len());
        s.push_str("// ========================================\n\n");
        for inst in insts {
            let enc = combined(inst);
            let mut ordered: Vec<&Field> = inst.operands.iter().filter_map(|op| enc.field(op)).collect();
            for f in &enc.fields {
                if !ordered.iter().any(|o| o.name == f.name) {
                    ordered.push(f);
                }
            }
            let ins: Vec<String> = ordered.iter().map(|f| operand(f)).collect();
            let asm = match &inst.asm {
                Some(t) => substitute_placeholders(t, &enc.fields),
                None => inst.mnemonic.to_ascii_lowercase(),
            };
            let digits = (inst.length_bits as usize).div_ceil(4);
            let name = names.get(inst.id.as_str()).cloned().unwrap_or_else(|| to_ident(&inst.id));

            let _ = writeln!(s, "// {} | {}:{}", inst.id, inst.source.file, inst.source.line);
            let _ = writeln!(s, "def {name} : {class}<{}, \"{}\"> {{", inst.length_bits, inst.mnemonic);
            let _ = writeln!(s, "  let InOperandList = (ins {});", ins.join(", "));
            let _ = writeln!(s, "  let AsmString = \"{}\";", asm.replace('"', "\\\""));
            let _ = writeln!(s, "  let Mask = 0x{:0digits$x};", enc.mask);
            let _ = writeln!(s, "  let Match = 0x{:0digits$x};", enc.match_bits);
            s.push_str("}\n\n");
        }
    }
    let mut out = s.trim_end().to_string();
    out.push('\n');
    out
}

/// `<Isa>InstrInfo.td`
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendEmitter;

impl Emitter for BackendEmitter {
    fn command(&self) -> &'static str {
        "gen-backend"
    }

    fn emit(&self, catalog: &Catalog) -> Vec<Artifact> {
        vec![Artifact {
            file_name: format!("{}InstrInfo.td", to_ident(&catalog.isa)),
            contents: render_backend(catalog),
        }]
    }
}

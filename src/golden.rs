//! Catalog -> golden `.opc` text, for bootstrapping and review.
//!
//! Segment tokens are written verbatim so recompiling the export reproduces
//! every instruction id.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::codec::Artifact;
use crate::model::{Catalog, Instruction};

const HEADER: &str = "\
# Opcode database exported from a compiled catalog.
#
# Format:
#   MNEMONIC [<json meta>] : <bit-assignments> [| <bit-assignments>] ; <operands> ; <constraints>
#
# Mnemonics containing spaces are JSON string literals. Constraints apply to part 0.
";

fn mnemonic_token(m: &str) -> String {
    let plain = !m.is_empty() && !m.starts_with('"') && !m.contains(|c: char| c.is_whitespace() || c == '[' || c == ':');
    if plain { m.to_string() } else { Value::String(m.to_string()).to_string() }
}

/// One statement line for `inst`.
pub fn statement_line(inst: &Instruction) -> String {
    let mut meta = Map::new();
    meta.insert("length_bits".into(), Value::from(inst.length_bits));
    meta.insert("group".into(), Value::from(inst.group.clone()));
    if let Some(asm) = &inst.asm {
        meta.insert("asm".into(), Value::from(asm.clone()));
    }
    if let Some(note) = &inst.note {
        meta.insert("note".into(), Value::from(note.clone()));
    }
    for (k, v) in &inst.meta {
        meta.insert(k.clone(), v.clone());
    }

    let parts: Vec<String> = inst
        .parts
        .iter()
        .map(|p| {
            let toks: Vec<String> = p
                .segments
                .iter()
                .map(|s| {
                    let lhs = if s.msb == s.lsb { s.msb.to_string() } else { format!("{}..{}", s.msb, s.lsb) };
                    format!("{lhs}={}", s.token)
                })
                .collect();
            toks.join(" ")
        })
        .collect();

    let operands = if inst.operands.is_empty() {
        let mut names: Vec<&str> = Vec::new();
        for f in inst.encoding.parts.iter().flat_map(|p| &p.fields) {
            if !names.contains(&f.name.as_str()) {
                names.push(&f.name);
            }
        }
        names.join(" ")
    } else {
        inst.operands.join(" ")
    };

    let constraints: Vec<String> = inst.constraints().iter().map(ToString::to_string).collect();
    let constraints = if constraints.is_empty() { "-".to_string() } else { constraints.join(",") };

    format!(
        "{} [{}] : {} ; {operands} ; {constraints}",
        mnemonic_token(&inst.mnemonic),
        Value::Object(meta),
        parts.join(" | ")
    )
}

/// `<prefix><length>.opc` per length present in the catalog.
pub fn export_opcodes(catalog: &Catalog) -> Vec<Artifact> {
    let prefix = catalog.symbol_prefix();
    let mut buckets: BTreeMap<u32, Vec<String>> = BTreeMap::new();
    for inst in &catalog.instructions {
        buckets.entry(inst.length_bits).or_default().push(statement_line(inst));
    }
    buckets
        .into_iter()
        .map(|(len, lines)| {
            let mut contents = String::from(HEADER);
            contents.push('\n');
            for l in lines {
                contents.push_str(&l);
                contents.push('\n');
            }
            Artifact { file_name: format!("{prefix}{len}.opc"), contents }
        })
        .collect()
}

//! Decode-tree text files, one per instruction length.
//!
//! Fields with the same layout share one `%name` definition. A base name with a
//! single layout keeps its name; otherwise each layout gets `base__<signature>`.

use std::collections::{BTreeMap, BTreeSet};

use crate::encoding::{combined, CombinedEncoding};
use crate::model::{Catalog, Field, Instruction, LENGTHS};

use super::{source_label, to_ident, Artifact, Emitter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SigPiece {
    pub insn_lsb: u32,
    pub width: u32,
    /// Set on the most significant piece of a signed field.
    pub signed: bool,
}

/// Field layout, most significant value piece first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Signature(pub Vec<SigPiece>);

impl Signature {
    pub fn of(field: &Field) -> Self {
        let signed = field.is_signed();
        Signature(
            field
                .pieces
                .iter()
                .enumerate()
                .map(|(i, p)| SigPiece { insn_lsb: p.insn_lsb, width: p.width, signed: signed && i == 0 })
                .collect(),
        )
    }

    /// `20_s12__7_5`
    pub fn suffix(&self) -> String {
        if self.0.is_empty() {
            return "empty".to_string();
        }
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|p| format!("{}_{}{}", p.insn_lsb, if p.signed { "s" } else { "" }, p.width))
            .collect();
        parts.join("__")
    }

    /// `lsb:[s]width` per piece.
    pub fn render(&self) -> String {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|p| format!("{}:{}{}", p.insn_lsb, if p.signed { "s" } else { "" }, p.width))
            .collect();
        parts.join(" ")
    }
}

/// Decode-tree text for the instructions of one length.
pub fn render_decode_file(instructions: &[&Instruction], label: &str) -> String {
    let encodings: Vec<(&Instruction, CombinedEncoding)> = instructions.iter().map(|i| (*i, combined(i))).collect();

    let mut by_base: BTreeMap<String, BTreeSet<Signature>> = BTreeMap::new();
    for (_, enc) in &encodings {
        for f in &enc.fields {
            by_base.entry(to_ident(&f.name)).or_default().insert(Signature::of(f));
        }
    }

    let mut names: BTreeMap<(String, Signature), String> = BTreeMap::new();
    for (base, sigs) in &by_base {
        for sig in sigs {
            let name = if sigs.len() == 1 { base.clone() } else { to_ident(&format!("{base}__{}", sig.suffix())) };
            names.insert((base.clone(), sig.clone()), name);
        }
    }
    let mut defs: Vec<(&String, &Signature)> = names.iter().map(|((_, sig), name)| (name, sig)).collect();
    defs.sort();

    let mut lines = vec![
        format!("# Auto-generated from the {label}."),
        "# DO NOT EDIT: run `linxisa gen-decode` to regenerate.".to_string(),
        String::new(),
        "# Fields".to_string(),
    ];
    lines.extend(defs.iter().map(|(name, sig)| format!("%{name} {}", sig.render())));
    lines.push(String::new());
    lines.push("# Instruction forms".to_string());

    for (inst, enc) in &encodings {
        let mut comment = format!("# {}", inst.mnemonic);
        if let Some(asm) = &inst.asm {
            comment.push_str(&format!(" | {asm}"));
        }
        comment.push_str(&format!(" | {}:{}", inst.source.file, inst.source.line));
        lines.push(comment);

        let mut refs: Vec<(String, String)> = enc
            .fields
            .iter()
            .filter_map(|f| {
                let base = to_ident(&f.name);
                let def = names.get(&(base.clone(), Signature::of(f)))?;
                Some(if *def == base { (base, format!("%{def}")) } else { (base.clone(), format!("{base}=%{def}")) })
            })
            .collect();
        refs.sort();

        let mut line = format!("{} {}", to_ident(&inst.id), group_pattern(&enc.pattern, 4));
        for (_, r) in refs {
            line.push(' ');
            line.push_str(&r);
        }
        lines.push(line);
        lines.push(String::new());
    }

    let mut out = lines.join("\n").trim_end().to_string();
    out.push('\n');
    out
}

fn group_pattern(pattern: &str, group: usize) -> String {
    let chars: Vec<char> = pattern.chars().filter(|c| *c != ' ').collect();
    chars.chunks(group).map(|c| c.iter().collect::<String>()).collect::<Vec<_>>().join(" ")
}

/// `<prefix>16.decode` .. `<prefix>64.decode`, written even when empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeTreeEmitter;

impl Emitter for DecodeTreeEmitter {
    fn command(&self) -> &'static str {
        "gen-decode"
    }

    fn emit(&self, catalog: &Catalog) -> Vec<Artifact> {
        let prefix = catalog.symbol_prefix();
        let label = source_label(catalog);
        LENGTHS
            .iter()
            .map(|&len| {
                let insts: Vec<&Instruction> = catalog.instructions.iter().filter(|i| i.length_bits == len).collect();
                Artifact { file_name: format!("{prefix}{len}.decode"), contents: render_decode_file(&insts, &label) }
            })
            .collect()
    }
}

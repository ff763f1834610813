//! Struct-of-arrays form table and its C rendering.
//!
//! Forms point at a contiguous run of fields, fields at a contiguous run of
//! pieces. Bit positions are over the packed instruction, part 0 in the low bits.

use std::fmt::Write as _;

use crate::encoding::combined;
use crate::model::Catalog;
use crate::resolver::ones;

use super::{source_label, Artifact, Emitter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceRow {
    pub insn_lsb: u32,
    pub width: u32,
    pub value_lsb: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRow {
    pub name: String,
    /// -1 unspecified, 0 unsigned, 1 signed.
    pub signed_hint: i8,
    pub bit_width: u32,
    pub piece_start: usize,
    pub piece_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormRow {
    pub id: String,
    pub mnemonic: String,
    pub asm_fmt: String,
    pub length_bits: u32,
    pub mask: u64,
    pub match_bits: u64,
    pub field_start: usize,
    pub field_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormTable {
    pub pieces: Vec<PieceRow>,
    pub fields: Vec<FieldRow>,
    pub forms: Vec<FormRow>,
}

impl FormTable {
    /// Forms in catalog order, fields by name within a form.
    pub fn build(catalog: &Catalog) -> Self {
        let mut t = FormTable::default();
        for inst in &catalog.instructions {
            let enc = combined(inst);
            let field_start = t.fields.len();
            for f in &enc.fields {
                let piece_start = t.pieces.len();
                t.pieces.extend(f.pieces.iter().map(|p| PieceRow {
                    insn_lsb: p.insn_lsb,
                    width: p.width,
                    value_lsb: p.value_lsb,
                }));
                t.fields.push(FieldRow {
                    name: f.name.clone(),
                    signed_hint: match f.signed {
                        Some(true) => 1,
                        Some(false) => 0,
                        None => -1,
                    },
                    bit_width: f.bit_width(),
                    piece_start,
                    piece_count: f.pieces.len(),
                });
            }
            t.forms.push(FormRow {
                id: inst.id.clone(),
                mnemonic: inst.mnemonic.clone(),
                asm_fmt: inst.asm.clone().unwrap_or_default(),
                length_bits: enc.length_bits,
                mask: enc.mask,
                match_bits: enc.match_bits,
                field_start,
                field_count: t.fields.len() - field_start,
            });
        }
        t
    }

    pub fn fields_of(&self, form: &FormRow) -> &[FieldRow] {
        &self.fields[form.field_start..form.field_start + form.field_count]
    }

    pub fn pieces_of(&self, field: &FieldRow) -> &[PieceRow] {
        &self.pieces[field.piece_start..field.piece_start + field.piece_count]
    }

    pub fn field<'t>(&'t self, form: &FormRow, name: &str) -> Option<&'t FieldRow> {
        self.fields_of(form).iter().find(|f| f.name == name)
    }

    /// Raw field value assembled from its pieces.
    pub fn extract(&self, field: &FieldRow, word: u64) -> u64 {
        self.pieces_of(field)
            .iter()
            .fold(0, |v, p| v | (((word >> p.insn_lsb) & ones(p.width)) << p.value_lsb))
    }

    /// Like `extract`, sign-extended from the top value bit when the field is signed.
    pub fn extract_signed(&self, field: &FieldRow, word: u64) -> i64 {
        let raw = self.extract(field, word);
        if field.signed_hint == 1 {
            sign_extend(raw, field.bit_width)
        } else {
            raw as i64
        }
    }

    /// Writes the low `bit_width` bits of `value` into `word` through the field's pieces.
    pub fn insert(&self, field: &FieldRow, word: u64, value: u64) -> u64 {
        self.pieces_of(field).iter().fold(word, |w, p| {
            let m = ones(p.width) << p.insn_lsb;
            (w & !m) | (((value >> p.value_lsb) & ones(p.width)) << p.insn_lsb)
        })
    }

    /// All forms of `length_bits` whose fixed bits match, most fixed bits first.
    pub fn lookup(&self, word: u64, length_bits: u32) -> Vec<&FormRow> {
        let mut hits: Vec<&FormRow> = self
            .forms
            .iter()
            .filter(|f| f.length_bits == length_bits && word & f.mask == f.match_bits)
            .collect();
        hits.sort_by_key(|f| std::cmp::Reverse(f.mask.count_ones()));
        hits
    }

    pub fn render_header(&self, prefix: &str, label: &str) -> String {
        let mut s = banner(label);
        s.push_str("#pragma once\n\n#include <stddef.h>\n#include <stdint.h>\n\n");
        let _ = write!(
            s,
            "\
/* A single instruction form (unique encodable bit-pattern). */
typedef struct {{
  const char *id;          /* stable identifier */
  const char *mnemonic;
  const char *asm_fmt;     /* assembly template (may be empty) */
  uint16_t length_bits;    /* 16/32/48/64 */
  uint64_t mask;           /* fixed-bit mask over the packed instruction */
  uint64_t match;          /* fixed-bit value over the packed instruction */
  uint32_t field_start;    /* index into {prefix}_fields[] */
  uint16_t field_count;
}} {prefix}_inst_form;

/* A symbolic field (register, immediate, ...). */
typedef struct {{
  const char *name;
  int8_t signed_hint;      /* -1 unspecified, 0 unsigned, 1 signed */
  uint16_t bit_width;
  uint32_t piece_start;    /* index into {prefix}_field_pieces[] */
  uint8_t piece_count;
}} {prefix}_field;

/* A contiguous piece of a field. */
typedef struct {{
  uint8_t insn_lsb;        /* bit position in packed instruction */
  uint8_t width;
  uint8_t value_lsb;       /* bit position within the field value */
}} {prefix}_field_piece;

extern const {prefix}_inst_form {prefix}_inst_forms[];
extern const size_t {prefix}_inst_forms_count;
extern const {prefix}_field {prefix}_fields[];
extern const size_t {prefix}_fields_count;
extern const {prefix}_field_piece {prefix}_field_pieces[];
extern const size_t {prefix}_field_pieces_count;
"
        );
        s
    }

    pub fn render_source(&self, prefix: &str, label: &str) -> String {
        let mut s = banner(label);
        let _ = writeln!(s, "#include \"{prefix}_opcodes.h\"\n");

        let _ = writeln!(s, "const {prefix}_field_piece {prefix}_field_pieces[] = {{");
        for p in &self.pieces {
            let _ = writeln!(s, "  {{ .insn_lsb = {}, .width = {}, .value_lsb = {} }},", p.insn_lsb, p.width, p.value_lsb);
        }
        let _ = writeln!(s, "}};\nconst size_t {prefix}_field_pieces_count = {};\n", self.pieces.len());

        let _ = writeln!(s, "const {prefix}_field {prefix}_fields[] = {{");
        for f in &self.fields {
            let _ = writeln!(
                s,
                "  {{ .name = {}, .signed_hint = {}, .bit_width = {}, .piece_start = {}, .piece_count = {} }},",
                c_string(&f.name),
                f.signed_hint,
                f.bit_width,
                f.piece_start,
                f.piece_count
            );
        }
        let _ = writeln!(s, "}};\nconst size_t {prefix}_fields_count = {};\n", self.fields.len());

        let _ = writeln!(s, "const {prefix}_inst_form {prefix}_inst_forms[] = {{");
        for f in &self.forms {
            let _ = writeln!(
                s,
                "  {{ .id = {}, .mnemonic = {}, .asm_fmt = {}, .length_bits = {}, .mask = 0x{:016x}ULL, .match = 0x{:016x}ULL, .field_start = {}, .field_count = {} }},",
                c_string(&f.id),
                c_string(&f.mnemonic),
                c_string(&f.asm_fmt),
                f.length_bits,
                f.mask,
                f.match_bits,
                f.field_start,
                f.field_count
            );
        }
        let _ = writeln!(s, "}};\nconst size_t {prefix}_inst_forms_count = {};", self.forms.len());
        s
    }
}

/// Two's-complement reading of the low `bits` bits.
pub fn sign_extend(value: u64, bits: u32) -> i64 {
    if bits == 0 || bits >= 64 {
        return value as i64;
    }
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

fn banner(label: &str) -> String {
    format!("/* Auto-generated from the {label}. */\n/* DO NOT EDIT: run `linxisa gen-c` to regenerate. */\n\n")
}

fn c_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// `<prefix>_opcodes.h` and `<prefix>_opcodes.c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CTableEmitter;

impl Emitter for CTableEmitter {
    fn command(&self) -> &'static str {
        "gen-c"
    }

    fn emit(&self, catalog: &Catalog) -> Vec<Artifact> {
        let prefix = catalog.symbol_prefix();
        let label = source_label(catalog);
        let table = FormTable::build(catalog);
        vec![
            Artifact { file_name: format!("{prefix}_opcodes.h"), contents: table.render_header(&prefix, &label) },
            Artifact { file_name: format!("{prefix}_opcodes.c"), contents: table.render_source(&prefix, &label) },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_extension() {
        assert_eq!(sign_extend(0xfff, 12), -1);
        assert_eq!(sign_extend(0x7ff, 12), 2047);
        assert_eq!(sign_extend(0x800, 12), -2048);
        assert_eq!(sign_extend(5, 0), 5);
    }

    #[test]
    fn c_strings_are_escaped() {
        assert_eq!(c_string(r#"ld "x"\n"#), r#""ld \"x\"\\n""#);
    }

    #[test]
    fn split_field_round_trip() {
        // imm[11:5] at bits 31..25, imm[4:0] at bits 11..7
        let t = FormTable {
            pieces: vec![
                PieceRow { insn_lsb: 25, width: 7, value_lsb: 5 },
                PieceRow { insn_lsb: 7, width: 5, value_lsb: 0 },
            ],
            fields: vec![FieldRow { name: "simm12".into(), signed_hint: 1, bit_width: 12, piece_start: 0, piece_count: 2 }],
            forms: Vec::new(),
        };
        let f = &t.fields[0];
        let word = t.insert(f, 0x0000_0023, 0xfe5);
        assert_eq!(word, 0xfe00_02a3);
        assert_eq!(t.extract(f, word), 0xfe5);
        assert_eq!(t.extract_signed(f, word), -27);
    }
}

//! `linxisa lookup`: which forms accept a raw instruction word.

use anyhow::{bail, Result};
use serde::Serialize;

use linxisa_rs::codec::FormTable;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldValue {
    pub name: String,
    pub raw: u64,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormMatch {
    pub id: String,
    pub mnemonic: String,
    pub asm: String,
    pub fields: Vec<FieldValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordLookup {
    pub word: u64,
    pub length_bits: u32,
    pub matches: Vec<FormMatch>,
}

/// Hex word with optional `0x`; the digit count (4, 8, 12 or 16) gives the length
/// unless `length_bits` is forced.
pub fn parse_word(s: &str, length_bits: Option<u32>) -> Result<(u64, u32)> {
    let digits: String = s
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X")
        .chars()
        .filter(|&c| c != '_')
        .collect();
    if digits.is_empty() || digits.len() > 16 {
        bail!("bad instruction word {s:?}");
    }
    let word = u64::from_str_radix(&digits, 16).map_err(|_| anyhow::anyhow!("bad instruction word {s:?}"))?;
    let len = match (length_bits, digits.len()) {
        (Some(l), _) => l,
        (None, 4) => 16,
        (None, 8) => 32,
        (None, 12) => 48,
        (None, 16) => 64,
        (None, n) => bail!("cannot infer length of {s:?} from {n} hex digits; pass --len"),
    };
    if len < 64 && word >> len != 0 {
        bail!("word {s:?} does not fit {len} bits");
    }
    Ok((word, len))
}

pub fn lookup(table: &FormTable, word: u64, length_bits: u32) -> WordLookup {
    let matches = table
        .lookup(word, length_bits)
        .into_iter()
        .map(|form| FormMatch {
            id: form.id.clone(),
            mnemonic: form.mnemonic.clone(),
            asm: form.asm_fmt.clone(),
            fields: table
                .fields_of(form)
                .iter()
                .map(|f| FieldValue { name: f.name.clone(), raw: table.extract(f, word), value: table.extract_signed(f, word) })
                .collect(),
        })
        .collect();
    WordLookup { word, length_bits, matches }
}

pub fn render(hit: &WordLookup) -> String {
    let digits = (hit.length_bits as usize).div_ceil(4);
    let mut s = format!("0x{:0digits$x} ({}-bit): ", hit.word, hit.length_bits);
    if hit.matches.is_empty() {
        s.push_str("no match\n");
        return s;
    }
    s.push_str(&format!("{} match(es)\n", hit.matches.len()));
    for m in &hit.matches {
        s.push_str(&format!("  {} ({})", m.mnemonic, m.id));
        if !m.asm.is_empty() {
            s.push_str(&format!("  {}", m.asm));
        }
        s.push('\n');
        for f in &m.fields {
            if f.value < 0 {
                s.push_str(&format!("    {} = {} ({:#x})\n", f.name, f.value, f.raw));
            } else {
                s.push_str(&format!("    {} = {:#x}\n", f.name, f.raw));
            }
        }
    }
    s
}

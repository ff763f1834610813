//! Mask/match/pattern derivation and stable identifiers.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::model::{Constraint, EncodingPart, Field, Instruction, Part, Piece, SegmentKind};
use crate::resolver::ones;

/// Hex digits of the content hash kept in `uid`.
pub const UID_HEX_DIGITS: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid pattern char {ch:?} at position {pos}")]
pub struct PatternError {
    pub ch: char,
    pub pos: usize,
}

/// Mask and match of an MSB -> LSB pattern over `0`, `1` and `.`. Spaces are skipped.
pub fn pattern_to_mask_match(pattern: &str) -> Result<(u64, u64), PatternError> {
    let mut mask = 0u64;
    let mut match_bits = 0u64;
    for (pos, ch) in pattern.chars().enumerate() {
        match ch {
            ' ' => continue,
            '.' => {
                mask <<= 1;
                match_bits <<= 1;
            }
            '0' | '1' => {
                mask = (mask << 1) | 1;
                match_bits = (match_bits << 1) | u64::from(ch == '1');
            }
            _ => return Err(PatternError { ch, pos }),
        }
    }
    Ok((mask, match_bits))
}

/// Fixed mask and value of a part, computed from its constant segments.
pub fn fixed_bits(part: &Part) -> (u64, u64) {
    let mut mask = 0u64;
    let mut match_bits = 0u64;
    for seg in &part.segments {
        if let SegmentKind::Const { value } = seg.kind {
            mask |= ones(seg.width) << seg.lsb;
            match_bits |= (value & ones(seg.width)) << seg.lsb;
        }
    }
    (mask, match_bits)
}

pub fn render_pattern(width: u32, mask: u64, match_bits: u64) -> String {
    (0..width)
        .rev()
        .map(|bit| match ((mask >> bit) & 1, (match_bits >> bit) & 1) {
            (0, _) => '.',
            (_, 1) => '1',
            _ => '0',
        })
        .collect()
}

pub fn derive_part(index: u32, part: &Part, fields: Vec<Field>, constraints: Vec<Constraint>) -> EncodingPart {
    let (mask, match_bits) = fixed_bits(part);
    EncodingPart {
        index,
        width_bits: part.width_bits,
        mask,
        match_bits,
        pattern: render_pattern(part.width_bits, mask, match_bits),
        fields,
        constraints,
    }
}

/// All parts of an instruction viewed as one bit-vector.
///
/// Part 0 is first in the stream and occupies the low bits, so the combined
/// MSB -> LSB pattern is the part patterns in reverse stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedEncoding {
    pub length_bits: u32,
    pub pattern: String,
    pub mask: u64,
    pub match_bits: u64,
    /// Sorted by name; pieces use combined bit positions.
    pub fields: Vec<Field>,
}

impl CombinedEncoding {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

pub fn combined(inst: &Instruction) -> CombinedEncoding {
    let parts = &inst.encoding.parts;
    let mut pattern = String::with_capacity(inst.length_bits as usize);
    for p in parts.iter().rev() {
        pattern.push_str(&p.pattern);
    }

    let mut mask = 0u64;
    let mut match_bits = 0u64;
    let mut fields: BTreeMap<String, Field> = BTreeMap::new();
    let mut offset = 0u32;
    for p in parts {
        mask |= p.mask << offset;
        match_bits |= p.match_bits << offset;
        for f in &p.fields {
            let merged = fields
                .entry(f.name.clone())
                .or_insert_with(|| Field { name: f.name.clone(), signed: f.signed, pieces: Vec::new() });
            if merged.signed.is_none() {
                merged.signed = f.signed;
            }
            merged.pieces.extend(f.pieces.iter().map(|pc| Piece {
                insn_msb: pc.insn_msb + offset,
                insn_lsb: pc.insn_lsb + offset,
                ..pc.clone()
            }));
        }
        offset += p.width_bits;
    }

    let fields = fields
        .into_values()
        .map(|mut f| {
            f.pieces.sort_by(|a, b| b.value_msb.cmp(&a.value_msb));
            f
        })
        .collect();
    CombinedEncoding { length_bits: inst.length_bits, pattern, mask, match_bits, fields }
}

/// Content hash over mnemonic, length and the raw segment layout.
/// Position in the catalog plays no part, so unrelated edits never move it.
pub fn stable_uid(mnemonic: &str, length_bits: u32, parts: &[Part]) -> String {
    let mut h = Sha256::new();
    h.update(mnemonic.as_bytes());
    h.update([0]);
    h.update(length_bits.to_string().as_bytes());
    for part in parts {
        h.update(format!("|{}", part.width_bits).as_bytes());
        for seg in &part.segments {
            h.update(format!(";{}:{}:{}", seg.msb, seg.lsb, seg.token).as_bytes());
        }
    }
    let digest = h.finalize();
    let mut hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex.truncate(UID_HEX_DIGITS);
    hex
}

pub fn slug(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let out = out.trim_matches('_');
    if out.is_empty() { "inst".to_string() } else { out.to_string() }
}

pub fn instruction_id(mnemonic: &str, length_bits: u32, uid: &str) -> String {
    format!("{}_{length_bits}_{uid}", slug(mnemonic))
}

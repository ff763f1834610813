//! Raw bit assignments -> typed segments and fields.

use std::collections::BTreeMap;
use std::num::IntErrorKind;

use crate::error::ResolveError;
use crate::loader::Assignment;
use crate::model::{signed_hint, Constraint, ConstraintOp, Field, Part, Piece, Segment, SegmentKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub name: String,
    pub slice: Option<(u32, u32)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPart {
    pub part: Part,
    /// Lifted from legacy inline annotations such as `RegDst≠RA`.
    pub inline_constraints: Vec<Constraint>,
}

/// Constant value of `token` clipped to `width` bits, or `None` if it names a field.
///
/// Accepts `N'bBITS`, `N'hHEX`, `N'dDEC` (underscores allowed) and bare decimal,
/// `0x` or `0b` literals. A trailing `(annotation)` such as `5'b00001(RA)` is ignored.
pub fn parse_const_token(token: &str, width: u32) -> Result<Option<u64>, ResolveError> {
    let mut t = token.trim();
    if t.ends_with(')') {
        if let Some(open) = t.rfind('(') {
            t = t[..open].trim();
        }
    }
    if t.is_empty() || !t.starts_with(|c: char| c.is_ascii_digit()) {
        return Ok(None);
    }

    let too_wide = || ResolveError::ConstTooWide { token: token.to_string(), width };
    let bad = || ResolveError::BadConst(token.to_string());
    let number = |digits: &str, radix: u32| {
        u64::from_str_radix(digits, radix).map_err(|e| match e.kind() {
            IntErrorKind::PosOverflow => too_wide(),
            _ => bad(),
        })
    };
    let value = if let Some((decl, body)) = t.split_once('\'') {
        decl.parse::<u32>().map_err(|_| bad())?;
        let mut chars = body.chars();
        let radix = match chars.next() {
            Some('b' | 'B') => 2,
            Some('h' | 'H') => 16,
            Some('d' | 'D') => 10,
            _ => return Err(bad()),
        };
        let digits: String = chars.as_str().chars().filter(|&c| c != '_').collect();
        if digits.is_empty() {
            0
        } else {
            number(&digits, radix)?
        }
    } else {
        let lower = t.to_ascii_lowercase().replace('_', "");
        if let Some(h) = lower.strip_prefix("0x") {
            number(h, 16)?
        } else if let Some(b) = lower.strip_prefix("0b") {
            number(b, 2)?
        } else {
            number(&lower, 10)?
        }
    };

    if width < 64 && value >> width != 0 {
        return Err(too_wide());
    }
    Ok(Some(value))
}

/// `name`, `name[msb:lsb]`, optionally followed by a legacy `≠VALUE` / `!=VALUE`.
pub fn parse_field_token(token: &str) -> Result<(FieldRef, Option<String>), ResolveError> {
    let bad = || ResolveError::BadField(token.to_string());
    let mut t = token.trim();
    let mut not_equal = None;
    for op in ["\u{2260}", "!="] {
        if let Some((left, right)) = t.split_once(op) {
            let right = right.trim();
            if right.is_empty() {
                return Err(bad());
            }
            not_equal = Some(right.to_string());
            t = left.trim();
            break;
        }
    }

    let (name, slice) = match t.split_once('[') {
        Some((name, rest)) => {
            let inner = rest.strip_suffix(']').ok_or_else(bad)?;
            let (m, l) = inner.split_once(':').ok_or_else(bad)?;
            let msb = m.trim().parse::<u32>().map_err(|_| bad())?;
            let lsb = l.trim().parse::<u32>().map_err(|_| bad())?;
            if msb < lsb {
                return Err(bad());
            }
            (name, Some((msb, lsb)))
        }
        None => (t, None),
    };
    if !is_field_ident(name) {
        return Err(bad());
    }
    Ok((FieldRef { name: name.to_string(), slice }, not_equal))
}

fn is_field_ident(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '#')
}

/// Builds the segments of one part. Segments keep their authored order.
pub fn resolve_part(assignments: &[Assignment], width: u32) -> Result<ResolvedPart, ResolveError> {
    let mut covered_bits = 0u64;
    let mut covered = 0u32;
    let mut segments = Vec::with_capacity(assignments.len());
    let mut inline_constraints = Vec::new();

    for a in assignments {
        if a.msb < a.lsb {
            return Err(ResolveError::BadRange { msb: a.msb, lsb: a.lsb });
        }
        if a.msb >= width {
            return Err(ResolveError::OutOfRange { bit: a.msb, width });
        }
        let seg_width = a.msb - a.lsb + 1;
        let bits = ones(seg_width) << a.lsb;
        if covered_bits & bits != 0 {
            let bit = (covered_bits & bits).trailing_zeros();
            return Err(ResolveError::Overlap { bit });
        }
        covered_bits |= bits;
        covered += seg_width;

        let kind = match parse_const_token(&a.rhs, seg_width)? {
            Some(value) => SegmentKind::Const { value },
            None => {
                let (field, not_equal) = parse_field_token(&a.rhs)?;
                if let Some((msb, lsb)) = field.slice {
                    if msb - lsb + 1 != seg_width {
                        return Err(ResolveError::SliceWidth {
                            field: field.name,
                            msb,
                            lsb,
                            slice: msb - lsb + 1,
                            width: seg_width,
                        });
                    }
                }
                if let Some(value) = not_equal {
                    inline_constraints.push(Constraint { field: field.name.clone(), op: ConstraintOp::Ne, value });
                }
                SegmentKind::Field {
                    name: field.name,
                    value_msb: field.slice.map(|s| s.0),
                    value_lsb: field.slice.map(|s| s.1),
                }
            }
        };
        segments.push(Segment { msb: a.msb, lsb: a.lsb, width: seg_width, token: a.rhs.clone(), kind });
    }

    if covered != width {
        return Err(ResolveError::Coverage { covered, width });
    }
    Ok(ResolvedPart { part: Part { width_bits: width, segments }, inline_constraints })
}

struct RawPiece {
    part: usize,
    combined_msb: u32,
    piece: Piece,
    explicit: bool,
}

/// Groups field segments of all parts by name and returns the fields of each part.
///
/// Unsliced fields get value bits by concatenation: the piece at the highest
/// combined instruction bit (later parts sit above earlier ones) is most significant.
pub fn resolve_fields(parts: &[Part]) -> Result<Vec<Vec<Field>>, ResolveError> {
    let mut by_name: BTreeMap<String, Vec<RawPiece>> = BTreeMap::new();
    let mut offset = 0;
    for (part_index, part) in parts.iter().enumerate() {
        for seg in &part.segments {
            let SegmentKind::Field { name, value_msb, value_lsb } = &seg.kind else { continue };
            let explicit = value_msb.is_some() && value_lsb.is_some();
            by_name.entry(name.clone()).or_default().push(RawPiece {
                part: part_index,
                combined_msb: offset + seg.msb,
                piece: Piece {
                    insn_msb: seg.msb,
                    insn_lsb: seg.lsb,
                    width: seg.width,
                    value_msb: value_msb.unwrap_or(0),
                    value_lsb: value_lsb.unwrap_or(0),
                    token: seg.token.clone(),
                },
                explicit,
            });
        }
        offset += part.width_bits;
    }

    let mut out: Vec<Vec<Field>> = vec![Vec::new(); parts.len()];
    for (name, mut raw) in by_name {
        let explicit = raw.iter().filter(|r| r.explicit).count();
        if explicit != 0 && explicit != raw.len() {
            return Err(ResolveError::MixedSlices(name));
        }
        if explicit == 0 {
            raw.sort_by(|a, b| b.combined_msb.cmp(&a.combined_msb));
            let total: u32 = raw.iter().map(|r| r.piece.width).sum();
            let mut next_msb = total;
            for r in raw.iter_mut() {
                r.piece.value_msb = next_msb - 1;
                r.piece.value_lsb = next_msb - r.piece.width;
                next_msb = r.piece.value_lsb;
            }
        }

        let mut seen = 0u64;
        for r in &raw {
            let overlap = || ResolveError::SliceOverlap { field: name.clone(), bit: r.piece.value_lsb };
            if r.piece.value_msb >= 64 {
                return Err(overlap());
            }
            let bits = ones(r.piece.width) << r.piece.value_lsb;
            if seen & bits != 0 {
                return Err(overlap());
            }
            seen |= bits;
        }

        for (part_index, fields) in out.iter_mut().enumerate() {
            let mut pieces: Vec<Piece> = raw.iter().filter(|r| r.part == part_index).map(|r| r.piece.clone()).collect();
            if pieces.is_empty() {
                continue;
            }
            pieces.sort_by(|a, b| b.value_msb.cmp(&a.value_msb));
            fields.push(Field { name: name.clone(), signed: signed_hint(&name), pieces });
        }
    }
    Ok(out)
}

pub(crate) fn ones(width: u32) -> u64 {
    if width >= 64 { u64::MAX } else { (1u64 << width) - 1 }
}

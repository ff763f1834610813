use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SCHEMA: &str = "linxisa.catalog.v0";

/// Total instruction lengths the catalog may contain.
pub const LENGTHS: [u32; 4] = [16, 32, 48, 64];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConstraintOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl ConstraintOp {
    pub fn as_str(self) -> &'static str {
        match self {
            ConstraintOp::Eq => "==",
            ConstraintOp::Ne => "!=",
            ConstraintOp::Lt => "<",
            ConstraintOp::Le => "<=",
            ConstraintOp::Gt => ">",
            ConstraintOp::Ge => ">=",
        }
    }

    /// Two-character operators first so `<=` is not read as `<`.
    pub fn parse_prefix(s: &str) -> Option<(ConstraintOp, usize)> {
        const OPS: [(&str, ConstraintOp); 6] = [
            ("==", ConstraintOp::Eq),
            ("!=", ConstraintOp::Ne),
            ("<=", ConstraintOp::Le),
            (">=", ConstraintOp::Ge),
            ("<", ConstraintOp::Lt),
            (">", ConstraintOp::Gt),
        ];
        OPS.iter().find(|(t, _)| s.starts_with(t)).map(|(t, op)| (*op, t.len()))
    }

    pub fn eval(self, lhs: u64, rhs: u64) -> bool {
        match self {
            ConstraintOp::Eq => lhs == rhs,
            ConstraintOp::Ne => lhs != rhs,
            ConstraintOp::Lt => lhs < rhs,
            ConstraintOp::Le => lhs <= rhs,
            ConstraintOp::Gt => lhs > rhs,
            ConstraintOp::Ge => lhs >= rhs,
        }
    }
}

/// `field <op> value`. The value stays as written; it may be a register alias.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Constraint {
    pub field: String,
    pub op: ConstraintOp,
    pub value: String,
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.field, self.op.as_str(), self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Const {
        value: u64,
    },
    Field {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value_msb: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value_lsb: Option<u32>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub msb: u32,
    pub lsb: u32,
    pub width: u32,
    /// Right-hand side exactly as authored; part of the stable id.
    pub token: String,
    pub kind: SegmentKind,
}

impl Segment {
    pub fn field_name(&self) -> Option<&str> {
        match &self.kind {
            SegmentKind::Field { name, .. } => Some(name),
            SegmentKind::Const { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub width_bits: u32,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Piece {
    pub insn_msb: u32,
    pub insn_lsb: u32,
    pub width: u32,
    pub value_msb: u32,
    pub value_lsb: u32,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub signed: Option<bool>,
    /// Most significant value bits first.
    pub pieces: Vec<Piece>,
}

impl Field {
    pub fn bit_width(&self) -> u32 {
        self.pieces.iter().map(|p| p.value_msb + 1).max().unwrap_or(0)
    }

    pub fn is_signed(&self) -> bool {
        self.signed == Some(true)
    }
}

/// `simm*` signed, `uimm*` unsigned, anything else unspecified.
pub fn signed_hint(name: &str) -> Option<bool> {
    if name.starts_with("simm") {
        Some(true)
    } else if name.starts_with("uimm") {
        Some(false)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingPart {
    pub index: u32,
    pub width_bits: u32,
    #[serde(with = "hex")]
    pub mask: u64,
    #[serde(rename = "match", with = "hex")]
    pub match_bits: u64,
    /// MSB -> LSB over `0`, `1` and `.`.
    pub pattern: String,
    pub fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encoding {
    pub length_bits: u32,
    pub parts: Vec<EncodingPart>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLoc {
    pub file: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub id: String,
    pub uid: String,
    pub mnemonic: String,
    pub group: String,
    pub length_bits: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Operand names in assembly order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operands: Vec<String>,
    /// Other meta keys from the golden statement, kept verbatim.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, Value>,
    pub source: SourceLoc,
    pub parts: Vec<Part>,
    pub encoding: Encoding,
}

impl Instruction {
    pub fn part_widths(&self) -> Vec<u32> {
        self.parts.iter().map(|p| p.width_bits).collect()
    }

    pub fn constraints(&self) -> &[Constraint] {
        self.encoding.parts.first().map(|p| p.constraints.as_slice()).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub schema: String,
    pub isa: String,
    pub version: String,
    pub instruction_count: usize,
    pub instructions: Vec<Instruction>,
    pub registers: BTreeMap<String, Value>,
    pub state: BTreeMap<String, Value>,
}

impl Catalog {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Canonical text: stable key order, trailing newline, nothing host-specific.
    pub fn to_json(&self, pretty: bool) -> serde_json::Result<String> {
        let mut text = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        text.push('\n');
        Ok(text)
    }

    pub fn find(&self, id: &str) -> Option<&Instruction> {
        self.instructions.iter().find(|i| i.id == id)
    }

    /// Lowercase identifier prefix for generated symbols and file names.
    pub fn symbol_prefix(&self) -> String {
        let s: String = self
            .isa
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        let s = s.trim_matches('_').to_string();
        if s.is_empty() { "isa".to_string() } else { s }
    }

    /// Register name/alias -> code, across every table with `entries`.
    pub fn register_aliases(&self) -> BTreeMap<String, u64> {
        let mut out = BTreeMap::new();
        for table in self.registers.values() {
            let Some(entries) = table.get("entries").and_then(Value::as_array) else { continue };
            for e in entries {
                let Some(code) = e.get("code").and_then(Value::as_u64) else { continue };
                for key in ["asm", "name"] {
                    if let Some(s) = e.get(key).and_then(Value::as_str) {
                        out.insert(s.to_ascii_uppercase(), code);
                    }
                }
                if let Some(aliases) = e.get("aliases").and_then(Value::as_array) {
                    for a in aliases.iter().filter_map(Value::as_str) {
                        out.insert(a.to_ascii_uppercase(), code);
                    }
                }
            }
        }
        out
    }
}

/// `0x`-prefixed lowercase hex for mask/match words.
pub mod hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &u64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("{v:#x}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        let s = String::deserialize(d)?;
        parse(&s).ok_or_else(|| serde::de::Error::custom(format!("expected 0x-prefixed hex, got {s:?}")))
    }

    pub fn parse(s: &str) -> Option<u64> {
        let s = s.trim();
        let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
        u64::from_str_radix(&digits.replace('_', ""), 16).ok()
    }
}

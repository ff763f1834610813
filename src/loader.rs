//! Golden source loading.
//!
//! A golden tree looks like:
//!
//! ```text
//! meta.json                 {"isa": "LinxISA", "version": "0.3"}
//! encoding/formats.json     part widths per total length
//! registers/*.json          register tables, keyed by "name" or file stem
//! state/*.json              architectural state, keyed by file stem (optional)
//! opcodes/*.opc             opcode statements
//! ```
//!
//! One statement per line:
//!
//! ```text
//! MNEMONIC [meta] : assignments [| assignments ...] ; operands ; constraints
//! ```
//!
//! `#` starts a comment line and `$import <path>` splices another file in place.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::LoadError;
use crate::model::{Constraint, ConstraintOp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub msb: u32,
    pub lsb: u32,
    pub rhs: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Meta {
    pub length_bits: Option<u32>,
    pub group: String,
    pub asm: Option<String>,
    pub note: Option<String>,
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub mnemonic: String,
    pub meta: Meta,
    pub parts: Vec<Vec<Assignment>>,
    pub operands: Vec<String>,
    pub constraints: Vec<Constraint>,
    /// Path relative to the golden root, `/`-separated.
    pub file: String,
    pub line: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Golden {
    pub isa: String,
    pub version: String,
    /// Total length -> part widths in stream order.
    pub formats: BTreeMap<u32, Vec<u32>>,
    pub registers: BTreeMap<String, Value>,
    pub state: BTreeMap<String, Value>,
    pub statements: Vec<Statement>,
}

#[derive(Deserialize)]
struct MetaFile {
    #[serde(default)]
    isa: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Deserialize)]
struct FormatsFile {
    formats: Vec<FormatEntry>,
}

#[derive(Deserialize)]
struct FormatEntry {
    length_bits: u32,
    parts: Vec<FormatPart>,
}

#[derive(Deserialize)]
struct FormatPart {
    width_bits: u32,
}

pub fn load_golden(root: &Path) -> Result<Golden, LoadError> {
    let meta: MetaFile = read_json_as(&root.join("meta.json"))?;
    let formats: FormatsFile = read_json_as(&root.join("encoding").join("formats.json"))?;

    let mut golden = Golden {
        isa: meta.isa.unwrap_or_else(|| "LinxISA".to_string()),
        version: meta.version.unwrap_or_else(|| "0.0".to_string()),
        ..Golden::default()
    };
    for f in formats.formats {
        golden.formats.insert(f.length_bits, f.parts.iter().map(|p| p.width_bits).collect());
    }

    for path in sorted_files(&root.join("registers"), "json")? {
        let mut value: Value = read_json_as(&path)?;
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| file_stem(&path));
        if let Some(obj) = value.as_object_mut() {
            obj.remove("name");
        }
        golden.registers.insert(name, value);
    }

    for path in sorted_files(&root.join("state"), "json")? {
        golden.state.insert(file_stem(&path), read_json_as(&path)?);
    }

    let canonical_root = canonicalize(root)?;
    let mut seen = HashSet::new();
    for path in sorted_files(&root.join("opcodes"), "opc")? {
        read_opcode_file(&path, &canonical_root, &mut seen, &mut golden.statements)?;
    }
    debug!(statements = golden.statements.len(), registers = golden.registers.len(), "golden sources loaded");
    Ok(golden)
}

/// Reads one `.opc` file, following `$import` lines depth-first.
/// Files already in `seen` are skipped, which also breaks import cycles.
pub fn read_opcode_file(
    path: &Path,
    root: &Path,
    seen: &mut HashSet<PathBuf>,
    out: &mut Vec<Statement>,
) -> Result<(), LoadError> {
    let canonical = canonicalize(path)?;
    if !seen.insert(canonical.clone()) {
        debug!(file = %path.display(), "already visited, skipping");
        return Ok(());
    }
    let label = relative_label(&canonical, root);
    debug!(file = %label, "reading opcode file");
    let text = fs::read_to_string(path).map_err(|source| LoadError::Io { path: path.to_path_buf(), source })?;

    for (idx, line) in text.lines().enumerate() {
        let lineno = idx as u32 + 1;
        let raw = line.trim();
        if raw.is_empty() || raw.starts_with('#') {
            continue;
        }
        if let Some(rest) = raw.strip_prefix("$import") {
            let rel = rest.trim();
            if rel.is_empty() || !rest.starts_with(char::is_whitespace) {
                return Err(parse_error(&label, lineno, "expected `$import <path>`", line));
            }
            let base = canonical.parent().unwrap_or(root);
            read_opcode_file(&base.join(rel), root, seen, out)?;
            continue;
        }
        let mut stmt = parse_statement(line).map_err(|msg| parse_error(&label, lineno, &msg, line))?;
        stmt.file = label.clone();
        stmt.line = lineno;
        out.push(stmt);
    }
    Ok(())
}

/// Parses a statement without source location (`file` is empty, `line` is 0).
pub fn parse_statement(line: &str) -> Result<Statement, String> {
    let (mnemonic, rest) = split_mnemonic(line)?;
    let (meta, rest) = split_meta(rest)?;

    let rest = rest.trim_start();
    let Some(tail) = rest.strip_prefix(':') else {
        return Err(if rest.contains(':') { "unexpected tokens before ':'".into() } else { "missing ':'".into() });
    };

    let sections: Vec<&str> = tail.splitn(3, ';').map(str::trim).collect();
    let [enc, ops, cons] = sections.as_slice() else {
        return Err("expected exactly two ';' separators".into());
    };

    let chunks: Vec<&str> = enc.split('|').map(str::trim).collect();
    let single = chunks.len() == 1;
    let mut parts = Vec::new();
    for chunk in chunks {
        if chunk.is_empty() && !single {
            continue;
        }
        parts.push(parse_assignments(chunk)?);
    }

    Ok(Statement {
        mnemonic,
        meta,
        parts,
        operands: ops.split_whitespace().map(str::to_string).collect(),
        constraints: parse_constraints(cons)?,
        file: String::new(),
        line: 0,
    })
}

fn split_mnemonic(line: &str) -> Result<(String, &str), String> {
    let line = line.trim_start();
    if line.is_empty() {
        return Err("empty line".into());
    }
    if line.starts_with('"') {
        let end = string_end(line, 0).ok_or("unterminated mnemonic string")?;
        let mnemonic: String = serde_json::from_str(&line[..=end]).map_err(|e| format!("bad mnemonic string: {e}"))?;
        let mnemonic = mnemonic.trim().to_string();
        if mnemonic.is_empty() {
            return Err("empty mnemonic".into());
        }
        return Ok((mnemonic, &line[end + 1..]));
    }
    let end = line
        .find(|c: char| c.is_whitespace() || c == '[' || c == ':')
        .unwrap_or(line.len());
    if end == 0 {
        return Err("invalid mnemonic".into());
    }
    Ok((line[..end].to_string(), &line[end..]))
}

/// Index of the quote closing the JSON string that opens at `start`.
fn string_end(s: &str, start: usize) -> Option<usize> {
    let mut escaped = false;
    for (i, ch) in s[start + 1..].char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return Some(start + 1 + i),
            _ => {}
        }
    }
    None
}

fn split_meta(rest: &str) -> Result<(Meta, &str), String> {
    let rest = rest.trim_start();
    if !rest.starts_with('[') {
        return Ok((Meta::default(), rest));
    }
    let mut depth = 0usize;
    let mut close = None;
    let mut i = 0;
    let bytes = rest.as_bytes();
    while i < bytes.len() {
        match bytes[i] {
            b'"' => i = string_end(rest, i).ok_or("unterminated string in [...] meta")?,
            b'[' | b'{' => depth += 1,
            b']' | b'}' => {
                depth = depth.checked_sub(1).ok_or("unbalanced [...] meta")?;
                if depth == 0 {
                    close = Some(i);
                    break;
                }
            }
            _ => {}
        }
        i += 1;
    }
    let close = close.ok_or("unterminated [...] meta")?;
    let raw = rest[1..close].trim();
    let tail = &rest[close + 1..];
    if raw.is_empty() {
        return Ok((Meta::default(), tail));
    }
    let value: Value = serde_json::from_str(raw).map_err(|e| format!("meta is not valid JSON: {e}"))?;
    Ok((meta_from_value(value)?, tail))
}

fn meta_from_value(value: Value) -> Result<Meta, String> {
    let mut meta = Meta::default();
    match value {
        Value::String(asm) => meta.asm = Some(asm),
        Value::Object(map) => {
            for (key, v) in map {
                match key.as_str() {
                    "length_bits" => {
                        let n = v.as_u64().ok_or("meta.length_bits must be an integer")?;
                        meta.length_bits = Some(u32::try_from(n).map_err(|_| "meta.length_bits out of range")?);
                    }
                    "group" => meta.group = v.as_str().ok_or("meta.group must be a string")?.trim().to_string(),
                    "asm" => meta.asm = Some(v.as_str().ok_or("meta.asm must be a string")?.trim().to_string()),
                    "note" => meta.note = Some(v.as_str().ok_or("meta.note must be a string")?.to_string()),
                    _ => {
                        meta.extra.insert(key, v);
                    }
                }
            }
        }
        _ => return Err("meta must be a JSON string or object".into()),
    }
    if meta.asm.as_deref() == Some("") {
        meta.asm = None;
    }
    Ok(meta)
}

fn parse_assignments(s: &str) -> Result<Vec<Assignment>, String> {
    let mut out = Vec::new();
    for tok in s.split_whitespace() {
        let (lhs, rhs) = tok.split_once('=').ok_or_else(|| format!("bad assignment token: {tok:?}"))?;
        let (msb, lsb) = match lhs.split_once("..") {
            Some((m, l)) => (parse_bit(m, tok)?, parse_bit(l, tok)?),
            None => {
                let b = parse_bit(lhs, tok)?;
                (b, b)
            }
        };
        if msb < lsb {
            return Err(format!("bad bit range {msb}..{lsb}"));
        }
        if rhs.is_empty() {
            return Err(format!("empty right-hand side in {tok:?}"));
        }
        out.push(Assignment { msb, lsb, rhs: rhs.to_string() });
    }
    Ok(out)
}

fn parse_bit(s: &str, tok: &str) -> Result<u32, String> {
    s.trim().parse::<u32>().map_err(|_| format!("bad bit index in {tok:?}"))
}

pub fn parse_constraints(s: &str) -> Result<Vec<Constraint>, String> {
    let s = s.trim();
    if s.is_empty() || s == "-" {
        return Ok(Vec::new());
    }
    s.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(parse_constraint)
        .collect()
}

/// `Field<op>value`, e.g. `RegDst!=RA` or `uimm5<=15`.
pub fn parse_constraint(tok: &str) -> Result<Constraint, String> {
    let bad = || format!("invalid constraint {tok:?} (expected e.g. Field!=0)");
    let name_end = tok
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '#'))
        .ok_or_else(bad)?;
    let field = &tok[..name_end];
    if field.is_empty() || field.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(bad());
    }
    let (op, len) = ConstraintOp::parse_prefix(&tok[name_end..]).ok_or_else(bad)?;
    let value = tok[name_end + len..].trim();
    if value.is_empty() {
        return Err(bad());
    }
    Ok(Constraint { field: field.to_string(), op, value: value.to_string() })
}

fn parse_error(file: &str, line: u32, msg: &str, text: &str) -> LoadError {
    LoadError::Parse { file: file.to_string(), line, msg: msg.to_string(), text: text.trim_end().to_string() }
}

fn read_json_as<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let text = fs::read_to_string(path).map_err(|source| LoadError::Io { path: path.to_path_buf(), source })?;
    serde_json::from_str(&text).map_err(|source| LoadError::Json { path: path.to_path_buf(), source })
}

/// Files with `ext` directly under `dir`, sorted by name. A missing directory is empty.
fn sorted_files(dir: &Path, ext: &str) -> Result<Vec<PathBuf>, LoadError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let io = |source| LoadError::Io { path: dir.to_path_buf(), source };
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).map_err(io)? {
        let path = entry.map_err(io)?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(ext) {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

fn canonicalize(path: &Path) -> Result<PathBuf, LoadError> {
    path.canonicalize().map_err(|source| LoadError::Io { path: path.to_path_buf(), source })
}

fn file_stem(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}

/// `path` relative to `base`, `/`-separated, climbing with `..` when `path` lies
/// outside `base`. Paths without a common ancestor keep only the file name.
pub fn relative_label(path: &Path, base: &Path) -> String {
    let to: Vec<Component<'_>> = path.components().collect();
    let from: Vec<Component<'_>> = base.components().collect();
    let common = to.iter().zip(&from).take_while(|(a, b)| a == b).count();
    if common == 0 || common == to.len() {
        return path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    }
    let mut parts: Vec<Cow<'_, str>> = vec![Cow::Borrowed(".."); from.len() - common];
    parts.extend(to[common..].iter().map(|c| c.as_os_str().to_string_lossy()));
    parts.join("/")
}

/// Label for a user-supplied path that does not depend on how it was spelled:
/// both sides are canonicalized when they exist.
pub fn display_label(path: &Path, base: &Path) -> String {
    let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let base = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());
    relative_label(&path, &base)
}

//! Golden statements -> compiled catalog.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use tracing::{debug, info};

use crate::encoding::{derive_part, instruction_id, stable_uid};
use crate::error::{BuildError, ResolveError};
use crate::loader::{load_golden, Golden, Statement};
use crate::model::{Catalog, Encoding, Instruction, SourceLoc, SCHEMA};
use crate::resolver::{resolve_fields, resolve_part};

/// Loads and compiles the golden tree at `root`.
pub fn compile_golden(root: &Path) -> Result<Catalog, BuildError> {
    let golden = load_golden(root)?;
    compile(golden)
}

pub fn compile(golden: Golden) -> Result<Catalog, BuildError> {
    let Golden { isa, version, formats, registers, state, statements } = golden;

    let mut instructions = Vec::with_capacity(statements.len());
    for stmt in statements {
        instructions.push(compile_statement(stmt, &formats)?);
    }

    let mut seen: HashMap<&str, &SourceLoc> = HashMap::new();
    for inst in &instructions {
        if let Some(first) = seen.insert(&inst.id, &inst.source) {
            return Err(BuildError::DuplicateId {
                id: inst.id.clone(),
                first: format!("{}:{}", first.file, first.line),
                second: format!("{}:{}", inst.source.file, inst.source.line),
            });
        }
    }

    instructions.sort_by(|a, b| {
        (a.mnemonic.as_str(), a.length_bits, a.id.as_str()).cmp(&(b.mnemonic.as_str(), b.length_bits, b.id.as_str()))
    });
    info!(isa = %isa, instructions = instructions.len(), "catalog compiled");

    Ok(Catalog {
        schema: SCHEMA.to_string(),
        isa,
        version,
        instruction_count: instructions.len(),
        instructions,
        registers,
        state,
    })
}

fn compile_statement(stmt: Statement, formats: &BTreeMap<u32, Vec<u32>>) -> Result<Instruction, BuildError> {
    let fail = |msg: String| BuildError::Statement {
        file: stmt.file.clone(),
        line: stmt.line,
        mnemonic: stmt.mnemonic.clone(),
        msg,
    };

    let length_bits = stmt.meta.length_bits.ok_or_else(|| fail("meta.length_bits is required".into()))?;
    let widths = formats.get(&length_bits).ok_or_else(|| fail(format!("unknown length_bits {length_bits}")))?;
    if stmt.parts.len() != widths.len() {
        return Err(fail(format!(
            "part count {} does not match format parts {}",
            stmt.parts.len(),
            widths.len()
        )));
    }

    let mut parts = Vec::with_capacity(widths.len());
    let mut constraints = stmt.constraints.clone();
    for (index, (assignments, &width)) in stmt.parts.iter().zip(widths).enumerate() {
        let resolved = resolve_part(assignments, width).map_err(|source| BuildError::Resolve {
            file: stmt.file.clone(),
            line: stmt.line,
            mnemonic: stmt.mnemonic.clone(),
            part: index,
            source,
        })?;
        for c in resolved.inline_constraints {
            if !constraints.contains(&c) {
                constraints.push(c);
            }
        }
        parts.push(resolved.part);
    }

    let fields = resolve_fields(&parts).map_err(|e| fail(e.to_string()))?;
    for c in &constraints {
        if !fields.first().is_some_and(|part0| part0.iter().any(|f| f.name == c.field)) {
            return Err(fail(ResolveError::UnknownConstraintField(c.field.clone()).to_string()));
        }
    }

    let mut part0_constraints = Some(constraints);
    let encoding_parts = parts
        .iter()
        .zip(fields)
        .enumerate()
        .map(|(i, (part, fields))| {
            let cons = if i == 0 { part0_constraints.take().unwrap_or_default() } else { Vec::new() };
            derive_part(i as u32, part, fields, cons)
        })
        .collect();

    let uid = stable_uid(&stmt.mnemonic, length_bits, &parts);
    let id = instruction_id(&stmt.mnemonic, length_bits, &uid);
    debug!(%id, file = %stmt.file, line = stmt.line, "instruction compiled");

    Ok(Instruction {
        id,
        uid,
        group: stmt.meta.group,
        length_bits,
        asm: stmt.meta.asm,
        note: stmt.meta.note,
        operands: stmt.operands,
        meta: stmt.meta.extra,
        source: SourceLoc { file: stmt.file, line: stmt.line },
        encoding: Encoding { length_bits, parts: encoding_parts },
        parts,
        mnemonic: stmt.mnemonic,
    })
}

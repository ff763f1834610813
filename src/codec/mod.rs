//! Codec emitters. Each is a pure function of the catalog.

pub mod backend;
pub mod decodetree;
pub mod table;

use crate::model::Catalog;

pub use backend::BackendEmitter;
pub use decodetree::DecodeTreeEmitter;
pub use table::{CTableEmitter, FormTable};

/// One generated file, named relative to the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub contents: String,
}

pub trait Emitter {
    /// CLI subcommand that regenerates this emitter's files.
    fn command(&self) -> &'static str;

    fn emit(&self, catalog: &Catalog) -> Vec<Artifact>;
}

/// Letters, digits and `_`; never empty, never starting with a digit.
pub fn to_ident(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let out = out.trim_matches('_');
    match out.chars().next() {
        None => "field".to_string(),
        Some(c) if c.is_ascii_digit() => format!("f_{out}"),
        Some(_) => out.to_string(),
    }
}

fn source_label(catalog: &Catalog) -> String {
    format!("{} {} catalog", catalog.isa, catalog.version)
}

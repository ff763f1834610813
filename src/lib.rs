pub mod codec;
pub mod compiler;
pub mod conflict;
pub mod encoding;
pub mod error;
pub mod golden;
pub mod loader;
pub mod model;
pub mod output;
pub mod resolver;
pub mod validate;

pub use compiler::{compile, compile_golden};
pub use conflict::{analyze, ConflictReport, DetectorConfig, Verdict};
pub use error::{BuildError, ConfigError, LoadError, OutputError, ResolveError};
pub use model::{Catalog, Instruction};
pub use validate::{validate, ValidationReport};

use std::path::PathBuf;

/// Problems with a single assignment or token, before file/line context is attached.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("bad bit range {msb}..{lsb}")]
    BadRange { msb: u32, lsb: u32 },
    #[error("bit {bit} is outside the {width}-bit part")]
    OutOfRange { bit: u32, width: u32 },
    #[error("bit {bit} is assigned more than once")]
    Overlap { bit: u32 },
    #[error("segments cover {covered} bits, expected {width}")]
    Coverage { covered: u32, width: u32 },
    #[error("constant {token:?} does not fit {width} bits")]
    ConstTooWide { token: String, width: u32 },
    #[error("invalid constant {0:?}")]
    BadConst(String),
    #[error("invalid field token {0:?}")]
    BadField(String),
    #[error("field {field}: slice [{msb}:{lsb}] is {slice} bits but the segment is {width} bits")]
    SliceWidth { field: String, msb: u32, lsb: u32, slice: u32, width: u32 },
    #[error("field {0}: mixes sliced and unsliced pieces")]
    MixedSlices(String),
    #[error("field {field}: value bit {bit} supplied by more than one piece")]
    SliceOverlap { field: String, bit: u32 },
    #[error("constraint field {0} is not encoded in part 0")]
    UnknownConstraintField(String),
}

/// Detector configuration that would make the analysis meaningless.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("selector {name}: bit {bit} is outside the {width}-bit part")]
    SelectorBit { name: String, bit: u32, width: u32 },
    #[error("selector {name}: {bits} bits, at most {max} are supported")]
    SelectorTooWide { name: String, bits: usize, max: usize },
    #[error("selector {name}: width_bits {width} is not between 1 and 64")]
    SelectorWidth { name: String, width: u32 },
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: invalid JSON: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{file}:{line}: {msg}\n  line: {text}")]
    Parse { file: String, line: u32, msg: String, text: String },
}

#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("{file}:{line}: {mnemonic} part[{part}]: {source}")]
    Resolve {
        file: String,
        line: u32,
        mnemonic: String,
        part: usize,
        #[source]
        source: ResolveError,
    },
    #[error("{file}:{line}: {mnemonic}: {msg}")]
    Statement { file: String, line: u32, mnemonic: String, msg: String },
    #[error("duplicate instruction id {id} ({first} and {second})")]
    DuplicateId { id: String, first: String, second: String },
}

#[derive(thiserror::Error, Debug)]
pub enum OutputError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("MISSING {} (run `linxisa {command}`)", .path.display())]
    Missing { path: PathBuf, command: String },
    #[error("OUTDATED {} (regenerate with `linxisa {command}`)", .path.display())]
    Outdated { path: PathBuf, command: String },
}

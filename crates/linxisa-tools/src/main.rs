use anyhow::{ensure, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use std::path::{Path, PathBuf};

use linxisa_rs::codec::{BackendEmitter, CTableEmitter, DecodeTreeEmitter, Emitter, FormTable};
use linxisa_rs::golden::export_opcodes;
use linxisa_rs::loader::display_label;
use linxisa_rs::output::{check_file, emit_artifacts, write_atomic};
use linxisa_rs::validate::DISPLAY_CAP;
use linxisa_rs::{analyze, validate, Catalog, DetectorConfig};

mod lookup;

#[derive(Parser, Debug)]
#[command(author, version, about = "LinxISA catalog tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check internal consistency of a compiled catalog
    Validate {
        /// Catalog JSON
        #[arg(long, value_name = "FILE")]
        spec: PathBuf,
    },
    /// Report encoding-space conflicts, occupancy and 16-bit coverage
    Conflicts {
        /// Catalog JSON
        #[arg(long, value_name = "FILE")]
        spec: PathBuf,
        /// Write the report to a file instead of stdout
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
        /// Report format: text (markdown) or json
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Compare the report with --out instead of writing it
        #[arg(long, requires = "out")]
        check: bool,
        /// Fail on possible overlaps too
        #[arg(long)]
        strict: bool,
        /// Extra alias group, comma separated. Repeat flag to add more groups.
        #[arg(long = "allow-alias", value_name = "M1,M2,...")]
        allow_alias: Vec<String>,
        /// Detector configuration JSON (missing keys take defaults)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Generate the C opcode tables (<prefix>_opcodes.h/.c)
    GenC(GenArgs),
    /// Generate decode-tree files, one per instruction length
    GenDecode(GenArgs),
    /// Generate the TableGen-style backend description
    GenBackend(GenArgs),
    /// Show which forms accept the given instruction words
    Lookup {
        /// Catalog JSON
        #[arg(long, value_name = "FILE")]
        spec: PathBuf,
        /// Instruction length in bits (default: from the number of hex digits)
        #[arg(long)]
        len: Option<u32>,
        /// Output format: text or json
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Hex instruction words, e.g. 0x0001 or 0000a073
        #[arg(value_name = "WORD", required = true)]
        words: Vec<String>,
    },
    /// Export the catalog back to golden .opc files, one per length
    Split {
        /// Catalog JSON
        #[arg(long, value_name = "FILE")]
        spec: PathBuf,
        /// Destination opcodes directory
        #[arg(long, value_name = "DIR")]
        out_dir: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct GenArgs {
    /// Catalog JSON
    #[arg(long, value_name = "FILE")]
    spec: PathBuf,
    /// Output directory
    #[arg(long, value_name = "DIR")]
    out_dir: PathBuf,
    /// Compare with the files in --out-dir instead of writing them
    #[arg(long)]
    check: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn load_catalog(path: &Path) -> Result<Catalog> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let catalog = Catalog::from_json(&text).with_context(|| format!("parsing catalog {}", path.display()))?;
    debug!(path = %path.display(), instructions = catalog.instructions.len(), "catalog loaded");
    Ok(catalog)
}

fn load_config(path: Option<&Path>, allow_alias: &[String]) -> Result<DetectorConfig> {
    let mut config = match path {
        Some(p) => {
            let text = std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
            DetectorConfig::from_json(&text).with_context(|| format!("parsing detector config {}", p.display()))?
        }
        None => DetectorConfig::default(),
    };
    config.alias_groups.extend(alias_groups(allow_alias));
    Ok(config)
}

/// `A,B` `C,D` -> [[A, B], [C, D]]; groups with fewer than two names are dropped.
fn alias_groups(args: &[String]) -> Vec<Vec<String>> {
    args.iter()
        .map(|g| g.split(',').map(str::trim).filter(|m| !m.is_empty()).map(str::to_string).collect::<Vec<_>>())
        .filter(|g| g.len() > 1)
        .collect()
}

fn generate(emitter: &dyn Emitter, args: &GenArgs) -> Result<()> {
    let catalog = load_catalog(&args.spec)?;
    let artifacts = emitter.emit(&catalog);
    let paths = emit_artifacts(&args.out_dir, &artifacts, args.check, emitter.command())?;
    for p in paths {
        if args.check {
            println!("OK {}", p.display());
        } else {
            println!("Wrote {}", p.display());
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Validate { spec } => {
            let catalog = load_catalog(&spec)?;
            let report = validate(&catalog);
            if report.is_clean() {
                print!("{report}");
            } else {
                eprint!("{}", report.render(DISPLAY_CAP));
            }
            ensure!(report.is_clean(), "{} violation(s) in {}", report.violations.len(), spec.display());
        }
        Command::Conflicts { spec, out, format, check, strict, allow_alias, config } => {
            let catalog = load_catalog(&spec)?;
            let config = load_config(config.as_deref(), &allow_alias)?;
            let mut report = analyze(&catalog, &config);
            report.source = Some(display_label(&spec, &std::env::current_dir()?));

            let text = match format {
                OutputFormat::Text => report.to_markdown(strict),
                OutputFormat::Json => {
                    let mut t = serde_json::to_string_pretty(&report)?;
                    t.push('\n');
                    t
                }
            };
            match out {
                Some(path) if check => {
                    check_file(&path, &text, "conflicts")?;
                    println!("OK {}", path.display());
                }
                Some(path) => {
                    write_atomic(&path, text.as_bytes())?;
                    println!("Wrote {}", path.display());
                }
                None => print!("{text}"),
            }
            ensure!(
                report.passes(strict),
                "encoding conflicts: {} proven, {} possible, {} multiply-matched 16-bit words",
                report.proven(),
                report.possible(),
                report.multi16()
            );
        }
        Command::GenC(args) => generate(&CTableEmitter, &args)?,
        Command::GenDecode(args) => generate(&DecodeTreeEmitter, &args)?,
        Command::GenBackend(args) => generate(&BackendEmitter, &args)?,
        Command::Lookup { spec, len, format, words } => {
            let catalog = load_catalog(&spec)?;
            let table = FormTable::build(&catalog);
            let mut hits = Vec::with_capacity(words.len());
            for w in &words {
                let (word, length_bits) = lookup::parse_word(w, len)?;
                hits.push(lookup::lookup(&table, word, length_bits));
            }
            match format {
                OutputFormat::Text => hits.iter().for_each(|h| print!("{}", lookup::render(h))),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&hits)?),
            }
        }
        Command::Split { spec, out_dir } => {
            let catalog = load_catalog(&spec)?;
            for p in emit_artifacts(&out_dir, &export_opcodes(&catalog), false, "split")? {
                println!("Wrote {}", p.display());
            }
        }
    }
    Ok(())
}

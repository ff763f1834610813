use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use linxisa_rs::output::write_atomic;
use linxisa_rs::compile_golden;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Compile LinxISA golden opcode sources into the canonical catalog"
)]
struct Opts {
    /// Golden source root (meta.json, encoding/, registers/, state/, opcodes/)
    #[arg(long = "in", value_name = "DIR")]
    input: PathBuf,
    /// Catalog JSON to write
    #[arg(long, value_name = "FILE")]
    out: PathBuf,
    /// Indent the JSON output
    #[arg(long)]
    pretty: bool,
    /// Compare against the existing catalog instead of writing it
    #[arg(long)]
    check: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();
    let catalog = compile_golden(&opts.input)
        .with_context(|| format!("compiling {}", opts.input.display()))?;

    if opts.check {
        let text = match std::fs::read_to_string(&opts.out) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                bail!("MISSING {} (run `linxisa-build`)", opts.out.display())
            }
            Err(e) => return Err(e).with_context(|| format!("reading {}", opts.out.display())),
        };
        let on_disk: serde_json::Value = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", opts.out.display()))?;
        if on_disk != serde_json::to_value(&catalog)? {
            bail!(
                "OUTDATED {} (regenerate with `linxisa-build --in {} --out {}`)",
                opts.out.display(),
                opts.input.display(),
                opts.out.display()
            );
        }
        println!("OK: {} is up to date ({} instructions)", opts.out.display(), catalog.instruction_count);
        return Ok(());
    }

    let text = catalog.to_json(opts.pretty)?;
    write_atomic(&opts.out, text.as_bytes())?;
    info!(out = %opts.out.display(), instructions = catalog.instruction_count, "catalog written");
    println!("Wrote {} ({} instructions)", opts.out.display(), catalog.instruction_count);
    Ok(())
}

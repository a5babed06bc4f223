use std::fs;
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use json2tab::{FileSet, Input, Mapping, flatten};
use tracing_subscriber::EnvFilter;

/// Flatten a stream of JSON objects into one CSV file per top-level key.
#[derive(Debug, Parser)]
#[command(name = "json2tab", version, about)]
struct Cli {
    /// Input JSON file path (.json or .json.gz)
    #[arg(short, long)]
    filepath: PathBuf,

    /// Output directory, created if missing
    #[arg(short, long)]
    out: PathBuf,

    /// Rows to buffer per run before writing each chunk
    #[arg(long = "chunk-size", visible_alias = "cs", default_value_t = 500)]
    chunk_size: usize,

    /// Top-level key to copy into every output file as an identifier
    /// column; repeatable
    #[arg(short = 'i', long = "identifier", visible_alias = "id")]
    identifiers: Vec<String>,

    /// Top-level key to convert to tabular format; repeatable
    #[arg(short, long = "table")]
    tables: Vec<String>,

    /// Top-level key to leave out, selecting all others; repeatable
    #[arg(short, long = "exclude", conflicts_with_all = ["tables", "all"])]
    excludes: Vec<String>,

    /// Select every top-level key
    #[arg(short, long, conflicts_with = "tables")]
    all: bool,

    /// Write gzip-compressed output (.csv.gz)
    #[arg(short, long)]
    compress: bool,

    /// Reuse a previously saved mapping document instead of scanning
    #[arg(short, long = "mapping-file")]
    mapping_file: Option<PathBuf>,

    /// Do not write the mapping document
    #[arg(long = "no-map", visible_alias = "nm")]
    no_map: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let input = Input::new(&cli.filepath)?;

    println!("Input file: {}", input.path().display());
    println!("Output path: {}", cli.out.display());

    let top_keys = input
        .top_keys()
        .context("failed to read top-level keys from the input")?;
    if top_keys.is_empty() {
        bail!("no top-level JSON object found in {}", input.path().display());
    }
    println!("\nTop-level keys:\n=================");
    for key in &top_keys {
        println!("  {key}");
    }
    println!();

    for identifier in &cli.identifiers {
        if !top_keys.contains(identifier) {
            bail!("identifier {identifier:?} is not a top-level key");
        }
    }
    for table in &cli.tables {
        if !top_keys.contains(table) {
            bail!("table {table:?} is not a top-level key");
        }
    }
    for excluded in &cli.excludes {
        if !top_keys.contains(excluded) {
            bail!("excluded key {excluded:?} is not a top-level key");
        }
    }

    fs::create_dir_all(&cli.out)
        .with_context(|| format!("cannot create output directory {}", cli.out.display()))?;

    let selection = resolve_selection(&top_keys, &cli);

    let mapping = match &cli.mapping_file {
        Some(path) => Mapping::load(path, &top_keys, &cli.identifiers)?,
        None => {
            let bar = spinner("Creating mappings");
            let mut mapping =
                Mapping::discover(&input, &selection, &cli.identifiers, |count| {
                    bar.set_position(count);
                })?;
            bar.finish_and_clear();

            let empty = mapping.drop_empty(cli.identifiers.len());
            if !empty.is_empty() {
                println!("Note: no output file for keys without values:");
                for table in &empty {
                    println!("  {table}");
                }
                println!();
            }

            if !cli.no_map {
                let doc_path = cli.out.join(format!("{}_mappings.json", input.stem()));
                mapping.save(&doc_path).with_context(|| {
                    format!("cannot write mapping document {}", doc_path.display())
                })?;
            }
            mapping
        }
    };

    if mapping.is_empty() {
        println!("Nothing to write: no selected table has any values.");
        return Ok(());
    }

    let files = FileSet::create(&mapping, &cli.out, input.stem(), cli.compress)
        .context("cannot create output files")?;
    let written: Vec<PathBuf> = files.paths().map(PathBuf::from).collect();

    let bar = if mapping.record_count() > 0 {
        progress_bar(mapping.record_count(), "Flattening JSON")
    } else {
        spinner("Flattening JSON")
    };
    let stats = flatten(
        &input,
        &mapping,
        &cli.identifiers,
        files,
        cli.chunk_size,
        |count| bar.set_position(count),
    )?;
    bar.finish_and_clear();

    for (path, (_, columns)) in written.iter().zip(mapping.iter()) {
        println!("Wrote {} with {} fields", path.display(), columns.len());
    }
    if stats.dropped_records > 0 {
        println!(
            "Dropped {} of {} records after structural violations",
            stats.dropped_records, stats.records
        );
    }
    println!("\n{} files written to {}", written.len(), cli.out.display());
    println!("{} records processed", stats.records);

    Ok(())
}

/// Resolve the table selection from the flags. An empty selection and
/// `--all` both mean every non-identifier top-level key; `--exclude` takes
/// the complement.
fn resolve_selection(top_keys: &[String], cli: &Cli) -> Vec<String> {
    let mut selection: Vec<String> = if cli.tables.is_empty() {
        top_keys
            .iter()
            .filter(|key| !cli.excludes.contains(*key))
            .cloned()
            .collect()
    } else {
        cli.tables.clone()
    };
    selection.retain(|key| !cli.identifiers.contains(key));
    selection
}

fn progress_bar(total: u64, message: &'static str) -> ProgressBar {
    let bar = ProgressBar::new(total);
    if let Ok(style) =
        ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} ({eta})")
    {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_message(message);
    bar
}

fn spinner(message: &'static str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}: {pos} records") {
        bar.set_style(style);
    }
    bar.set_message(message);
    bar
}

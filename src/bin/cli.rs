//! Command-line front end for the back-coding pipeline.
//!
//! Three subcommands: `list-use-cases` shows what the registry knows,
//! `unique` lists the distinct raw answers in a table's tracked columns
//! (handy when curating a vocabulary), and `run` drives a whole session
//! from upload to exported table. Operator decisions come in as a small
//! CSV of (column, row, label) records; still-open review entries can be
//! written out the same way for the next pass.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};

use backcode::csv_io;
use backcode::prelude::*;
use backcode::store::split_words;

#[derive(Parser, Debug)]
#[command(
    name = "backcode",
    version,
    about = "Back-code open-ended survey answers onto a curated code list"
)]
struct Cli {
    /// Use-case registry path (defaults to $BACKCODE_CONFIG, then
    /// config/use_cases.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the registered use cases
    ListUseCases,
    /// List distinct values in a table's tracked columns
    Unique(UniqueArgs),
    /// Run the pipeline over a table and write the augmented result
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct UniqueArgs {
    /// Input table
    #[arg(long, short = 'i')]
    input: PathBuf,

    /// Use case name from the registry
    #[arg(long, short = 'u')]
    use_case: String,

    /// Comma-separated tracked-column override
    #[arg(long)]
    columns: Option<String>,

    /// Field delimiter of the input table (single byte, or `tab`)
    #[arg(long, default_value = ",")]
    delimiter: String,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Input table
    #[arg(long, short = 'i')]
    input: PathBuf,

    /// Where to write the augmented table
    #[arg(long, short = 'o')]
    output: PathBuf,

    /// Use case name from the registry
    #[arg(long, short = 'u')]
    use_case: String,

    /// Acceptance threshold override, strictly between 0 and 1
    #[arg(long)]
    threshold: Option<f64>,

    /// Comma-separated vocabulary override
    #[arg(long)]
    words: Option<String>,

    /// Comma-separated tracked-column override
    #[arg(long)]
    columns: Option<String>,

    /// CSV of operator decisions (column,row,label)
    #[arg(long)]
    resolutions: Option<PathBuf>,

    /// Write still-unresolved review entries to this CSV
    #[arg(long)]
    review_out: Option<PathBuf>,

    /// Field delimiter for input and output tables (single byte, or `tab`)
    #[arg(long, default_value = ",")]
    delimiter: String,

    /// Emit a JSON run summary on stdout
    #[arg(long)]
    json: bool,
}

/// One operator decision, as read from `--resolutions`.
#[derive(Debug, Deserialize)]
struct ResolutionRecord {
    column: String,
    row: usize,
    label: String,
}

/// One still-open review entry, as written to `--review-out`.
#[derive(Debug, Serialize)]
struct ReviewRecord {
    column: String,
    row: usize,
    original_value: Option<String>,
    suggested: Option<String>,
    similarity: Option<f64>,
}

/// Machine-readable `run` summary for `--json`.
#[derive(Debug, Serialize)]
struct RunSummary {
    session_id: uuid::Uuid,
    started_at: chrono::DateTime<chrono::Utc>,
    use_case: String,
    state: SessionState,
    rows: usize,
    columns_classified: usize,
    flagged: usize,
    resolved: usize,
    warnings: Vec<PipelineWarning>,
    output: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(UseCaseStore::default_path);
    match cli.command {
        Command::ListUseCases => list_use_cases(&config_path),
        Command::Unique(args) => unique(&config_path, args),
        Command::Run(args) => run(&config_path, args),
    }
}

fn list_use_cases(config_path: &Path) -> Result<()> {
    let store = UseCaseStore::load(config_path)?;
    if store.is_empty() {
        println!("{}", "No use cases registered.".yellow());
        return Ok(());
    }
    println!(
        "{}",
        format!("{} use case(s) in {}:", store.len(), config_path.display()).cyan()
    );
    for name in store.names() {
        let use_case = store.get(name)?;
        println!(
            "  {}  {} column(s), {} word(s), {} merge / {} rename / {} identifier rule(s)",
            name.bold(),
            use_case.tracked_columns().len(),
            use_case.recommended_words().len(),
            use_case.mergers.len(),
            use_case.renamers.len(),
            use_case.identifiers.len(),
        );
    }
    Ok(())
}

fn unique(config_path: &Path, args: UniqueArgs) -> Result<()> {
    let store = UseCaseStore::load(config_path)?;
    let use_case = store.get(&args.use_case)?;
    let mut session = Session::new(args.use_case.as_str(), use_case);

    if let Some(columns) = &args.columns {
        let (list, warnings) = split_words(columns);
        report_warnings(&warnings);
        session.set_tracked_columns(list)?;
    }
    let delimiter = csv_io::parse_delimiter(&args.delimiter)?;
    session.load_table(csv_io::read_table(&args.input, delimiter)?)?;

    let (values, warnings) = session.unique_values()?;
    report_warnings(session.warnings());
    report_warnings(&warnings);
    println!(
        "{}",
        format!(
            "{} distinct value(s) across {} tracked column(s):",
            values.len(),
            session.tracked_columns().len()
        )
        .cyan()
    );
    for value in &values {
        println!("{value}");
    }
    Ok(())
}

fn run(config_path: &Path, args: RunArgs) -> Result<()> {
    let store = UseCaseStore::load(config_path)?;
    let use_case = store.get(&args.use_case)?;
    let mut session = Session::new(args.use_case.as_str(), use_case);

    if let Some(threshold) = args.threshold {
        session.set_threshold(threshold)?;
    }
    if let Some(words) = &args.words {
        let (list, warnings) = split_words(words);
        report_warnings(&warnings);
        session.set_vocabulary(list)?;
    }
    if let Some(columns) = &args.columns {
        let (list, warnings) = split_words(columns);
        report_warnings(&warnings);
        session.set_tracked_columns(list)?;
    }

    let delimiter = csv_io::parse_delimiter(&args.delimiter)?;
    session.load_table(csv_io::read_table(&args.input, delimiter)?)?;
    session.run_matcher()?;

    let flagged = session.review_queue().len();
    if session.state() == SessionState::UnderReview {
        if let Some(path) = &args.resolutions {
            let (applied, skipped) = apply_resolutions(&mut session, path)?;
            if !args.json {
                println!(
                    "Applied {applied} resolution(s), {skipped} skipped, {} still pending.",
                    session.review_queue().pending_count()
                );
            }
        }
        if let Some(path) = &args.review_out {
            let written = write_pending_reviews(session.review_queue(), path)?;
            if !args.json && written > 0 {
                println!("Wrote {written} pending review row(s) to {}.", path.display());
            }
        }
    } else if args.resolutions.is_some() && !args.json {
        println!("No rows were flagged; the resolutions file was not needed.");
    }

    session.canonicalize()?;
    let output_table = session.assemble()?;
    csv_io::write_table(output_table, &args.output, delimiter)?;
    let rows = output_table.row_count();

    report_warnings(session.warnings());
    if args.json {
        let summary = RunSummary {
            session_id: session.session_id(),
            started_at: session.created_at(),
            use_case: session.use_case().to_string(),
            state: session.state(),
            rows,
            columns_classified: session.classified().len(),
            flagged,
            resolved: session.review_queue().resolved_count(),
            warnings: session.warnings().to_vec(),
            output: args.output.clone(),
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{} {} row(s), {} column(s) classified, {} flagged, {} resolved -> {}",
            "done:".green().bold(),
            rows,
            session.classified().len(),
            flagged,
            session.review_queue().resolved_count(),
            args.output.display()
        );
    }
    Ok(())
}

/// Apply operator decisions from a CSV file. Records the pipeline rejects
/// (unknown rows, unselectable labels) are skipped with a warning so one
/// stale line cannot sink the batch.
fn apply_resolutions(session: &mut Session, path: &Path) -> Result<(usize, usize)> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open resolutions file: {}", path.display()))?;
    let mut applied = 0usize;
    let mut skipped = 0usize;
    for record in reader.deserialize::<ResolutionRecord>() {
        let record = record
            .with_context(|| format!("Malformed resolution record in {}", path.display()))?;
        let key = RowKey::new(record.column, record.row);
        match session.resolve(&key, &record.label) {
            Ok(()) => applied += 1,
            Err(err) => {
                eprintln!("{} {err}", "warning:".yellow().bold());
                skipped += 1;
            }
        }
    }
    Ok((applied, skipped))
}

fn write_pending_reviews(queue: &ReviewQueue, path: &Path) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create review file: {}", path.display()))?;
    let mut written = 0usize;
    for (key, entry) in queue.pending() {
        writer.serialize(ReviewRecord {
            column: key.column.clone(),
            row: key.row,
            original_value: entry.original_value.clone(),
            suggested: entry.suggested.clone(),
            similarity: entry.similarity,
        })?;
        written += 1;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write review file: {}", path.display()))?;
    Ok(written)
}

fn report_warnings(warnings: &[PipelineWarning]) {
    for warning in warnings {
        eprintln!("{} {warning}", "warning:".yellow().bold());
    }
}

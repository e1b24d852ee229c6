//! CLI binary for docshift.
//!
//! A thin shim over the library crate: subcommands map onto
//! `EncodingNormalizer`, `ConversionEngine`, and `UndoManager` calls and
//! print their results. State (journal, audit log, credits) lives under
//! `--state-dir` so that `undo` in a later invocation can find it.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docshift::{
    ConversionEngine, ConversionRequest, ConverterRegistry, CreditLedger, EncodingNormalizer,
    EngineConfig, JsonFileLedger, ProgressEvent, ProgressSink, RestoreOutcome,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress sink using indicatif ────────────────────────────────────────

/// Spinner whose message follows the engine's phase events.
struct SpinnerSink {
    bar: ProgressBar,
}

impl SpinnerSink {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.set_message("starting…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for SpinnerSink {
    fn on_event(&self, event: &ProgressEvent) {
        self.bar
            .set_message(format!("{} {:>3}%", event.phase, event.percent));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Give the local user some credits, then convert
  docshift credits local --grant 10
  docshift convert notes.txt --to html

  # Declare the source format when the extension is missing or wrong
  docshift convert scan.bin --from jpeg --to png -o scan.png

  # Undo a conversion (restores the pre-normalization bytes, refunds credits)
  docshift undo 3f1c2a9e-0d4b-4d7e-9a51-6c2f0b8e7d11

  # Re-encode legacy text files to UTF-8 in place (keeps .bak backups)
  docshift normalize --dry-run data/*.csv
  docshift normalize data/*.csv
  docshift normalize --undo data/*.csv

  # What can be converted?
  docshift formats --from md

STATE:
  <state-dir>/journal/           one JSON file per successful conversion
  <state-dir>/normalization.log  JSON Lines audit of every re-encoding
  <state-dir>/credits.json       credit balances
"#;

/// Convert documents and images between formats, repairing text encodings on the way.
#[derive(Parser, Debug)]
#[command(
    name = "docshift",
    version,
    about = "Convert documents and images between formats",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the journal, audit log, and credit balances.
    #[arg(long, global = true, env = "DOCSHIFT_STATE_DIR", default_value = ".docshift")]
    state_dir: PathBuf,

    /// Print results as JSON.
    #[arg(long, global = true, env = "DOCSHIFT_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, global = true, env = "DOCSHIFT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCSHIFT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOCSHIFT_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Re-encode text files to UTF-8 in place, keeping a .bak backup.
    Normalize {
        /// Files to normalize.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Write a UTF-8 byte-order mark.
        #[arg(long, env = "DOCSHIFT_BOM")]
        bom: bool,

        /// Show the detected encoding without changing anything.
        #[arg(long, conflicts_with = "undo")]
        dry_run: bool,

        /// Restore each file from its .bak backup.
        #[arg(long)]
        undo: bool,
    },

    /// Convert one file.
    Convert {
        /// Input file.
        input: PathBuf,

        /// Target format (e.g. html, png, json).
        #[arg(long)]
        to: String,

        /// Source format. Inferred from the input extension if omitted.
        #[arg(long)]
        from: Option<String>,

        /// Output file. Default: the input path with the target extension.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Account charged for the conversion.
        #[arg(long, env = "DOCSHIFT_USER", default_value = "local")]
        user: String,

        /// Credits charged per successful conversion.
        #[arg(long, env = "DOCSHIFT_CREDIT_COST", default_value_t = 1)]
        cost: u64,
    },

    /// Undo a recorded conversion by id.
    Undo {
        conversion_id: String,
    },

    /// List supported conversion pairs.
    Formats {
        /// Only show targets reachable from this source format.
        #[arg(long)]
        from: Option<String>,
    },

    /// Show or grant credits.
    Credits {
        /// Account name.
        #[arg(default_value = "local")]
        user: String,

        /// Add this many credits.
        #[arg(long)]
        grant: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the spinner is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // A broken manifest is fatal before any work is accepted.
    let registry = Arc::new(
        ConverterRegistry::builtin().context("Built-in converter manifest is inconsistent")?,
    );
    let ledger = Arc::new(JsonFileLedger::new(cli.state_dir.join("credits.json")));

    match &cli.command {
        Command::Normalize {
            paths,
            bom,
            dry_run,
            undo,
        } => run_normalize(&cli, paths, *bom, *dry_run, *undo),
        Command::Convert {
            input,
            to,
            from,
            output,
            user,
            cost,
        } => {
            let request = build_request(input, to, from.as_deref(), output.as_deref(), user);
            run_convert(&cli, registry, ledger, request, *cost, show_progress).await
        }
        Command::Undo { conversion_id } => run_undo(&cli, registry, ledger, conversion_id).await,
        Command::Formats { from } => run_formats(&cli, &registry, from.as_deref()),
        Command::Credits { user, grant } => run_credits(&cli, &ledger, user, *grant),
    }
}

fn engine_config(cli: &Cli, cost: u64, sink: Option<Arc<dyn ProgressSink>>) -> Result<EngineConfig> {
    let mut builder = EngineConfig::builder()
        .work_dir(&cli.state_dir)
        .credit_cost(cost);
    if let Some(sink) = sink {
        builder = builder.progress_sink(sink);
    }
    builder.build().context("Invalid configuration")
}

fn build_request(
    input: &Path,
    to: &str,
    from: Option<&str>,
    output: Option<&Path>,
    user: &str,
) -> ConversionRequest {
    let target = docshift::canonical_format(to);
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| input.with_extension(&target));
    let mut request = ConversionRequest::new(input, output, target).with_user(user);
    if let Some(from) = from {
        request = request.with_source_format(from);
    }
    request
}

// ── Subcommands ──────────────────────────────────────────────────────────────

fn run_normalize(cli: &Cli, paths: &[PathBuf], bom: bool, dry_run: bool, undo: bool) -> Result<()> {
    let normalizer =
        EncodingNormalizer::new(cli.state_dir.join("normalization.log")).with_bom(bom);
    let mut failures = 0usize;

    for path in paths {
        if dry_run {
            match normalizer.preview(path) {
                Ok(preview) if cli.json => println!(
                    "{}",
                    serde_json::to_string(&preview).context("Failed to serialise preview")?
                ),
                Ok(preview) => println!(
                    "{}: {} -> {} {}{}",
                    path.display(),
                    preview.from,
                    preview.to,
                    dim(&format!("({})", preview.class)),
                    if preview.mojibake { "  mojibake detected" } else { "" }
                ),
                Err(e) => {
                    failures += 1;
                    eprintln!("{} {}", red("✗"), e);
                }
            }
        } else if undo {
            match normalizer.undo_normalization(path) {
                RestoreOutcome::Restored => println!("Restored {}", path.display()),
                RestoreOutcome::NoBackup => println!("No backup for {}", path.display()),
                RestoreOutcome::Failed { reason } => {
                    failures += 1;
                    eprintln!("{} Failed to restore {}: {}", red("✗"), path.display(), reason);
                }
            }
        } else {
            match normalizer.normalize_to_utf8(path, Some(bom)) {
                Ok(report) if cli.json => println!(
                    "{}",
                    serde_json::to_string(&report).context("Failed to serialise report")?
                ),
                Ok(report) => {
                    println!("Normalized {}", path.display());
                    if !cli.quiet {
                        eprintln!(
                            "   {}",
                            dim(&format!("{} -> {}, backup {}", report.from, report.to, report.backup_path.display()))
                        );
                    }
                }
                Err(e) => {
                    failures += 1;
                    eprintln!("{} {}", red("✗"), e);
                }
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} files failed", failures, paths.len());
    }
    Ok(())
}

async fn run_convert(
    cli: &Cli,
    registry: Arc<ConverterRegistry>,
    ledger: Arc<JsonFileLedger>,
    request: ConversionRequest,
    cost: u64,
    show_progress: bool,
) -> Result<()> {
    let spinner = show_progress.then(SpinnerSink::new);
    let sink = spinner
        .as_ref()
        .map(|s| Arc::clone(s) as Arc<dyn ProgressSink>);
    let engine = ConversionEngine::new(engine_config(cli, cost, sink)?, registry, ledger);

    let result = engine.convert_file(request).await;
    if let Some(spinner) = spinner {
        spinner.finish();
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialise result")?
        );
    } else if result.success && !cli.quiet {
        let output = result
            .output_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        eprintln!("{}  {}  {}", green("✔"), bold(&output), dim(&result.message));
        eprintln!("   {}", dim(&format!("conversion id {}", result.conversion_id)));
    }

    if !result.success {
        anyhow::bail!("{}", result.message);
    }
    Ok(())
}

async fn run_undo(
    cli: &Cli,
    registry: Arc<ConverterRegistry>,
    ledger: Arc<JsonFileLedger>,
    conversion_id: &str,
) -> Result<()> {
    let engine = ConversionEngine::new(engine_config(cli, 0, None)?, registry, ledger);
    let report = engine
        .undo_manager()
        .undo(conversion_id)
        .await
        .with_context(|| format!("Failed to undo conversion {conversion_id}"))?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        if let Some(ref path) = report.restored_path {
            println!("Restored {}", path.display());
        }
        println!(
            "Refunded {} credits (balance {})",
            report.refunded, report.new_balance
        );
    }
    Ok(())
}

fn run_formats(cli: &Cli, registry: &ConverterRegistry, from: Option<&str>) -> Result<()> {
    match from {
        Some(source) => {
            let targets = registry.targets_for(source);
            if cli.json {
                println!("{}", serde_json::to_string(&targets).context("Failed to serialise")?);
            } else if targets.is_empty() {
                println!("No conversions from {}", docshift::canonical_format(source));
            } else {
                for t in targets {
                    println!("{t}");
                }
            }
        }
        None => {
            let pairs = registry.pairs();
            if cli.json {
                println!("{}", serde_json::to_string(&pairs).context("Failed to serialise")?);
            } else {
                for pair in pairs {
                    println!("{pair}");
                }
            }
        }
    }
    Ok(())
}

fn run_credits(cli: &Cli, ledger: &JsonFileLedger, user: &str, grant: Option<u64>) -> Result<()> {
    let balance = match grant {
        Some(amount) => ledger
            .refund(user, amount)
            .with_context(|| format!("Failed to grant credits to '{user}'"))?,
        None => ledger
            .balance(user)
            .with_context(|| format!("Failed to read balance of '{user}'"))?,
    };
    if cli.json {
        println!("{}", serde_json::json!({ "user": user, "balance": balance }));
    } else {
        println!("{user}: {balance}");
    }
    Ok(())
}

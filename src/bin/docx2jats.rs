//! CLI binary for docx2jats.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{bail, Context, Result};
use clap::Parser;
use docx2jats::{
    convert, convert_batch, engine_version, BatchItem, ConversionConfig, ConversionOutput,
    PipelineReport, TargetFormat,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

const AFTER_HELP: &str = r#"EXAMPLES:
  # DOCX to Markdown, written next to the input (paper.md)
  docx2jats paper.docx

  # DOCX straight to repaired JATS XML
  docx2jats --to jats paper.docx -o paper.xml

  # Markdown to JATS, printed to stdout
  docx2jats --stdout paper.md

  # Convert a folder of manuscripts, four at a time
  docx2jats -c 4 -o out/ manuscripts/*.docx

  # Report what the repair stages changed, as JSON
  docx2jats --json paper.md

REPAIRS APPLIED TO JATS OUTPUT:
  sections  loose body content is wrapped in <sec id="heading-…">
  figures   image + "Figure N: caption" pairs become <fig> with label,
            caption and graphic
  cells     paragraphs, block quotes and line breaks inside table cells
            are flattened to "a; b" inline text
  ids       every section, figure and figure part gets a unique id

ENVIRONMENT VARIABLES:
  DOCX2JATS_PANDOC        Path to the pandoc binary (default: pandoc on PATH)
  DOCX2JATS_TO            Target for .docx inputs: markdown or jats
  DOCX2JATS_CONCURRENCY   Files converted at once
  RUST_LOG                Override the log filter (e.g. docx2jats=debug)

SETUP:
  Install pandoc (https://pandoc.org/installing.html); version 2.11 or
  newer is required for --markdown-headings.
"#;

/// Convert DOCX and Markdown manuscripts to platform-ready JATS XML.
#[derive(Parser, Debug)]
#[command(
    name = "docx2jats",
    version,
    about = "Convert DOCX and Markdown manuscripts to platform-ready JATS XML",
    long_about = "Convert DOCX manuscripts to Markdown, and Markdown (or DOCX) to JATS \
archiving XML using pandoc, then repair the JATS so strict publishing platforms accept it: \
sections wrapped, figures synthesized, table cells flattened, identifiers made unique.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input files (.docx, .md, .markdown).
    #[arg(required_unless_present = "engine_version")]
    inputs: Vec<PathBuf>,

    /// Output file (one input) or directory (several inputs).
    /// Default: next to each input.
    #[arg(short, long, env = "DOCX2JATS_OUTPUT")]
    output: Option<PathBuf>,

    /// Target format for .docx inputs. Markdown inputs always become JATS.
    #[arg(long, env = "DOCX2JATS_TO", value_enum, default_value = "markdown")]
    to: TargetArg,

    /// Path to the pandoc binary.
    #[arg(long, env = "DOCX2JATS_PANDOC")]
    pandoc: Option<PathBuf>,

    /// Keep pandoc's Markdown as is (no bold/italic merging, keep image sizes).
    #[arg(long, env = "DOCX2JATS_NO_FIX_MARKDOWN")]
    no_fix_markdown: bool,

    /// Hex digits in generated identifiers (8–32).
    #[arg(long, env = "DOCX2JATS_ID_WIDTH", default_value_t = 24,
          value_parser = clap::value_parser!(u8).range(8..=32))]
    id_width: u8,

    /// Reject inputs larger than this many MiB.
    #[arg(long, env = "DOCX2JATS_MAX_SIZE_MB", default_value_t = 50,
          value_parser = clap::value_parser!(u64).range(1..))]
    max_size_mb: u64,

    /// Per-pandoc-call timeout in seconds.
    #[arg(long, env = "DOCX2JATS_TIMEOUT", default_value_t = 120,
          value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Number of files converted concurrently.
    #[arg(short, long, env = "DOCX2JATS_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Print the converted document to stdout instead of writing a file.
    #[arg(long, conflicts_with = "output")]
    stdout: bool,

    /// Print structured JSON (ConversionOutput) to stdout.
    #[arg(long, env = "DOCX2JATS_JSON")]
    json: bool,

    /// Print the pandoc version and exit.
    #[arg(long)]
    engine_version: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCX2JATS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCX2JATS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCX2JATS_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum TargetArg {
    Markdown,
    Jats,
}

impl From<TargetArg> for TargetFormat {
    fn from(v: TargetArg) -> Self {
        match v {
            TargetArg::Markdown => TargetFormat::Markdown,
            TargetArg::Jats => TargetFormat::Jats,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO-level library logs are suppressed while the progress bar is
    // active; the per-file lines carry the same information.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.stdout;
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

    let config = build_config(&cli)?;

    // ── Engine-version mode ──────────────────────────────────────────────
    if cli.engine_version {
        let version = engine_version(&config)
            .await
            .context("Failed to query the conversion engine")?;
        println!("{version}");
        return Ok(());
    }

    // ── Single document to stdout ────────────────────────────────────────
    if cli.stdout || (cli.json && cli.inputs.len() == 1 && cli.output.is_none()) {
        if cli.inputs.len() != 1 {
            bail!("--stdout takes exactly one input, got {}", cli.inputs.len());
        }
        let output = convert(&cli.inputs[0], &config)
            .await
            .with_context(|| format!("Conversion of {} failed", cli.inputs[0].display()))?;
        print_output(&output, cli.json)?;
        if !cli.quiet && !cli.json {
            eprintln!(
                "{} {}  {}",
                green("✔"),
                cli.inputs[0].display(),
                dim(&summarise(&output.report, output.duration_ms))
            );
        }
        return Ok(());
    }

    // ── Files (one or many) ──────────────────────────────────────────────
    let items = run_files(&cli, &config).await?;
    let failed = items.iter().filter(|i| i.result.is_err()).count();

    if cli.json {
        let outputs: Vec<&ConversionOutput> = items
            .iter()
            .filter_map(|i| i.result.as_ref().ok().map(|(_, o)| o))
            .collect();
        let json = serde_json::to_string_pretty(&outputs).context("Failed to serialise output")?;
        println!("{json}");
    }

    if !cli.quiet {
        let converted = items.len() - failed;
        eprintln!(
            "{} {}/{} files converted",
            if failed == 0 { green("✔") } else { red("✘") },
            bold(&converted.to_string()),
            items.len()
        );
    }

    if failed > 0 {
        bail!("{} of {} conversions failed", failed, items.len());
    }
    Ok(())
}

/// Convert every input to a file, reporting each one as it finishes.
async fn run_files(cli: &Cli, config: &ConversionConfig) -> Result<Vec<BatchItem>> {
    let bar = if !cli.quiet && !cli.no_progress && !cli.json {
        let bar = ProgressBar::new(cli.inputs.len() as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} files  ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Some(bar)
    } else {
        None
    };

    let items = if cli.inputs.len() == 1 {
        let input = &cli.inputs[0];
        let result =
            docx2jats::convert_to_file(input, cli.output.as_deref(), config).await;
        vec![BatchItem {
            input: input.clone(),
            result,
        }]
    } else {
        if let Some(ref dir) = cli.output {
            if dir.is_file() {
                bail!(
                    "--output must be a directory when converting {} files",
                    cli.inputs.len()
                );
            }
        }
        convert_batch(&cli.inputs, cli.output.as_deref(), config).await
    };

    for item in &items {
        let line = match &item.result {
            Ok((path, output)) => format!(
                "  {} {}  →  {}  {}",
                green("✓"),
                item.input.display(),
                bold(&path.display().to_string()),
                dim(&summarise(&output.report, output.duration_ms)),
            ),
            Err(e) => format!("  {} {}  {}", red("✗"), item.input.display(), red(&e.to_string())),
        };
        match &bar {
            Some(bar) => {
                bar.println(line);
                bar.inc(1);
            }
            None if !cli.quiet || item.result.is_err() => eprintln!("{line}"),
            None => {}
        }
    }
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    Ok(items)
}

fn print_output(output: &ConversionOutput, json: bool) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if json {
        let json = serde_json::to_string_pretty(output).context("Failed to serialise output")?;
        writeln!(handle, "{json}").context("Failed to write to stdout")?;
    } else {
        handle
            .write_all(output.content.as_bytes())
            .context("Failed to write to stdout")?;
        if !output.content.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }
    Ok(())
}

fn summarise(report: &PipelineReport, duration_ms: u64) -> String {
    if report.is_noop() {
        return format!("{duration_ms}ms");
    }
    format!(
        "{} sec, {} fig, {} cells, {} ids  {}ms",
        report.sections_wrapped,
        report.figures_synthesized,
        report.cells_flattened,
        report.ids_minted,
        duration_ms
    )
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .docx_target(cli.to.into())
        .fix_markdown(!cli.no_fix_markdown)
        .id_suffix_len(cli.id_width as usize)
        .max_input_bytes(cli.max_size_mb.saturating_mul(1024 * 1024))
        .engine_timeout_secs(cli.timeout)
        .concurrency(cli.concurrency);

    if let Some(ref pandoc) = cli.pandoc {
        builder = builder.pandoc_path(pandoc);
    }

    builder.build().context("Invalid configuration")
}

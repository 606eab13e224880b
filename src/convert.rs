//! Conversion entry points.
//!
//! Each conversion is independent: it resolves its own input, runs the
//! engine on a blocking thread under a timeout, and repairs JATS output with
//! a fresh [`crate::pipeline::PipelineContext`]. A batch simply runs several
//! of them concurrently; nothing mutable is shared between them.

use crate::config::{ConversionConfig, SourceFormat, TargetFormat};
use crate::engine::{ConversionEngine, PandocEngine};
use crate::error::ConvertError;
use crate::output::{BatchItem, ConversionOutput, PipelineReport};
use crate::pipeline::{self, input, postprocess};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Convert a DOCX or Markdown file.
///
/// DOCX converts to [`ConversionConfig::docx_target`]; Markdown always
/// converts to repaired JATS XML.
///
/// # Errors
/// Every error is fatal to this conversion only:
/// - File not found / permission denied / unsupported extension / too large
/// - Engine missing, failing, or timing out
/// - Engine output that is not a parseable JATS article (no partial output)
///
/// # Example
/// ```rust,no_run
/// use docx2jats::{convert, ConversionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let output = convert("paper.md", &ConversionConfig::default()).await?;
/// println!("{}", output.content);
/// eprintln!("{} figures synthesized", output.report.figures_synthesized);
/// # Ok(())
/// # }
/// ```
pub async fn convert(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    let started = Instant::now();
    let input = input.as_ref();
    info!("Starting conversion: {}", input.display());

    // ── Step 1: Resolve input ────────────────────────────────────────────
    let resolved = input::resolve_input(input, config.max_input_bytes)?;
    let target = config.target_for(resolved.format);

    // ── Step 2: Get/create engine ────────────────────────────────────────
    let engine = resolve_engine(config)?;

    // ── Step 3: Engine + repair ──────────────────────────────────────────
    let (content, report) = match (resolved.format, target) {
        (SourceFormat::Markdown, _) => {
            let xml = run_engine(&engine, &resolved.path, SourceFormat::Markdown, TargetFormat::Jats, config).await?;
            pipeline::repair_jats(&xml, config)?
        }
        (SourceFormat::Docx, TargetFormat::Markdown) => {
            let md = docx_to_markdown(&engine, &resolved.path, config).await?;
            (md, PipelineReport::default())
        }
        (SourceFormat::Docx, TargetFormat::Jats) => {
            let md = docx_to_markdown(&engine, &resolved.path, config).await?;

            // Intermediate Markdown lives in a temp dir removed on drop.
            let tmp = tempfile::TempDir::new()
                .map_err(|e| ConvertError::Internal(format!("tempdir: {e}")))?;
            let stem = resolved.path.file_stem().unwrap_or_else(|| "document".as_ref());
            let md_path = tmp.path().join(stem).with_extension("md");
            tokio::fs::write(&md_path, &md)
                .await
                .map_err(|source| ConvertError::OutputWriteFailed {
                    path: md_path.clone(),
                    source,
                })?;
            debug!("Intermediate Markdown at {}", md_path.display());

            let xml = run_engine(&engine, &md_path, SourceFormat::Markdown, TargetFormat::Jats, config).await?;
            pipeline::repair_jats(&xml, config)?
        }
    };

    let version_task = {
        let engine = Arc::clone(&engine);
        tokio::task::spawn_blocking(move || engine.version())
    };
    let engine_version = match version_task.await {
        Ok(Ok(v)) => Some(v),
        Ok(Err(e)) => {
            debug!("Engine version unavailable: {}", e);
            None
        }
        Err(e) => {
            debug!("Engine version task failed: {}", e);
            None
        }
    };

    let duration_ms = started.elapsed().as_millis() as u64;
    info!(
        "Converted {} ({} → {}) in {}ms: {} sections wrapped, {} figures, {} cells flattened, {} ids minted",
        input.display(),
        resolved.format,
        target,
        duration_ms,
        report.sections_wrapped,
        report.figures_synthesized,
        report.cells_flattened,
        report.ids_minted
    );

    Ok(ConversionOutput {
        content,
        input: input.to_path_buf(),
        source: resolved.format,
        target,
        report,
        engine_version,
        duration_ms,
    })
}

/// Convert a file and write the result, by default next to the input.
///
/// Uses atomic write (temp file + rename) to prevent partial files: a failed
/// conversion never leaves an output behind.
pub async fn convert_to_file(
    input: impl AsRef<Path>,
    output_path: Option<&Path>,
    config: &ConversionConfig,
) -> Result<(PathBuf, ConversionOutput), ConvertError> {
    let output = convert(input.as_ref(), config).await?;
    let path = match output_path {
        Some(p) => p.to_path_buf(),
        None => input::default_output_path(input.as_ref(), output.target),
    };
    write_atomic(&path, &output.content).await?;
    info!("Wrote {}", path.display());
    Ok((path, output))
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ConvertError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input, config))
}

/// Convert several files concurrently, writing each output to `output_dir`
/// (or next to its input).
///
/// At most [`ConversionConfig::concurrency`] conversions run at once. One
/// failing input does not affect the others. Results come back in input
/// order.
pub async fn convert_batch(
    inputs: &[PathBuf],
    output_dir: Option<&Path>,
    config: &ConversionConfig,
) -> Vec<BatchItem> {
    let mut items: Vec<(usize, BatchItem)> = stream::iter(inputs.iter().enumerate().map(|(i, input)| {
        let output = output_dir.map(|dir| batch_output_path(input, dir, config));
        async move {
            let result = convert_to_file(input, output.as_deref(), config).await;
            (
                i,
                BatchItem {
                    input: input.clone(),
                    result,
                },
            )
        }
    }))
    .buffer_unordered(config.concurrency.max(1))
    .collect()
    .await;

    items.sort_by_key(|(i, _)| *i);
    items.into_iter().map(|(_, item)| item).collect()
}

/// Version string of the configured engine, without converting anything.
pub async fn engine_version(config: &ConversionConfig) -> Result<String, ConvertError> {
    let engine = resolve_engine(config)?;
    tokio::task::spawn_blocking(move || engine.version())
        .await
        .map_err(|e| ConvertError::Internal(format!("Engine task failed: {e}")))?
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Resolve the engine: a pre-built engine wins, then an explicit pandoc
/// path, then `pandoc` on `PATH`.
fn resolve_engine(config: &ConversionConfig) -> Result<Arc<dyn ConversionEngine>, ConvertError> {
    if let Some(ref engine) = config.engine {
        return Ok(Arc::clone(engine));
    }
    let pandoc = PandocEngine::locate(config.pandoc_path.as_deref())?
        .with_timeout(Duration::from_secs(config.engine_timeout_secs));
    Ok(Arc::new(pandoc))
}

/// Run one engine call on the blocking pool, bounded by the configured
/// timeout.
async fn run_engine(
    engine: &Arc<dyn ConversionEngine>,
    path: &Path,
    source: SourceFormat,
    target: TargetFormat,
    config: &ConversionConfig,
) -> Result<String, ConvertError> {
    let secs = config.engine_timeout_secs;
    let task = {
        let engine = Arc::clone(engine);
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || engine.convert(&path, source, target))
    };
    debug!("{}: {} → {} on {}", engine.name(), source, target, path.display());
    match tokio::time::timeout(Duration::from_secs(secs), task).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(ConvertError::Internal(format!("Engine task failed: {e}"))),
        Err(_) => Err(ConvertError::EngineTimeout {
            path: path.to_path_buf(),
            secs,
        }),
    }
}

async fn docx_to_markdown(
    engine: &Arc<dyn ConversionEngine>,
    path: &Path,
    config: &ConversionConfig,
) -> Result<String, ConvertError> {
    let md = run_engine(engine, path, SourceFormat::Docx, TargetFormat::Markdown, config).await?;
    Ok(if config.fix_markdown {
        postprocess::fix_markdown(&md)
    } else {
        md
    })
}

fn batch_output_path(input: &Path, dir: &Path, config: &ConversionConfig) -> PathBuf {
    let target = SourceFormat::from_path(input)
        .map(|f| config.target_for(f))
        .unwrap_or_default();
    let name = input::default_output_path(input, target);
    dir.join(name.file_name().unwrap_or(name.as_os_str()))
}

async fn write_atomic(path: &Path, content: &str) -> Result<(), ConvertError> {
    let write_err = |source| ConvertError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    tokio::fs::write(&tmp_path, content).await.map_err(write_err)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }
    Ok(())
}

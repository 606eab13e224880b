//! # docx2jats
//!
//! Convert DOCX and Markdown manuscripts to JATS archiving XML that strict
//! publishing platforms accept.
//!
//! ## Why this crate?
//!
//! `pandoc` does the heavy lifting of reading Word and Markdown, but its JATS
//! writer follows the source literally: content before the first heading sits
//! directly in `<body>`, a Markdown image and its "Figure 1: …" caption come
//! out as two unrelated paragraphs, table cells keep block quotes and
//! paragraphs the platform's table renderer cannot show, and nothing carries
//! the identifiers the platform addresses content by. This crate runs the
//! engine and then repairs its output structurally, over a typed tree.
//!
//! ## Pipeline Overview
//!
//! ```text
//! DOCX / Markdown
//!  │
//!  ├─ 1. Input     validate path, size limit, format from extension
//!  ├─ 2. Engine    pandoc on a blocking thread, under a timeout
//!  ├─ 3. Fixups    DOCX → Markdown: merge split bold/italic runs, drop image sizes
//!  ├─ 4. Parse     JATS text → typed tree (quick-xml)
//!  ├─ 5. Repair    sections → figures → table cells → identifier audit
//!  └─ 6. Output    well-formed XML + per-stage report
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docx2jats::{convert, ConversionConfig, TargetFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder()
//!         .docx_target(TargetFormat::Jats)
//!         .build()?;
//!     let output = convert("paper.docx", &config).await?;
//!     println!("{}", output.content);
//!     eprintln!("{} figures, {} cells flattened",
//!         output.report.figures_synthesized,
//!         output.report.cells_flattened);
//!     Ok(())
//! }
//! ```
//!
//! The repair pipeline is also usable on its own, without an engine:
//!
//! ```rust
//! use docx2jats::{repair_jats, ConversionConfig};
//!
//! let xml = r#"<article><body><p>Intro.</p></body></article>"#;
//! let (repaired, report) = repair_jats(xml, &ConversionConfig::default()).unwrap();
//! assert_eq!(report.sections_wrapped, 1);
//! assert!(repaired.contains("<sec id=\"heading-"));
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docx2jats` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! docx2jats = { version = "1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod jats;
pub mod output;
pub mod pipeline;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, SourceFormat, TargetFormat};
pub use convert::{convert, convert_batch, convert_sync, convert_to_file, engine_version};
pub use engine::{ConversionEngine, PandocEngine};
pub use error::ConvertError;
pub use output::{BatchItem, ConversionOutput, PipelineReport};
pub use pipeline::postprocess::fix_markdown;
pub use pipeline::repair_jats;

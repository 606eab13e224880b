//! Integration tests for docx2jats.
//!
//! The conversion engine is replaced by [`FakeEngine`], which returns canned
//! text and records every call, so these tests need no pandoc binary. Repair
//! behaviour is checked on JATS shaped like pandoc's `jats_archiving` output.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use docx2jats::jats::{parse_article, Document, Element, TagKind};
use docx2jats::{
    convert, convert_batch, convert_sync, convert_to_file, repair_jats, ConversionConfig,
    ConversionEngine, ConvertError, SourceFormat, TargetFormat,
};
use proptest::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("docx2jats=debug")
        .with_test_writer()
        .try_init();
}

/// Wrap body content in a pandoc-like standalone article.
fn article(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8" ?>
<!DOCTYPE article PUBLIC "-//NLM//DTD JATS (Z39.96) Journal Archiving and Interchange DTD v1.2 20190208//EN" "JATS-archivearticle1.dtd">
<article xmlns:mml="http://www.w3.org/1998/Math/MathML" xmlns:xlink="http://www.w3.org/1999/xlink" dtd-version="1.2" article-type="other">
<front>
<article-meta>
<title-group>
<article-title>Test</article-title>
</title-group>
</article-meta>
</front>
<body>
{body}
</body>
<back>
</back>
</article>
"#
    )
}

#[derive(Debug, Clone)]
struct Call {
    input: PathBuf,
    source: SourceFormat,
    target: TargetFormat,
    /// Input file content at call time (intermediate files are gone later).
    content: String,
}

/// Engine returning canned output per target format.
///
/// Inputs whose file name contains "broken" get malformed XML back, and
/// inputs containing "fail" make the engine exit unsuccessfully.
struct FakeEngine {
    markdown: String,
    jats: String,
    calls: Mutex<Vec<Call>>,
}

impl FakeEngine {
    fn new(markdown: &str, jats: &str) -> Arc<Self> {
        Arc::new(Self {
            markdown: markdown.to_string(),
            jats: jats.to_string(),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl ConversionEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    fn version(&self) -> Result<String, ConvertError> {
        Ok("fake 1.0".to_string())
    }

    fn convert(
        &self,
        input: &Path,
        source: SourceFormat,
        target: TargetFormat,
    ) -> Result<String, ConvertError> {
        let content = String::from_utf8_lossy(&std::fs::read(input).unwrap()).into_owned();
        self.calls.lock().unwrap().push(Call {
            input: input.to_path_buf(),
            source,
            target,
            content,
        });
        let name = input.file_name().unwrap().to_string_lossy();
        if name.contains("fail") {
            return Err(ConvertError::EngineFailed {
                status: "exit status: 64".into(),
                stderr: "Unknown extension".into(),
            });
        }
        if name.contains("broken") {
            return Ok("<article><body><p>unclosed</body></article>".to_string());
        }
        Ok(match target {
            TargetFormat::Markdown => self.markdown.clone(),
            TargetFormat::Jats => self.jats.clone(),
        })
    }
}

fn config_with(engine: Arc<FakeEngine>) -> ConversionConfig {
    ConversionConfig::builder().engine(engine).build().unwrap()
}

fn write_file(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// A file that passes the DOCX magic check.
fn fake_docx(dir: &TempDir, name: &str) -> PathBuf {
    write_file(dir, name, b"PK\x03\x04word/document.xml")
}

fn repaired(body: &str) -> Document {
    let (xml, _) = repair_jats(&article(body), &ConversionConfig::default()).unwrap();
    parse_article(&xml).unwrap()
}

fn all_elements<'a>(doc: &'a Document, kind: TagKind) -> Vec<&'a Element> {
    let mut found = Vec::new();
    doc.root.walk(&mut |e| {
        if e.kind() == kind {
            found.push(e);
        }
    });
    found
}

fn assert_unique_ids(doc: &Document) {
    let ids = doc.ids();
    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(ids.len(), unique.len(), "duplicate ids in {ids:?}");
}

// ── Repair scenarios ─────────────────────────────────────────────────────────

#[test]
fn test_quoted_references_in_cell_are_joined() {
    let doc = repaired(
        "<table-wrap><table><tbody><tr><td><disp-quote><p>Smith, 2020</p></disp-quote><disp-quote><p>Jones, 2021</p></disp-quote></td></tr></tbody></table></table-wrap>",
    );
    let td = all_elements(&doc, TagKind::TableCell)[0];
    assert_eq!(td.children.len(), 1);
    assert_eq!(td.text_content(), "Smith, 2020; Jones, 2021");
    assert!(all_elements(&doc, TagKind::Quotation).is_empty());
}

#[test]
fn test_image_and_caption_become_figure() {
    let doc = repaired(
        r#"<p><inline-graphic mimetype="image" mime-subtype="png" xlink:href="img1.png" /></p>
<p>Figure 1: A caption.</p>"#,
    );
    let figs = all_elements(&doc, TagKind::Figure);
    assert_eq!(figs.len(), 1);
    let fig = figs[0];
    assert_eq!(fig.child("object-id").unwrap().text_content(), fig.id().unwrap());
    assert_eq!(fig.child("label").unwrap().text_content(), "Figure 1");
    assert_eq!(
        fig.child("caption").unwrap().child("p").unwrap().text_content(),
        "A caption."
    );
    let graphic = fig.child("graphic").unwrap();
    assert_eq!(graphic.attr("xlink:href"), Some("img1.png"));
    assert_eq!(graphic.attr("mime-subtype"), Some("png"));

    // The figure replaced both paragraphs inside the wrapping section.
    let sec = doc.body().unwrap().child("sec").unwrap();
    assert_eq!(sec.child_elements().count(), 1);
}

#[test]
fn test_two_sections_with_same_label_get_distinct_ids() {
    let doc = repaired(
        r#"<sec><title>One</title><p><inline-graphic xlink:href="a.png" /></p><p>Figure 1: first</p></sec>
<sec><title>Two</title><p><inline-graphic xlink:href="b.png" /></p><p>Figure 1: second</p></sec>"#,
    );
    let secs: Vec<_> = doc.body().unwrap().child_elements().collect();
    let figs = all_elements(&doc, TagKind::Figure);
    assert_eq!(secs.len(), 2);
    assert_eq!(figs.len(), 2);

    let minted: HashSet<&str> = secs
        .iter()
        .chain(figs.iter())
        .map(|e| e.id().unwrap())
        .collect();
    assert_eq!(minted.len(), 4);
    assert!(!minted.iter().any(|id| id.contains("Figure")));
    assert_unique_ids(&doc);
}

#[test]
fn test_single_paragraph_cell_is_unwrapped() {
    let doc = repaired("<table><tr><td><p>Only <italic>one</italic></p></td></tr></table>");
    let td = all_elements(&doc, TagKind::TableCell)[0];
    assert!(td.child("p").is_none());
    assert_eq!(td.text_content(), "Only one");
    assert!(!td.text_content().contains(';'));
}

#[test]
fn test_empty_body_is_not_an_error() {
    let (xml, report) = repair_jats(&article(""), &ConversionConfig::default()).unwrap();
    assert_eq!(report.sections_wrapped, 0);
    assert_eq!(report.figures_synthesized, 0);
    let doc = parse_article(&xml).unwrap();
    assert!(doc.body().unwrap().children.is_empty());
}

#[test]
fn test_caption_without_image_is_left_alone() {
    let doc = repaired("<p>Figure 1 is discussed below.</p><p>Figure 2: no image here</p>");
    assert!(all_elements(&doc, TagKind::Figure).is_empty());
    assert_eq!(all_elements(&doc, TagKind::Paragraph).len(), 2);
}

#[test]
fn test_front_matter_is_untouched() {
    let (xml, _) = repair_jats(&article("<p>x</p>"), &ConversionConfig::default()).unwrap();
    assert!(xml.contains("<article-title>Test</article-title>"));
    assert!(xml.contains("dtd-version=\"1.2\""));
    assert!(xml.contains("<!DOCTYPE article PUBLIC"));
}

#[test]
fn test_id_width_follows_config() {
    let config = ConversionConfig::builder().id_suffix_len(8).build().unwrap();
    let (xml, _) = repair_jats(&article("<p>x</p>"), &config).unwrap();
    let doc = parse_article(&xml).unwrap();
    let id = doc.body().unwrap().child("sec").unwrap().id().unwrap().to_string();
    assert_eq!(id.len(), "heading-".len() + 8);
}

#[test]
fn test_malformed_xml_aborts_without_output() {
    let err = repair_jats("<article><body><p></body>", &ConversionConfig::default()).unwrap_err();
    assert!(err.is_malformed_input(), "got {err:?}");
    let err = repair_jats("<html><body/></html>", &ConversionConfig::default()).unwrap_err();
    assert!(matches!(err, ConvertError::UnexpectedRoot { .. }));
}

// ── Properties ───────────────────────────────────────────────────────────────

fn block() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z ]{1,12}".prop_map(|t| format!("<p>{t}</p>")),
        "[a-z]{1,6}".prop_map(|n| format!(r#"<p><inline-graphic xlink:href="{n}.png" /></p>"#)),
        (1u8..9, "[a-z ]{0,10}").prop_map(|(n, t)| format!("<p>Figure {n}: {t}</p>")),
        "[a-z ]{1,8}".prop_map(|t| format!(r#"<sec id="dup"><title>{t}</title></sec>"#)),
        "[a-z ]{1,8}".prop_map(|t| format!("<sec><p>{t}</p></sec>")),
        ("[a-z]{1,5}", "[a-z]{1,5}").prop_map(|(a, b)| format!(
            "<table><tr><td><disp-quote><p>{a}</p></disp-quote><p>{b}</p></td></tr></table>"
        )),
    ]
}

proptest! {
    #[test]
    fn prop_repaired_documents_have_unique_ids_and_full_coverage(
        blocks in prop::collection::vec(block(), 0..12)
    ) {
        let (xml, _) = repair_jats(&article(&blocks.concat()), &ConversionConfig::default()).unwrap();
        let doc = parse_article(&xml).unwrap();

        let ids = doc.ids();
        let unique: HashSet<_> = ids.iter().collect();
        prop_assert_eq!(ids.len(), unique.len());

        for node in doc.body().unwrap().children.iter().filter(|n| n.is_content()) {
            prop_assert_eq!(node.kind(), Some(TagKind::Section));
        }
        for td in all_elements(&doc, TagKind::TableCell) {
            prop_assert!(td.child_elements().all(|e| !matches!(
                e.kind(),
                TagKind::Paragraph | TagKind::Quotation | TagKind::Break
            )));
        }

        let (again, report) = repair_jats(&xml, &ConversionConfig::default()).unwrap();
        prop_assert_eq!(again, xml);
        prop_assert_eq!(report.ids_minted, 0);
    }
}

// ── File conversions ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_markdown_to_jats_file() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let input = write_file(&dir, "paper.md", b"![Alt](img1.png)\n\nFigure 1: A caption.\n");
    let engine = FakeEngine::new("", &article(
        r#"<p><inline-graphic mimetype="image" mime-subtype="png" xlink:href="img1.png" /></p><p>Figure 1: A caption.</p>"#,
    ));
    let config = config_with(engine.clone());

    let (path, output) = convert_to_file(&input, None, &config).await.unwrap();
    assert_eq!(path, dir.path().join("paper.xml"));
    assert_eq!(output.source, SourceFormat::Markdown);
    assert_eq!(output.target, TargetFormat::Jats);
    assert_eq!(output.report.figures_synthesized, 1);
    assert_eq!(output.engine_version.as_deref(), Some("fake 1.0"));

    let written = std::fs::read_to_string(&path).unwrap();
    assert_eq!(written, output.content);
    assert!(written.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\" ?>"));

    let calls = engine.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].source, SourceFormat::Markdown);
    assert_eq!(calls[0].target, TargetFormat::Jats);
}

#[tokio::test]
async fn test_docx_to_markdown_applies_fixups() {
    let dir = TempDir::new().unwrap();
    let input = fake_docx(&dir, "paper.docx");
    let engine = FakeEngine::new(
        "***Split*** **bold** and *in* *vitro*\n\n![x](media/image1.png){width=\"5in\"}\n",
        "",
    );

    let output = convert(&input, &config_with(engine.clone())).await.unwrap();
    assert_eq!(output.target, TargetFormat::Markdown);
    assert_eq!(
        output.content,
        "***Split bold*** and _in vitro_\n\n![x](media/image1.png)\n"
    );
    assert!(output.report.is_noop());
    assert_eq!(engine.calls()[0].source, SourceFormat::Docx);
}

#[tokio::test]
async fn test_fixups_can_be_disabled() {
    let dir = TempDir::new().unwrap();
    let input = fake_docx(&dir, "paper.docx");
    let raw = "*a* *b*\n";
    let engine = FakeEngine::new(raw, "");
    let config = ConversionConfig::builder()
        .engine(engine)
        .fix_markdown(false)
        .build()
        .unwrap();
    assert_eq!(convert(&input, &config).await.unwrap().content, raw);
}

#[tokio::test]
async fn test_docx_to_jats_goes_through_fixed_markdown() {
    let dir = TempDir::new().unwrap();
    let input = fake_docx(&dir, "paper.docx");
    let engine = FakeEngine::new("**Split** **bold**\n", &article("<p>Body</p>"));
    let config = ConversionConfig::builder()
        .engine(engine.clone())
        .docx_target(TargetFormat::Jats)
        .build()
        .unwrap();

    let (path, output) = convert_to_file(&input, None, &config).await.unwrap();
    assert_eq!(path, dir.path().join("paper.xml"));
    assert_eq!(output.report.sections_wrapped, 1);

    let calls = engine.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!((calls[0].source, calls[0].target), (SourceFormat::Docx, TargetFormat::Markdown));
    assert_eq!((calls[1].source, calls[1].target), (SourceFormat::Markdown, TargetFormat::Jats));
    assert_eq!(calls[1].content, "**Split bold**\n");
    assert!(calls[1].input.ends_with("paper.md"));
    // The intermediate Markdown is cleaned up.
    assert!(!calls[1].input.exists());
    assert!(!dir.path().join("paper.md").exists());
}

#[tokio::test]
async fn test_engine_failure_propagates_and_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let input = write_file(&dir, "fail.md", b"# x\n");
    let engine = FakeEngine::new("", &article(""));
    let err = convert_to_file(&input, None, &config_with(engine)).await.unwrap_err();
    assert!(matches!(err, ConvertError::EngineFailed { .. }));
    assert!(!dir.path().join("fail.xml").exists());
}

#[tokio::test]
async fn test_malformed_engine_output_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let input = write_file(&dir, "broken.md", b"# x\n");
    let engine = FakeEngine::new("", &article(""));
    let out = dir.path().join("out.xml");
    let err = convert_to_file(&input, Some(out.as_path()), &config_with(engine)).await.unwrap_err();
    assert!(err.is_malformed_input());
    assert!(!out.exists());
}

#[tokio::test]
async fn test_oversized_input_never_reaches_engine() {
    let dir = TempDir::new().unwrap();
    let input = write_file(&dir, "big.md", &[b'x'; 2048]);
    let engine = FakeEngine::new("", &article(""));
    let config = ConversionConfig::builder()
        .engine(engine.clone())
        .max_input_bytes(1024)
        .build()
        .unwrap();
    let err = convert(&input, &config).await.unwrap_err();
    assert!(matches!(err, ConvertError::InputTooLarge { size: 2048, .. }));
    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn test_unsupported_input_is_rejected() {
    let dir = TempDir::new().unwrap();
    let input = write_file(&dir, "paper.pdf", b"%PDF-1.7");
    let err = convert(&input, &config_with(FakeEngine::new("", ""))).await.unwrap_err();
    assert!(matches!(err, ConvertError::UnsupportedFormat { .. }));
}

#[tokio::test]
async fn test_batch_isolates_failures_and_keeps_order() {
    let dir = TempDir::new().unwrap();
    let out_dir = dir.path().join("out");
    let inputs = vec![
        write_file(&dir, "a.md", b"a"),
        write_file(&dir, "broken.md", b"b"),
        write_file(&dir, "c.md", b"c"),
    ];
    let engine = FakeEngine::new("", &article("<p>x</p>"));
    let config = ConversionConfig::builder()
        .engine(engine)
        .concurrency(3)
        .build()
        .unwrap();

    let items = convert_batch(&inputs, Some(out_dir.as_path()), &config).await;
    assert_eq!(items.len(), 3);
    for (item, input) in items.iter().zip(&inputs) {
        assert_eq!(&item.input, input);
    }
    assert!(items[0].result.is_ok());
    assert!(items[1].result.as_ref().unwrap_err().is_malformed_input());
    assert!(items[2].result.is_ok());
    assert!(out_dir.join("a.xml").exists());
    assert!(!out_dir.join("broken.xml").exists());
    assert!(out_dir.join("c.xml").exists());

    // Each document got its own allocator; both are internally unique.
    for item in [&items[0], &items[2]] {
        let (_, output) = item.result.as_ref().unwrap();
        assert_unique_ids(&parse_article(&output.content).unwrap());
    }
}

#[test]
fn test_convert_sync() {
    let dir = TempDir::new().unwrap();
    let input = write_file(&dir, "paper.md", b"text");
    let engine = FakeEngine::new("", &article("<p>text</p>"));
    let output = convert_sync(&input, &config_with(engine)).unwrap();
    assert_eq!(output.report.sections_wrapped, 1);
}

#[test]
fn test_output_is_json_serialisable() {
    let dir = TempDir::new().unwrap();
    let input = write_file(&dir, "paper.md", b"text");
    let engine = FakeEngine::new("", &article("<p>text</p>"));
    let output = convert_sync(&input, &config_with(engine)).unwrap();
    let json = serde_json::to_value(&output).unwrap();
    assert_eq!(json["report"]["sections_wrapped"], 1);
    assert_eq!(json["target"], "jats");
}

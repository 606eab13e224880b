//! Post-processing: deterministic cleanup of engine-generated Markdown.
//!
//! The engine's DOCX reader reproduces Word's run structure faithfully, which
//! is exactly the problem: a sentence bolded in one go but containing a quote
//! or an italic word comes out as several adjacent `**…**` runs, italic
//! phrases come out one `*word*` at a time, and every image carries a
//! `{width="…in" height="…in"}` attribute block the Markdown → JATS step has
//! no use for.
//!
//! ## Rule Order
//!
//! Single-asterisk italics are rewritten to underscores first so the bold
//! patterns only ever see `**`/`***` runs. Italics are consolidated after the
//! bold merge because merging can produce new adjacent italic spans.
//!
//! Every pattern stays on one line: a run never merges across a line break,
//! so list items and paragraphs are not joined.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Apply all Markdown fixups to the engine's DOCX → Markdown output.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF → LF)
/// 2. Single-asterisk italics `*x*` → `_x_` (bold runs untouched)
/// 3. Merge split bold / bold-italic runs
/// 4. Consolidate adjacent italic spans, `_a_ _b_` → `_a b_`
/// 5. Remove image dimension attribute blocks
/// 6. Ensure the file ends with exactly one newline
pub fn fix_markdown(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = underscore_italics(&s);
    let s = merge_split_bold(&s);
    let s = consolidate_italics(&s);
    let s = remove_image_dimensions(&s);
    ensure_final_newline(&s)
}

/// Apply `re` until the text stops changing.
///
/// Needed where one match consumes the delimiter a neighbouring match starts
/// with. Every rule using it strictly removes markers, so it terminates.
fn replace_until_stable(input: &str, re: &Regex, rep: &str) -> String {
    let mut current = input.to_string();
    loop {
        let next = re.replace_all(&current, rep).into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Single-asterisk italics → underscores ────────────────────────────

static RE_SINGLE_ASTERISK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[^*])\*([^*\n]+?)\*([^*]|$)").unwrap());

fn underscore_italics(input: &str) -> String {
    replace_until_stable(input, &RE_SINGLE_ASTERISK, "${1}_${2}_${3}")
}

// ── Rule 3: Merge split bold runs ────────────────────────────────────────────

/// (pattern, bold-italic result?) in application order.
static RE_SPLIT_BOLD: Lazy<Vec<(Regex, bool)>> = Lazy::new(|| {
    [
        // ***a*** ***b***
        (r"\*\*\*([^*\n]+?)\*\*\*[ \t]*\*\*\*([^*\n]+?)\*\*\*", true),
        // ***a*** **b**
        (r"\*\*\*([^*\n]+?)\*\*\*[ \t]*\*\*([^*\n]+?)\*\*", true),
        // **a** ***b***
        (r"\*\*([^*\n]+?)\*\*[ \t]*\*\*\*([^*\n]+?)\*\*\*", true),
        // **a** **b**
        (r"\*\*([^*\n]+?)\*\*[ \t]*\*\*([^*\n]+?)\*\*", false),
        // ***a*** ***b*
        (r"\*\*\*([^*\n]+?)\*\*\*[ \t]*\*\*\*([^*\n]+?)\*", true),
    ]
    .into_iter()
    .map(|(pattern, bold_italic)| (Regex::new(pattern).unwrap(), bold_italic))
    .collect()
});

fn merge_split_bold(input: &str) -> String {
    let mut s = input.to_string();
    for (re, bold_italic) in RE_SPLIT_BOLD.iter() {
        let marker = if *bold_italic { "***" } else { "**" };
        s = re
            .replace_all(&s, |caps: &Captures| {
                format!("{marker}{} {}{marker}", caps[1].trim(), caps[2].trim())
            })
            .into_owned();
    }
    s
}

// ── Rule 4: Consolidate adjacent italics ─────────────────────────────────────

static RE_ADJACENT_UNDERSCORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_([^_\n]+?)_[ \t]+_([^_\n]+?)_").unwrap());

static RE_ADJACENT_ASTERISK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|[^*])\*([^*\n]+?)\*[ \t]+\*([^*\n]+?)\*([^*]|$)").unwrap()
});

fn consolidate_italics(input: &str) -> String {
    let s = replace_until_stable(input, &RE_ADJACENT_UNDERSCORE, "_${1} ${2}_");
    replace_until_stable(&s, &RE_ADJACENT_ASTERISK, "${1}*${2} ${3}*${4}")
}

// ── Rule 5: Remove image dimension attributes ────────────────────────────────

static RE_DIMENSIONS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[ \t]*\{[^}\n]*\b(?:width|height)[ \t]*=[ \t]*"[^"\n]*"[^}\n]*\}"#).unwrap()
});

fn remove_image_dimensions(input: &str) -> String {
    RE_DIMENSIONS.replace_all(input, "").into_owned()
}

// ── Rule 6: Ensure file ends with single newline ─────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_single_asterisk_to_underscore() {
        assert_eq!(underscore_italics("an *emphasised* word"), "an _emphasised_ word");
        assert_eq!(underscore_italics("*a* *b*"), "_a_ _b_");
    }

    #[test]
    fn test_bold_is_not_treated_as_italic() {
        assert_eq!(underscore_italics("**bold** and ***both***"), "**bold** and ***both***");
    }

    #[test]
    fn test_list_markers_are_left_alone() {
        let list = "* first item\n* second item\n";
        assert_eq!(underscore_italics(list), list);
    }

    #[test]
    fn test_merge_bold_italic_pair() {
        assert_eq!(merge_split_bold("***Lorem*** ***ipsum***"), "***Lorem ipsum***");
    }

    #[test]
    fn test_merge_bold_italic_then_bold() {
        assert_eq!(merge_split_bold("***Lorem*** **ipsum**"), "***Lorem ipsum***");
        assert_eq!(merge_split_bold("**Lorem** ***ipsum***"), "***Lorem ipsum***");
    }

    #[test]
    fn test_merge_bold_pair() {
        assert_eq!(
            merge_split_bold("**A sentence split** **by Word.**"),
            "**A sentence split by Word.**"
        );
    }

    #[test]
    fn test_merge_partial_bold_italic() {
        assert_eq!(merge_split_bold("***Lorem*** ***ipsum*"), "***Lorem ipsum***");
    }

    #[test]
    fn test_bold_never_merges_across_lines() {
        let s = "**Heading one**\n**Heading two**";
        assert_eq!(merge_split_bold(s), s);
    }

    #[test]
    fn test_consolidate_underscore_italics() {
        assert_eq!(consolidate_italics("_Homo_ _sapiens_ _sapiens_ lives"), "_Homo sapiens sapiens_ lives");
    }

    #[test]
    fn test_consolidate_asterisk_italics() {
        assert_eq!(consolidate_italics("*in* *vitro*"), "*in vitro*");
        assert_eq!(consolidate_italics("**not** **italic**"), "**not** **italic**");
    }

    #[test]
    fn test_remove_image_dimensions() {
        assert_eq!(
            remove_image_dimensions(r#"![Alt](media/image1.png){width="6.26in" height="4.07in"}"#),
            "![Alt](media/image1.png)"
        );
        assert_eq!(remove_image_dimensions(r#"![x](a.png) {height="2in"}"#), "![x](a.png)");
    }

    #[test]
    fn test_dimensions_keep_following_line() {
        assert_eq!(
            remove_image_dimensions("![x](a.png){width=\"1in\"}\n\nFigure 1: cap"),
            "![x](a.png)\n\nFigure 1: cap"
        );
    }

    #[test]
    fn test_other_attribute_blocks_kept() {
        let s = "[span]{.smallcaps}";
        assert_eq!(remove_image_dimensions(s), s);
    }

    #[test]
    fn test_ensure_final_newline() {
        assert_eq!(ensure_final_newline("text\n\n\n"), "text\n");
        assert_eq!(ensure_final_newline(""), "\n");
    }

    #[test]
    fn test_fix_markdown_full_pipeline() {
        let input = "# Title\r\n\r\n*in* *vitro* study of ***split*** **bold**\r\n\r\n![Alt](img1.png){width=\"5in\"}\r\n\r\nFigure 1: A caption.";
        assert_eq!(
            fix_markdown(input),
            "# Title\n\n_in vitro_ study of ***split bold***\n\n![Alt](img1.png)\n\nFigure 1: A caption.\n"
        );
    }

    #[test]
    fn test_crlf_and_trailing_blank_lines_are_normalised() {
        assert_eq!(fix_markdown("*a* *b*\r\n\r\nText  \r\n\r\n\r\n"), "_a b_\n\nText\n");
        assert_eq!(fix_markdown(""), "\n");
    }
}

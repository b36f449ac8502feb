use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::node::Node;
use scraper::{ElementRef, Selector};

static IMG_LABELLED: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[alt], img[title]").unwrap());
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static INTERACTIVE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img, input, select, button, textarea, a").unwrap());

/// Tags whose text never reaches the reader.
const HIDDEN_TAGS: &[&str] = &["script", "style", "iframe", "noscript"];

/// Collapse every whitespace run (NBSP included) to a single space and trim.
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalized text content of an element, skipping script/style subtrees.
pub fn element_text(el: ElementRef<'_>) -> String {
    normalize_text(&raw_text(el))
}

pub fn raw_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_text(el, &mut out);
    out
}

fn collect_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&text.text),
            Node::Element(e) if HIDDEN_TAGS.contains(&e.name()) => {}
            Node::Element(e) if e.name() == "br" => out.push('\n'),
            Node::Element(_) => {
                if let Some(inner) = ElementRef::wrap(child) {
                    collect_text(inner, out);
                }
            }
            _ => {}
        }
    }
}

pub fn is_hidden_tag(name: &str) -> bool {
    HIDDEN_TAGS.contains(&name)
}

pub fn attr<'a>(el: ElementRef<'a>, name: &str) -> Option<&'a str> {
    el.value().attr(name)
}

/// Non-blank attribute value, trimmed.
pub fn attr_nonempty<'a>(el: ElementRef<'a>, name: &str) -> Option<&'a str> {
    attr(el, name).map(str::trim).filter(|v| !v.is_empty())
}

/// `parseInt`-style leading integer: "2px" → 2, "abc" → None.
pub fn leading_int(s: &str) -> Option<i64> {
    let s = s.trim();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|n| n * sign)
}

/// colspan/rowspan value, defaulting to 1.
pub fn span_of(cell: ElementRef<'_>, name: &str) -> i64 {
    attr(cell, name)
        .and_then(leading_int)
        .filter(|n| *n > 0)
        .unwrap_or(1)
}

pub fn child_elements<'a>(el: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    el.children().filter_map(ElementRef::wrap)
}

pub fn has_element_children(el: ElementRef<'_>) -> bool {
    child_elements(el).next().is_some()
}

/// Rows belonging to this table only: direct `tr` children and those of
/// its own thead/tbody/tfoot. Rows of nested tables are excluded.
pub fn table_rows<'a>(table: ElementRef<'a>) -> Vec<ElementRef<'a>> {
    let mut rows = Vec::new();
    for child in child_elements(table) {
        match child.value().name() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => {
                rows.extend(child_elements(child).filter(|r| r.value().name() == "tr"));
            }
            _ => {}
        }
    }
    rows
}

/// Direct td/th children of a row.
pub fn row_cells<'a>(row: ElementRef<'a>) -> Vec<ElementRef<'a>> {
    child_elements(row)
        .filter(|c| matches!(c.value().name(), "td" | "th"))
        .collect()
}

pub fn last_path_segment(src: &str) -> &str {
    src.rsplit('/').next().unwrap_or(src)
}

/// What a reader would see in a cell: its text, an image's alt/title (or
/// file name), a link's text or href, in that order.
pub fn extract_cell_content(cell: ElementRef<'_>) -> String {
    let inline = element_text(cell);
    if !inline.is_empty() {
        return inline;
    }

    if let Some(image) = cell.select(&IMG_LABELLED).next() {
        let alt = attr(image, "alt")
            .filter(|a| !a.is_empty())
            .or_else(|| attr(image, "title"))
            .unwrap_or("");
        if alt.is_empty() {
            if let Some(src) = attr_nonempty(image, "src") {
                return normalize_text(last_path_segment(src));
            }
        }
        return normalize_text(alt);
    }

    if let Some(link) = cell.select(&ANCHOR).next() {
        let text = element_text(link);
        if !text.is_empty() {
            return text;
        }
        return attr(link, "href").unwrap_or("").to_string();
    }

    String::new()
}

/// Whether a cell takes part in the row's logical column sequence. Drops the
/// 1–2px layout spacer cells the portal uses between every real column.
pub fn should_keep_cell(cell: ElementRef<'_>, content: &str) -> bool {
    if span_of(cell, "colspan") > 1 || span_of(cell, "rowspan") > 1 {
        return true;
    }
    if !content.is_empty() {
        return true;
    }
    if let Some(width) = attr(cell, "width").and_then(leading_int) {
        if width <= 2 {
            return false;
        }
    }
    if !has_element_children(cell) {
        return false;
    }
    if cell.select(&TABLE).next().is_some() {
        return true;
    }
    cell.select(&INTERACTIVE).next().is_some()
}

/// A retained cell with its extracted content.
#[derive(Debug, Clone)]
pub struct KeptCell<'a> {
    pub el: ElementRef<'a>,
    pub content: String,
}

pub fn kept_cells<'a>(row: ElementRef<'a>) -> Vec<KeptCell<'a>> {
    row_cells(row)
        .into_iter()
        .filter_map(|el| {
            let content = extract_cell_content(el);
            should_keep_cell(el, &content).then_some(KeptCell { el, content })
        })
        .collect()
}

/// Latin or Thai letter present.
pub fn has_letter(s: &str) -> bool {
    s.chars()
        .any(|c| c.is_ascii_alphabetic() || ('\u{0E00}'..='\u{0E7F}').contains(&c))
}

/// Bare positive integer such as "1" or "12"; rejects "0", "1.", "".
pub fn is_positive_integer(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) && s.chars().any(|c| c != '0')
}

/// First candidate table that contains none of the other candidates.
/// Wrapper tables repeat the text of what they wrap, so the inner one wins.
pub fn innermost<'a>(candidates: &[ElementRef<'a>]) -> Option<ElementRef<'a>> {
    let ids: HashSet<_> = candidates.iter().map(|c| c.id()).collect();
    candidates
        .iter()
        .find(|c| !c.select(&TABLE).any(|inner| ids.contains(&inner.id())))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn first<'a>(doc: &'a Html, css: &str) -> ElementRef<'a> {
        doc.select(&Selector::parse(css).unwrap()).next().unwrap()
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize_text("a\n\t b"), "a b");
        assert_eq!(normalize_text("  x\u{00A0}\u{00A0}y  "), "x y");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn normalize_is_idempotent() {
        for s in ["a\n\t b", " \u{00A0}lead", "ภาค  เรียน\r\n1/2568", "   "] {
            let once = normalize_text(s);
            assert_eq!(normalize_text(&once), once);
        }
    }

    #[test]
    fn leading_int_parses_like_parse_int() {
        assert_eq!(leading_int("2"), Some(2));
        assert_eq!(leading_int(" 1px"), Some(1));
        assert_eq!(leading_int("100%"), Some(100));
        assert_eq!(leading_int("abc"), None);
        assert_eq!(leading_int("-3"), Some(-3));
    }

    #[test]
    fn cell_content_priority() {
        let doc = Html::parse_document(
            r#"<table><tr>
                <td id="t"> Hello&nbsp; world </td>
                <td id="i"><img src="/img/ok.gif" alt="Done"></td>
                <td id="f"><img src="/img/icons/process.png" alt=""></td>
                <td id="l"><a href="/x.php"></a></td>
                <td id="e"></td>
            </tr></table>"#,
        );
        assert_eq!(extract_cell_content(first(&doc, "#t")), "Hello world");
        assert_eq!(extract_cell_content(first(&doc, "#i")), "Done");
        assert_eq!(extract_cell_content(first(&doc, "#f")), "process.png");
        assert_eq!(extract_cell_content(first(&doc, "#l")), "/x.php");
        assert_eq!(extract_cell_content(first(&doc, "#e")), "");
    }

    #[test]
    fn spacer_cells_dropped() {
        let doc = Html::parse_document(
            r#"<table><tr>
                <td width="1"></td>
                <td>1</td>
                <td width="2"><span></span></td>
                <td colspan="2"></td>
                <td><input type="checkbox"></td>
                <td><font></font></td>
            </tr></table>"#,
        );
        let row = first(&doc, "tr");
        let kept: Vec<_> = kept_cells(row)
            .iter()
            .map(|c| (c.content.clone(), span_of(c.el, "colspan")))
            .collect();
        assert_eq!(
            kept,
            vec![("1".to_string(), 1), (String::new(), 2), (String::new(), 1)]
        );
    }

    #[test]
    fn table_rows_skip_nested_tables() {
        let doc = Html::parse_document(
            "<table id='outer'><tr><td><table><tr><td>a</td></tr><tr><td>b</td></tr></table></td></tr>\
             <tr><td>c</td></tr></table>",
        );
        assert_eq!(table_rows(first(&doc, "#outer")).len(), 2);
    }

    #[test]
    fn innermost_prefers_wrapped_table() {
        let doc = Html::parse_document(
            "<table id='outer'><tr><td><table id='inner'><tr><td>x</td></tr></table></td></tr></table>",
        );
        let tables: Vec<_> = doc.select(&TABLE).collect();
        let picked = innermost(&tables).unwrap();
        assert_eq!(picked.value().id(), Some("inner"));
    }

    #[test]
    fn positive_integers() {
        assert!(is_positive_integer("1"));
        assert!(is_positive_integer("012"));
        assert!(!is_positive_integer("0"));
        assert!(!is_positive_integer(""));
        assert!(!is_positive_integer("1a"));
        assert!(!is_positive_integer("Total"));
    }

    #[test]
    fn letters_latin_or_thai() {
        assert!(has_letter("No."));
        assert!(has_letter("ลำดับ"));
        assert!(!has_letter("1 2 3"));
    }
}

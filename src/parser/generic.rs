use std::sync::LazyLock;

use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};

use super::text::{
    attr_nonempty, child_elements, element_text, has_letter, is_hidden_tag, kept_cells,
    normalize_text, row_cells, table_rows,
};
use crate::model::{Block, ContentModel, KeyValueItem, LinkItem};

static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());
static TITLE_CANDIDATE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, .title, .header").unwrap());
static DOC_TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static LIST_ITEM: LazyLock<Selector> = LazyLock::new(|| Selector::parse("li").unwrap());
static THEAD_TH: LazyLock<Selector> = LazyLock::new(|| Selector::parse("thead th").unwrap());
static FORM_CAPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("legend").unwrap());

pub const DEFAULT_TITLE: &str = "ข้อมูล";
pub const DEFAULT_LABEL: &str = "ข้อมูล";
pub const FORM_NOTE: &str =
    "ฟอร์มนี้ยังไม่รองรับในเวอร์ชันใหม่ กรุณาเปิดหน้าต้นฉบับเพื่อดำเนินการ";

const BLOCK_TAGS: &[&str] = &["p", "table", "ul", "ol", "h1", "h2", "h3", "h4", "form"];

/// Fallback for pages no specialized extractor recognizes.
pub fn extract(doc: &Html) -> ContentModel {
    let body = doc.select(&BODY).next();
    let mut walker = Walker::default();
    if let Some(body) = body {
        walker.visit_children(body);
    }
    walker.flush();

    ContentModel::new(None, document_title(doc, body), merge_links(walker.blocks))
}

fn document_title(doc: &Html, body: Option<ElementRef<'_>>) -> String {
    body.and_then(|b| b.select(&TITLE_CANDIDATE).next())
        .map(element_text)
        .filter(|t| !t.is_empty())
        .or_else(|| {
            doc.select(&DOC_TITLE)
                .next()
                .map(element_text)
                .filter(|t| !t.is_empty())
        })
        .unwrap_or_else(|| DEFAULT_TITLE.to_string())
}

#[derive(Default)]
struct Walker {
    blocks: Vec<Block>,
    buffer: String,
}

impl Walker {
    fn flush(&mut self) {
        let text = normalize_text(&self.buffer);
        if !text.is_empty() {
            self.blocks.push(Block::Paragraph { text });
        }
        self.buffer.clear();
    }

    fn visit_children(&mut self, el: ElementRef<'_>) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => {
                    self.buffer.push_str(&text.text);
                    self.buffer.push(' ');
                }
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        self.visit(child);
                    }
                }
                _ => {}
            }
        }
    }

    fn visit(&mut self, el: ElementRef<'_>) {
        let tag = el.value().name();
        if is_hidden_tag(tag) {
            return;
        }

        match tag {
            "br" => self.buffer.push('\n'),
            "hr" => {
                self.flush();
                self.blocks.push(Block::Divider);
            }
            "h1" | "h2" | "h3" | "h4" => {
                self.flush();
                let text = element_text(el);
                if !text.is_empty() {
                    let level = tag[1..].parse().unwrap_or(2);
                    self.blocks.push(Block::Heading { level, text });
                }
            }
            "p" => {
                self.flush();
                let text = element_text(el);
                if !text.is_empty() {
                    self.blocks.push(Block::Paragraph { text });
                }
            }
            "ul" | "ol" => {
                self.flush();
                let items: Vec<String> = el
                    .select(&LIST_ITEM)
                    .map(element_text)
                    .filter(|t| !t.is_empty())
                    .collect();
                if !items.is_empty() {
                    self.blocks.push(Block::List {
                        ordered: tag == "ol",
                        items,
                    });
                }
            }
            "table" => {
                self.flush();
                if let Some(items) = extract_key_value_table(el) {
                    self.blocks.push(Block::KeyValue { items });
                } else {
                    let table = extract_general_table(el);
                    if !table.rows.is_empty() {
                        self.blocks.push(Block::Table {
                            headers: table.headers,
                            rows: table.rows,
                        });
                    }
                }
            }
            "a" if self.push_link(el) => {}
            "form" => {
                self.flush();
                self.blocks.push(Block::info(form_caption(el)));
            }
            _ => {
                let text = element_text(el);
                if has_nested_blocks(el) || text.is_empty() {
                    self.visit_children(el);
                } else {
                    self.buffer.push_str(&text);
                    self.buffer.push(' ');
                }
            }
        }
    }

    /// Anchor with both href and label becomes a links block.
    fn push_link(&mut self, el: ElementRef<'_>) -> bool {
        let Some(href) = attr_nonempty(el, "href") else {
            return false;
        };
        let label = element_text(el);
        if label.is_empty() {
            return false;
        }
        self.flush();
        self.blocks.push(Block::Links {
            items: vec![LinkItem {
                label,
                href: href.to_string(),
            }],
        });
        true
    }
}

fn has_nested_blocks(el: ElementRef<'_>) -> bool {
    child_elements(el).any(|c| BLOCK_TAGS.contains(&c.value().name()))
}

fn form_caption(form: ElementRef<'_>) -> String {
    attr_nonempty(form, "title")
        .map(normalize_text)
        .or_else(|| {
            form.select(&FORM_CAPTION)
                .next()
                .map(element_text)
                .filter(|t| !t.is_empty())
        })
        .unwrap_or_else(|| FORM_NOTE.to_string())
}

/// Consecutive single-link blocks read as one link list.
fn merge_links(blocks: Vec<Block>) -> Vec<Block> {
    let mut merged: Vec<Block> = Vec::with_capacity(blocks.len());
    for block in blocks {
        if let (Some(Block::Links { items: prev }), Block::Links { items }) =
            (merged.last_mut(), &block)
        {
            prev.extend(items.iter().cloned());
            continue;
        }
        merged.push(block);
    }
    merged
}

/// A table read as label/value pairs. `None` when any row is wider than
/// three cells or nothing usable remains.
pub fn extract_key_value_table(table: ElementRef<'_>) -> Option<Vec<KeyValueItem>> {
    let mut items = Vec::new();
    for row in table_rows(table) {
        let cells = row_cells(row);
        if cells.is_empty() {
            continue;
        }
        if cells.len() > 3 {
            return None;
        }
        let label = element_text(cells[0]);
        let value = normalize_text(
            &cells[1..]
                .iter()
                .map(|c| element_text(*c))
                .collect::<Vec<_>>()
                .join(" "),
        );
        if label.is_empty() && value.is_empty() {
            continue;
        }
        items.push(KeyValueItem {
            label: if label.is_empty() {
                DEFAULT_LABEL.to_string()
            } else {
                label
            },
            value,
        });
    }
    (!items.is_empty()).then_some(items)
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneralTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Every row comes out exactly `headers.len()` wide.
pub fn extract_general_table(table: ElementRef<'_>) -> GeneralTable {
    let mut headers: Vec<String> = table.select(&THEAD_TH).map(element_text).collect();

    let mut rows: Vec<Vec<String>> = table_rows(table)
        .into_iter()
        .filter(|row| !in_thead(*row))
        .map(|row| {
            kept_cells(row)
                .into_iter()
                .map(|c| c.content)
                .collect::<Vec<_>>()
        })
        .filter(|cells| cells.iter().any(|c| !c.is_empty()))
        .collect();

    if headers.is_empty() && !rows.is_empty() {
        let same_length = rows.get(1).map_or(true, |next| next.len() == rows[0].len());
        let promote = same_length && rows[0].iter().any(|c| has_letter(c));
        if promote {
            headers = rows.remove(0);
        }
    }

    let columns = rows
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(headers.len()))
        .max()
        .unwrap_or(0);

    for row in &mut rows {
        row.resize(columns, String::new());
    }
    while headers.len() < columns {
        headers.push(placeholder(headers.len()));
    }

    GeneralTable { headers, rows }
}

fn placeholder(index: usize) -> String {
    format!("ข้อมูลที่ {}", index + 1)
}

fn in_thead(row: ElementRef<'_>) -> bool {
    row.parent()
        .and_then(ElementRef::wrap)
        .is_some_and(|p| p.value().name() == "thead")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_of(html: &str) -> Html {
        Html::parse_document(html)
    }

    fn first_table(doc: &Html) -> ElementRef<'_> {
        doc.select(&Selector::parse("table").unwrap()).next().unwrap()
    }

    #[test]
    fn key_value_shape() {
        let doc = table_of(
            "<table><tr><td>รหัส</td><td>6501</td></tr>\
             <tr><td></td><td>ค่า</td><td>เพิ่ม</td></tr>\
             <tr><td></td><td></td></tr></table>",
        );
        let items = extract_key_value_table(first_table(&doc)).unwrap();
        assert_eq!(
            items,
            vec![
                KeyValueItem {
                    label: "รหัส".into(),
                    value: "6501".into()
                },
                KeyValueItem {
                    label: "ข้อมูล".into(),
                    value: "ค่า เพิ่ม".into()
                },
            ]
        );
    }

    #[test]
    fn key_value_rejects_wide_rows() {
        let doc = table_of(
            "<table><tr><td>a</td><td>b</td></tr><tr><td>1</td><td>2</td><td>3</td><td>4</td></tr></table>",
        );
        assert!(extract_key_value_table(first_table(&doc)).is_none());
    }

    #[test]
    fn general_table_rows_match_header_width() {
        let doc = table_of(
            "<table>\
             <tr><td>Name</td><td>Code</td><td>Credit</td><td>Room</td></tr>\
             <tr><td>Math</td><td>01</td><td>3</td><td>E12</td></tr>\
             <tr><td>Physics</td><td>02</td></tr>\
             <tr><td>Lab</td><td>03</td><td>1</td><td>E1</td><td>extra</td></tr>\
             </table>",
        );
        let table = extract_general_table(first_table(&doc));
        assert_eq!(
            table.headers,
            vec!["Name", "Code", "Credit", "Room", "ข้อมูลที่ 5"]
        );
        assert_eq!(table.rows.len(), 3);
        for row in &table.rows {
            assert_eq!(row.len(), table.headers.len());
        }
        assert_eq!(table.rows[1], vec!["Physics", "02", "", "", ""]);
    }

    #[test]
    fn numeric_first_row_not_promoted() {
        let doc = table_of(
            "<table><tr><td>1</td><td>2</td><td>3</td><td>4</td></tr>\
             <tr><td>5</td><td>6</td><td>7</td><td>8</td></tr></table>",
        );
        let table = extract_general_table(first_table(&doc));
        assert_eq!(
            table.headers,
            vec!["ข้อมูลที่ 1", "ข้อมูลที่ 2", "ข้อมูลที่ 3", "ข้อมูลที่ 4"]
        );
        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn header_round_trip_is_stable() {
        let doc = table_of(
            "<table><thead><tr><th>วิชา</th><th></th><th>Grade</th></tr></thead>\
             <tbody><tr><td>Math</td><td>3</td><td>A</td><td>x</td></tr></tbody></table>",
        );
        let first = extract_general_table(first_table(&doc));
        assert_eq!(first.headers, vec!["วิชา", "", "Grade", "ข้อมูลที่ 4"]);

        let ths: String = first
            .headers
            .iter()
            .map(|h| format!("<th>{h}</th>"))
            .collect();
        let tds: String = first.rows[0].iter().map(|c| format!("<td>{c}</td>")).collect();
        let rebuilt = table_of(&format!(
            "<table><thead><tr>{ths}</tr></thead><tbody><tr>{tds}</tr></tbody></table>"
        ));
        let second = extract_general_table(first_table(&rebuilt));
        assert_eq!(second.headers, first.headers);
        assert_eq!(second.rows, first.rows);
    }

    #[test]
    fn generic_scenario() {
        let doc = Html::parse_document(
            r#"<body><h2>Info</h2><p>Hello</p><ul><li>A</li><li>B</li></ul><a href="/x">X</a></body>"#,
        );
        let model = extract(&doc);
        assert_eq!(model.title, "Info");
        assert_eq!(
            model.blocks,
            vec![
                Block::Heading {
                    level: 2,
                    text: "Info".into()
                },
                Block::Paragraph {
                    text: "Hello".into()
                },
                Block::List {
                    ordered: false,
                    items: vec!["A".into(), "B".into()]
                },
                Block::Links {
                    items: vec![LinkItem {
                        label: "X".into(),
                        href: "/x".into()
                    }]
                },
            ]
        );
    }

    #[test]
    fn adjacent_links_merge_text_splits_them() {
        let doc = Html::parse_document(
            r#"<body><a href="/a">A</a><a href="/b">B</a> between <a href="/c">C</a></body>"#,
        );
        let model = extract(&doc);
        assert_eq!(model.blocks.len(), 3);
        assert!(matches!(&model.blocks[0], Block::Links { items } if items.len() == 2));
        assert_eq!(
            model.blocks[1],
            Block::Paragraph {
                text: "between".into()
            }
        );
        assert!(matches!(&model.blocks[2], Block::Links { items } if items.len() == 1));
    }

    #[test]
    fn forms_scripts_and_dividers() {
        let doc = Html::parse_document(
            r#"<html><head><title>Portal</title></head><body>
               <script>var x = 1;</script>
               loose <b>text</b><br>here
               <hr>
               <form action="/save.php"><input name="q"></form>
               <form title="ค้นหา"><input name="q"></form>
               </body></html>"#,
        );
        let model = extract(&doc);
        assert_eq!(model.title, "Portal");
        assert_eq!(
            model.blocks,
            vec![
                Block::Paragraph {
                    text: "loose text here".into()
                },
                Block::Divider,
                Block::info(FORM_NOTE),
                Block::info("ค้นหา"),
            ]
        );
    }

    #[test]
    fn nested_containers_are_descended() {
        let doc = Html::parse_document(
            "<body><div><span>intro</span><p>Body</p><div><h3>Sub</h3></div></div>\
             <div><span>flat <b>text</b></span><div>inline</div></div><div><hr></div></body>",
        );
        let model = extract(&doc);
        assert_eq!(
            model.blocks,
            vec![
                Block::Paragraph {
                    text: "intro".into()
                },
                Block::Paragraph {
                    text: "Body".into()
                },
                Block::Heading {
                    level: 3,
                    text: "Sub".into()
                },
                Block::Paragraph {
                    text: "flat textinline".into()
                },
                Block::Divider,
            ]
        );
    }

    #[test]
    fn inline_leaf_joins_text_without_spaces() {
        let doc = Html::parse_document("<body><div><span>a</span><div>b</div></div></body>");
        let model = extract(&doc);
        assert_eq!(model.blocks, vec![Block::Paragraph { text: "ab".into() }]);
    }

    #[test]
    fn lone_header_row_is_promoted_and_dropped() {
        let doc = table_of("<table><tr><td>Name</td><td>Value</td></tr></table>");
        let table = extract_general_table(first_table(&doc));
        assert_eq!(table.headers, vec!["Name", "Value"]);
        assert!(table.rows.is_empty());

        let page = Html::parse_document(
            "<body><p>before</p><table><tr><td>Name</td><td>Value</td><td>x</td><td>y</td></tr></table></body>",
        );
        let model = extract(&page);
        assert_eq!(model.blocks, vec![Block::Paragraph { text: "before".into() }]);
    }

    #[test]
    fn empty_thead_cells_stay_empty() {
        let doc = table_of(
            "<table><thead><tr><th></th><th>B</th></tr></thead>             <tbody><tr><td>1</td><td>2</td><td>3</td></tr></tbody></table>",
        );
        let table = extract_general_table(first_table(&doc));
        assert_eq!(table.headers, vec!["", "B", "ข้อมูลที่ 3"]);
        assert_eq!(table.rows, vec![vec!["1", "2", "3"]]);
    }

    #[test]
    fn title_and_paragraph_scenario() {
        let doc = Html::parse_document("<body><h1>Title</h1><p>Hello</p></body>");
        let model = extract(&doc);
        assert_eq!(model.title, "Title");
        assert_eq!(model.kind, None);
        assert_eq!(
            model.blocks,
            vec![
                Block::Heading {
                    level: 1,
                    text: "Title".into()
                },
                Block::Paragraph {
                    text: "Hello".into()
                },
            ]
        );
    }
}

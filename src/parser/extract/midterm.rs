use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::score::{map_assessment, map_legend_item, parse_header, score_cells, ScoreCell};
use super::{tables, EditForm};
use crate::model::{
    Block, ContentKind, ContentModel, MidtermScoreBlock, ScoreCourse, ScoreLegendItem,
    ScoreboardHeader,
};
use crate::parser::text::{element_text, innermost, is_positive_integer, table_rows};
use crate::parser::MapOptions;

static NOTE_CANDIDATE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("p, strong").unwrap());

static ORDER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^No\.?$").unwrap());
static COURSE_NO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)Course No").unwrap());
static COURSE_TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Course Title").unwrap());
static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^Section$").unwrap());

pub const TITLE: &str = "ข้อมูลคะแนนเก็บ";
const DEFAULT_ACTION: &str = "midterm_score.php";
const LEGEND_MAX_ROWS: usize = 10;

/// Where each field sits among a row's retained cells.
#[derive(Debug, Clone, PartialEq)]
struct Columns {
    order: usize,
    number: usize,
    title: usize,
    section: usize,
    first_assessment: usize,
}

#[derive(Debug)]
struct HeaderRow {
    index: usize,
    columns: Columns,
    assessments: Vec<String>,
}

pub fn extract(doc: &Html, _options: &MapOptions) -> Option<ContentModel> {
    let table = find_score_table(doc)?;
    let rows = table_rows(table);
    let header_row = locate_header(&rows)?;

    let courses = parse_courses(&rows[header_row.index + 1..], &header_row);
    if courses.is_empty() {
        return None;
    }

    let header = parse_header(rows[..header_row.index].iter().map(|r| element_text(*r)));
    let form = EditForm::find(doc).unwrap_or_default();
    let subtitle = header.semester.as_ref().map(|s| format!("ภาคเรียน {s}"));

    let block = MidtermScoreBlock {
        action_url: form
            .action
            .clone()
            .unwrap_or_else(|| DEFAULT_ACTION.to_string()),
        years: form.years(),
        semesters: form.semesters(),
        selected_year: form.selected_year(),
        selected_semester: form.selected_semester(),
        header: Some(header).filter(|h| *h != ScoreboardHeader::default()),
        assessments: header_row.assessments,
        courses,
        legend: extract_legend(doc),
        note: extract_note(doc),
    };

    Some(
        ContentModel::new(
            Some(ContentKind::MidtermScore),
            TITLE,
            vec![Block::MidtermScore(block)],
        )
        .with_subtitle(subtitle),
    )
}

/// Largest table naming course and section columns; earliest wins ties.
fn find_score_table(doc: &Html) -> Option<ElementRef<'_>> {
    let mut best: Option<(ElementRef<'_>, usize)> = None;
    for table in tables(doc) {
        let text = element_text(table);
        let qualifies = (text.contains("Course Title") || text.contains("Course No"))
            && text.contains("Section");
        if !qualifies {
            continue;
        }
        let rows = table_rows(table).len();
        if best.map_or(true, |(_, n)| rows > n) {
            best = Some((table, rows));
        }
    }
    best.map(|(t, _)| t)
}

fn locate_header(rows: &[ElementRef<'_>]) -> Option<HeaderRow> {
    rows.iter().enumerate().find_map(|(index, row)| {
        let texts: Vec<String> = score_cells(*row).into_iter().map(|c| c.text).collect();
        if texts.len() < 5 {
            return None;
        }
        let has = |re: &Regex| texts.iter().any(|t| re.is_match(t));
        if !has(&COURSE_TITLE_RE) || !has(&COURSE_NO_RE) {
            return None;
        }

        let position = |re: &Regex, fallback: usize| {
            texts.iter().position(|t| re.is_match(t)).unwrap_or(fallback)
        };
        let section = texts.iter().position(|t| SECTION_RE.is_match(t));
        let columns = Columns {
            order: position(&ORDER_RE, 0),
            number: position(&COURSE_NO_RE, 1),
            title: position(&COURSE_TITLE_RE, 2),
            section: section.unwrap_or(3),
            first_assessment: section.map_or(4, |s| s + 1),
        };
        let assessments = texts[columns.first_assessment.min(texts.len())..]
            .iter()
            .filter(|t| !t.is_empty())
            .cloned()
            .collect();

        Some(HeaderRow {
            index,
            columns,
            assessments,
        })
    })
}

fn parse_courses(rows: &[ElementRef<'_>], header: &HeaderRow) -> Vec<ScoreCourse> {
    let cols = &header.columns;
    rows.iter()
        .filter_map(|row| {
            let cells = score_cells(*row);
            let text_at = |i: usize| cells.get(i).map(|c| c.text.clone()).unwrap_or_default();

            let order = text_at(cols.order);
            if !is_positive_integer(&order) {
                return None;
            }

            let assessments = header
                .assessments
                .iter()
                .enumerate()
                .map(|(i, label)| map_assessment(label, cells.get(cols.first_assessment + i)))
                .collect();

            Some(ScoreCourse {
                order,
                course_number: text_at(cols.number),
                course_title: text_at(cols.title),
                section: text_at(cols.section),
                assessments,
            })
        })
        .collect()
}

fn extract_legend(doc: &Html) -> Vec<ScoreLegendItem> {
    let candidates: Vec<_> = tables(doc)
        .into_iter()
        .filter(|t| table_rows(*t).len() <= LEGEND_MAX_ROWS)
        .filter(|t| {
            let text = element_text(*t);
            text.contains("สัญลักษณ์") && text.contains("ความหมาย")
        })
        .collect();
    let Some(table) = innermost(&candidates) else {
        return Vec::new();
    };

    table_rows(table)
        .into_iter()
        .skip(1)
        .filter_map(|row| {
            let cells: Vec<ScoreCell> = score_cells(row);
            if cells.len() < 2 {
                return None;
            }
            let description = cells.last()?.text.clone();
            if description.is_empty() {
                return None;
            }
            Some(map_legend_item(&cells[0], description))
        })
        .collect()
}

fn extract_note(doc: &Html) -> Option<String> {
    doc.select(&NOTE_CANDIDATE)
        .map(element_text)
        .find(|t| t.starts_with("หมายเหตุ"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ScoreAssessment, ScoreStatus};
    use crate::parser::{map_document, MapOptions};

    #[test]
    fn midterm_scenario() {
        let doc = Html::parse_document(
            "<body><table>\
             <tr><td>No.</td><td>Course No</td><td>Course Title</td><td>Section</td><td>Quiz1</td><td>Midterm</td></tr>\
             <tr><td>1</td><td>01006007</td><td>Intro to CS</td><td>1</td><td>85</td><td>-</td></tr>\
             </table></body>",
        );
        let model = map_document(&doc, &MapOptions::with_url("https://reg.test/midterm_score.php"));
        assert_eq!(model.kind, Some(ContentKind::MidtermScore));
        assert_eq!(model.title, TITLE);
        assert!(model.subtitle.is_none());

        let Block::MidtermScore(block) = &model.blocks[0] else {
            panic!("expected midterm block");
        };
        assert_eq!(block.action_url, "midterm_score.php");
        assert_eq!(block.assessments, vec!["Quiz1", "Midterm"]);
        assert!(block.header.is_none());
        assert_eq!(
            block.courses,
            vec![ScoreCourse {
                order: "1".into(),
                course_number: "01006007".into(),
                course_title: "Intro to CS".into(),
                section: "1".into(),
                assessments: vec![
                    ScoreAssessment {
                        label: "Quiz1".into(),
                        status: ScoreStatus::Score,
                        display: "85".into(),
                        raw: "85".into(),
                    },
                    ScoreAssessment {
                        label: "Midterm".into(),
                        status: ScoreStatus::NotEntered,
                        display: "ไม่มีข้อมูล".into(),
                        raw: "-".into(),
                    },
                ],
            }]
        );
    }

    #[test]
    fn no_courses_no_model() {
        let doc = Html::parse_document(
            "<table><tr><td>No.</td><td>Course No</td><td>Course Title</td><td>Section</td><td>Quiz1</td></tr>\
             <tr><td>Total</td><td></td><td></td><td></td><td>10</td></tr></table>",
        );
        assert!(extract(&doc, &MapOptions::default()).is_none());
    }

    #[test]
    fn largest_table_tie_goes_to_first() {
        let table = |code: &str| {
            format!(
                "<table><tr><td>No.</td><td>Course No</td><td>Course Title</td><td>Section</td><td>Quiz</td></tr>\
                 <tr><td>1</td><td>{code}</td><td>T</td><td>1</td><td>5</td></tr></table>"
            )
        };
        let doc = Html::parse_document(&format!("<body>{}{}</body>", table("AAA"), table("BBB")));
        let model = extract(&doc, &MapOptions::default()).unwrap();
        let Block::MidtermScore(block) = &model.blocks[0] else {
            panic!("expected midterm block");
        };
        assert_eq!(block.courses[0].course_number, "AAA");
    }

    #[test]
    fn fixture_page() {
        let html = std::fs::read_to_string("tests/fixtures/midterm.html").unwrap();
        let doc = Html::parse_document(&html);
        let model = extract(&doc, &MapOptions::default()).unwrap();
        assert_eq!(model.subtitle.as_deref(), Some("ภาคเรียน 1/2568"));

        let Block::MidtermScore(block) = &model.blocks[0] else {
            panic!("expected midterm block");
        };
        let header = block.header.as_ref().unwrap();
        assert_eq!(header.student_id.as_deref(), Some("65010001"));
        assert_eq!(header.student_thai_name.as_deref(), Some("นายสมชาย ใจดี"));
        assert_eq!(header.major.as_deref(), Some("Computer Engineering"));

        assert_eq!(block.assessments, vec!["Quiz 1", "Lab", "Midterm"]);
        assert_eq!(block.courses.len(), 2);
        let second = &block.courses[1];
        assert_eq!(second.course_title, "DIGITAL SYSTEMS");
        assert_eq!(second.assessments[0].status, ScoreStatus::Processing);
        assert_eq!(second.assessments[1].status, ScoreStatus::NotAnnounced);
        assert_eq!(second.assessments[2].status, ScoreStatus::NotEntered);

        assert_eq!(block.legend.len(), 3);
        assert_eq!(block.legend[0].status, ScoreStatus::Processing);
        assert_eq!(block.legend[2].label, "-");

        assert_eq!(block.selected_year.as_deref(), Some("2568"));
        assert_eq!(block.semesters.len(), 3);
        assert_eq!(block.action_url, "midterm_score.php");
        assert!(block.note.as_deref().unwrap().starts_with("หมายเหตุ"));
    }
}

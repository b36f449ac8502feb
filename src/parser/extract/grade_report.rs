use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::score::parse_header;
use super::{tables, EditForm};
use crate::model::{
    Block, ContentKind, ContentModel, GradeReportBlock, GradeReportCourse, GradeReportLegendItem,
    GradeReportSummary, ScheduleOption, ScoreboardHeader, SymbolColor,
};
use crate::parser::text::{
    attr, element_text, innermost, is_positive_integer, leading_int, row_cells, table_rows,
};
use crate::parser::MapOptions;

static COLORED_FONT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("font[color]").unwrap());
static FONT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("font").unwrap());
static PDF_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href*='report_gradetable_pdf']").unwrap());

static TERM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)/(\d+)").unwrap());
static FACULTY_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^Faculty of\s*").unwrap());

pub const TITLE: &str = "ข้อมูลผลการเรียน";
pub const FORM_SUBTITLE: &str = "เลือกปีการศึกษาและภาคเรียนเพื่อดูผลการเรียน";
const DEFAULT_ACTION: &str = "report_gradetable_show.php";
const SUMMARY_MAX_ROWS: usize = 15;
const LEGEND_MAX_ROWS: usize = 10;
const NOTE_MIN_CHARS: usize = 100;

/// Both the picker page and the results page map; the picker page simply
/// has no course table.
pub fn extract(doc: &Html, _options: &MapOptions) -> Option<ContentModel> {
    let form = EditForm::find(doc).unwrap_or_default();
    let mut block = GradeReportBlock {
        action_url: form
            .action
            .clone()
            .unwrap_or_else(|| DEFAULT_ACTION.to_string()),
        pdf_url: None,
        years: form.years(),
        semesters: form.semesters(),
        selected_year: form.selected_year(),
        selected_semester: form.selected_semester(),
        header: None,
        courses: Vec::new(),
        summaries: Vec::new(),
        legend: Vec::new(),
        note: None,
    };

    let all_tables = tables(doc);
    let Some(course_table) = find_course_table(&all_tables) else {
        return Some(
            ContentModel::new(
                Some(ContentKind::GradeReport),
                TITLE,
                vec![Block::GradeReport(block)],
            )
            .with_subtitle(Some(FORM_SUBTITLE.to_string())),
        );
    };

    let header = extract_header(course_table);
    block.courses = extract_courses(course_table);
    block.summaries = find_summary_table(&all_tables)
        .map(extract_summaries)
        .unwrap_or_default();

    if let Some(legend_table) = find_legend_table(&all_tables) {
        block.legend = extract_legend(legend_table);
        block.note = extract_note(legend_table);
    }
    block.pdf_url = doc
        .select(&PDF_LINK)
        .next()
        .and_then(|a| attr(a, "href"))
        .filter(|h| !h.is_empty())
        .map(str::to_string);

    if block.years.is_empty() {
        synthesize_terms(&mut block, header.as_ref());
    }

    let subtitle = header.as_ref().and_then(|h| h.semester.clone());
    block.header = header;

    Some(
        ContentModel::new(
            Some(ContentKind::GradeReport),
            TITLE,
            vec![Block::GradeReport(block)],
        )
        .with_subtitle(subtitle),
    )
}

/// Results pages without a picker still get one, built around the term shown.
fn synthesize_terms(block: &mut GradeReportBlock, header: Option<&ScoreboardHeader>) {
    let Some(semester) = header.and_then(|h| h.semester.as_deref()) else {
        return;
    };
    let Some(caps) = TERM_RE.captures(semester) else {
        return;
    };
    let Ok(year) = caps[2].parse::<i64>() else {
        return;
    };

    block.selected_semester = Some(caps[1].to_string());
    block.selected_year = Some(caps[2].to_string());
    block.years = (0..=2)
        .map(|back| ScheduleOption::same((year - back).to_string()))
        .collect();
    block.semesters = ["1", "2", "3"].into_iter().map(ScheduleOption::same).collect();
}

/// Table with the most wide (> 5 cell) rows among those naming course columns.
fn find_course_table<'a>(all_tables: &[ElementRef<'a>]) -> Option<ElementRef<'a>> {
    let mut best: Option<(ElementRef<'a>, usize)> = None;
    for table in all_tables {
        let text = element_text(*table);
        let qualifies = text.contains("Course No")
            && text.contains("Grade")
            && (text.contains("Course Title") || text.contains("Section"));
        if !qualifies {
            continue;
        }
        let wide_rows = table_rows(*table)
            .into_iter()
            .filter(|r| row_cells(*r).len() > 5)
            .count();
        if wide_rows > best.map_or(0, |(_, n)| n) {
            best = Some((*table, wide_rows));
        }
    }
    best.map(|(t, _)| t)
}

fn find_summary_table<'a>(all_tables: &[ElementRef<'a>]) -> Option<ElementRef<'a>> {
    let candidates: Vec<_> = all_tables
        .iter()
        .copied()
        .filter(|t| {
            let rows = table_rows(*t);
            rows.len() <= SUMMARY_MAX_ROWS && rows.iter().take(3).any(|r| is_summary_header(*r))
        })
        .collect();
    innermost(&candidates)
}

fn is_summary_header(row: ElementRef<'_>) -> bool {
    let text = element_text(row);
    text.contains("CA") && text.contains("CP") && text.contains("GP")
}

fn has_x_glyph(table: ElementRef<'_>) -> bool {
    table
        .select(&COLORED_FONT)
        .any(|font| element_text(font) == "X")
}

fn find_legend_table<'a>(all_tables: &[ElementRef<'a>]) -> Option<ElementRef<'a>> {
    let candidates: Vec<_> = all_tables
        .iter()
        .copied()
        .filter(|t| {
            let rows = table_rows(*t);
            rows.len() <= LEGEND_MAX_ROWS
                && has_x_glyph(*t)
                && rows.iter().any(|r| row_cells(*r).len() == 2)
        })
        .collect();
    innermost(&candidates)
}

/// Header lines live in the course table's own banner rows.
fn extract_header(table: ElementRef<'_>) -> Option<ScoreboardHeader> {
    let lines = table_rows(table).into_iter().filter_map(|row| {
        let cells = row_cells(row);
        if cells.len() == 1 && attr(cells[0], "height") == Some("1") {
            return None;
        }
        Some(element_text(row))
    });
    let mut header = parse_header(lines);
    header.student_id.as_ref()?;
    header.faculty = header
        .faculty
        .map(|f| FACULTY_PREFIX_RE.replace(&f, "").trim().to_string());
    Some(header)
}

fn is_spacer_row(row: ElementRef<'_>) -> bool {
    if attr(row, "height") == Some("1") {
        return true;
    }
    let cells = row_cells(row);
    cells.len() == 1 && element_text(cells[0]).is_empty()
}

/// Texts of the non-separator cells, blanks removed.
fn data_texts(row: ElementRef<'_>) -> (usize, Vec<String>) {
    let cells: Vec<String> = row_cells(row)
        .into_iter()
        .filter(|cell| {
            let narrow = attr(*cell, "width")
                .and_then(leading_int)
                .is_some_and(|w| w <= 1);
            let blank_white = attr(*cell, "bgcolor")
                .is_some_and(|c| c.eq_ignore_ascii_case("#FFFFFF"))
                && element_text(*cell).is_empty();
            !narrow && !blank_white
        })
        .map(element_text)
        .collect();
    let count = cells.len();
    (count, cells.into_iter().filter(|t| !t.is_empty()).collect())
}

fn extract_courses(table: ElementRef<'_>) -> Vec<GradeReportCourse> {
    let rows = table_rows(table);
    let Some(header_index) = rows.iter().position(|r| {
        let text = element_text(*r);
        text.contains("No.") && text.contains("Course No.") && text.contains("Grade")
    }) else {
        return Vec::new();
    };

    rows[header_index + 1..]
        .iter()
        .filter(|r| !is_spacer_row(**r))
        .filter_map(|row| {
            let (count, texts) = data_texts(*row);
            if count < 7 || texts.len() < 6 || !is_positive_integer(&texts[0]) {
                return None;
            }
            let field = |i: usize| texts.get(i).cloned().unwrap_or_default();
            let course = GradeReportCourse {
                no: field(0),
                course_no: field(1),
                course_title: field(2),
                section: field(3),
                credit: field(4),
                course_type: field(5),
                grade: texts.get(6).cloned().unwrap_or_else(|| "-".to_string()),
            };
            (!course.course_no.is_empty()).then_some(course)
        })
        .collect()
}

fn extract_summaries(table: ElementRef<'_>) -> Vec<GradeReportSummary> {
    let rows = table_rows(table);
    let Some(header_index) = rows.iter().position(|r| is_summary_header(*r)) else {
        return Vec::new();
    };

    rows[header_index + 1..]
        .iter()
        .filter(|r| !is_spacer_row(**r))
        .filter_map(|row| {
            let (_, texts) = data_texts(*row);
            let field = |i: usize| texts.get(i).cloned().unwrap_or_default();

            // "Pre-Semester" carries only GP and GPA.
            if texts.len() == 3 && texts[0].contains("Pre") {
                return Some(GradeReportSummary {
                    label: field(0),
                    ca: String::new(),
                    cp: String::new(),
                    cd: String::new(),
                    gp: field(1),
                    gps_gpa: field(2),
                    status: String::new(),
                });
            }
            if texts.len() < 7 {
                return None;
            }
            Some(GradeReportSummary {
                label: field(0),
                ca: field(1),
                cp: field(2),
                cd: field(3),
                gp: field(4),
                gps_gpa: field(5),
                status: field(6),
            })
        })
        .collect()
}

fn symbol_color(cell: ElementRef<'_>) -> SymbolColor {
    let color = cell
        .select(&FONT)
        .next()
        .and_then(|f| attr(f, "color"))
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if color.contains("00ff00") {
        SymbolColor::Green
    } else if color.contains("ff0000") {
        SymbolColor::Red
    } else {
        SymbolColor::Gray
    }
}

fn extract_legend(table: ElementRef<'_>) -> Vec<GradeReportLegendItem> {
    table_rows(table)
        .into_iter()
        .skip(1)
        .filter_map(|row| {
            let cells = row_cells(row);
            if cells.len() < 2 || attr(cells[0], "colspan").is_some() {
                return None;
            }
            let description = element_text(cells[1]);
            if description.is_empty() {
                return None;
            }
            Some(GradeReportLegendItem {
                symbol: element_text(cells[0]),
                symbol_color: symbol_color(cells[0]),
                description,
            })
        })
        .collect()
}

/// Long free-text cell spanning the legend table, not a header line.
fn extract_note(table: ElementRef<'_>) -> Option<String> {
    table_rows(table).into_iter().find_map(|row| {
        let cell = row_cells(row)
            .into_iter()
            .find(|c| attr(*c, "colspan").is_some())?;
        let text = element_text(cell);
        let is_note = text.chars().count() > NOTE_MIN_CHARS
            && !["ID:", "Name:", "Faculty", "Major:"]
                .iter()
                .any(|marker| text.contains(marker));
        is_note.then_some(text)
    })
}

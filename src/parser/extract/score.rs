//! Pieces shared by the midterm score and grade report pages: score cells,
//! the assessment status mapping, and the student header block.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};

use crate::model::{ScoreAssessment, ScoreLegendItem, ScoreStatus, ScoreboardHeader};
use crate::parser::text::{
    attr, attr_nonempty, element_text, has_element_children, last_path_segment, leading_int,
    normalize_text, row_cells,
};

static IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());

static ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"ID:\s*(\d+)").unwrap());
static ENGLISH_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z.][A-Za-z.\s]*)").unwrap());
static THAI_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\u{0E00}-\u{0E7F}][\u{0E00}-\u{0E7F}\s.]*").unwrap());
static MAJOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Major:\s*(.+?)(?:\s+Semester/Year|$)").unwrap());
static SEMESTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Semester/Year\s*:\s*(\S+)").unwrap());
static INSTITUTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)King Mongkut").unwrap());
static FACULTY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)Faculty").unwrap());

pub const NO_DATA: &str = "ไม่มีข้อมูล";
pub const PROCESSING: &str = "อยู่ระหว่างออกคะแนน";
pub const NOT_ANNOUNCED: &str = "ยังไม่ประกาศคะแนน";

/// What a score cell shows: its text and, if any, its status icon.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreCell {
    pub text: String,
    pub img_src: Option<String>,
    pub img_alt: Option<String>,
}

impl ScoreCell {
    pub fn read(cell: ElementRef<'_>) -> Self {
        let image = cell.select(&IMG).next();
        ScoreCell {
            text: element_text(cell),
            img_src: image.and_then(|i| attr_nonempty(i, "src")).map(str::to_string),
            img_alt: image.map(|i| {
                let alt = attr(i, "alt").filter(|a| !a.is_empty());
                normalize_text(alt.or_else(|| attr(i, "title")).unwrap_or(""))
            }),
        }
    }

    fn alt(&self) -> Option<&str> {
        self.img_alt.as_deref().filter(|a| !a.is_empty())
    }
}

/// Cells of a score row, minus the blank spacer columns.
pub fn score_cells(row: ElementRef<'_>) -> Vec<ScoreCell> {
    row_cells(row)
        .into_iter()
        .filter(|cell| {
            let blank = element_text(*cell).is_empty() && cell.select(&IMG).next().is_none();
            if !blank {
                return true;
            }
            let spacer = attr(*cell, "width")
                .and_then(leading_int)
                .is_some_and(|w| w <= 2);
            !spacer && has_element_children(*cell)
        })
        .map(ScoreCell::read)
        .collect()
}

/// Status and display text for a status icon, judged by its file name.
pub fn icon_status(src: &str, alt: Option<&str>) -> (ScoreStatus, String) {
    let file = last_path_segment(src).to_lowercase();
    let (status, fallback) = if file.contains("process") {
        (ScoreStatus::Processing, PROCESSING)
    } else if file.contains("fail") {
        (ScoreStatus::NotAnnounced, NOT_ANNOUNCED)
    } else {
        (ScoreStatus::NotEntered, NO_DATA)
    };
    (status, alt.unwrap_or(fallback).to_string())
}

/// Total over every cell shape, including a missing cell.
pub fn map_assessment(label: &str, cell: Option<&ScoreCell>) -> ScoreAssessment {
    let not_entered = |raw: &str| ScoreAssessment {
        label: label.to_string(),
        status: ScoreStatus::NotEntered,
        display: NO_DATA.to_string(),
        raw: raw.to_string(),
    };

    let Some(cell) = cell else {
        return not_entered("");
    };

    if let Some(src) = cell.img_src.as_deref() {
        let (status, display) = icon_status(src, cell.alt());
        return ScoreAssessment {
            label: label.to_string(),
            status,
            display,
            raw: cell.alt().unwrap_or(src).to_string(),
        };
    }

    match cell.text.as_str() {
        "" => not_entered(""),
        "-" => not_entered("-"),
        text => ScoreAssessment {
            label: label.to_string(),
            status: ScoreStatus::Score,
            display: text.to_string(),
            raw: text.to_string(),
        },
    }
}

pub fn map_legend_item(symbol: &ScoreCell, description: String) -> ScoreLegendItem {
    if let Some(src) = symbol.img_src.as_deref() {
        let (status, label) = icon_status(src, symbol.alt());
        return ScoreLegendItem {
            status,
            label,
            description,
        };
    }
    let status = if symbol.text == "-" {
        ScoreStatus::NotEntered
    } else {
        ScoreStatus::Score
    };
    ScoreLegendItem {
        status,
        label: symbol.text.clone(),
        description,
    }
}

/// Student header from the report's banner lines (one normalized row each).
pub fn parse_header<I, S>(lines: I) -> ScoreboardHeader
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut header = ScoreboardHeader::default();

    for line in lines {
        let text = line.as_ref();
        if text.is_empty() {
            continue;
        }

        if header.institution.is_none() && INSTITUTION_RE.is_match(text) {
            header.institution = Some(text.to_string());
            continue;
        }
        if header.faculty.is_none() && FACULTY_RE.is_match(text) && !text.contains("ID:") {
            header.faculty = Some(text.to_string());
            continue;
        }

        if text.contains("ID:") {
            if let Some(caps) = ID_RE.captures(text) {
                header.student_id = Some(caps[1].to_string());
            }
            if let Some((_, after)) = text.split_once("Name:") {
                let (english, thai) = split_names(after);
                header.student_english_name = english.or(header.student_english_name);
                header.student_thai_name = thai.or(header.student_thai_name);
            }
            continue;
        }

        if text.contains("Major:") {
            if let Some(caps) = MAJOR_RE.captures(text) {
                header.major = Some(caps[1].trim().to_string());
            }
            if let Some(caps) = SEMESTER_RE.captures(text) {
                header.semester = Some(caps[1].to_string());
            }
        }
    }

    header
}

/// "Mr. John Doe นายจอห์น โด" → English part and Thai part.
fn split_names(after_label: &str) -> (Option<String>, Option<String>) {
    // A trailing "ID:" belongs to the next field.
    let after_label = after_label
        .split_once("ID:")
        .map_or(after_label, |(name, _)| name);

    let english = ENGLISH_NAME_RE
        .captures(after_label)
        .map(|c| normalize_text(&c[1]))
        .filter(|n| !n.is_empty());
    let thai = THAI_RUN_RE
        .find(after_label)
        .map(|m| normalize_text(m.as_str()))
        .filter(|n| !n.is_empty());
    (english, thai)
}

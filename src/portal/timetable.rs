use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::debug;

use crate::parser::text::{
    attr, child_elements, element_text, is_positive_integer, leading_int, normalize_text,
    raw_text, row_cells, table_rows,
};

static TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());

static SLOT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"((?:อา|[ก-ฮ]{1,2})\.)\s*(\d{2}:\d{2})-(\d{2}:\d{2})\s*น?\.?\(([ทป])\)").unwrap()
});

/// Weekday abbreviations in display order.
pub const DAY_ORDER: &[&str] = &["จ.", "อ.", "พ.", "พฤ.", "ศ.", "ส.", "อา."];
pub const THEORY: &str = "ทฤษฏี";
pub const PRACTICE: &str = "ปฏิบัติ";

const DAY_START_MINUTES: u32 = 8 * 60;
const SLOT_MINUTES: u32 = 15;
const SLOTS_PER_DAY: usize = 44;
const MIN_COURSE_CELLS: usize = 10;
/// Rows holding faculty, department, semester and student id on the legacy layout.
const LEGACY_INFO_ROWS: [usize; 4] = [8, 10, 12, 14];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentInfo {
    pub faculty: String,
    pub department: String,
    pub major: String,
    pub semester: String,
    pub year: String,
    pub student_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassTime {
    pub day: String,
    pub start: String,
    pub end: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassEntry {
    pub order: String,
    pub code: String,
    pub name: String,
    pub credits: String,
    pub theory: String,
    pub practice: String,
    pub time: ClassTime,
    pub room: String,
    pub building: String,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Timetable {
    pub student: StudentInfo,
    pub entries: Vec<ClassEntry>,
}

/// One cell of a day's timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TimeSlot<'a> {
    Free { start: String },
    Class { entry: &'a ClassEntry, span: usize },
}

// ── Columns ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Order,
    Code,
    Name,
    Credits,
    Theory,
    Practice,
    Time,
    Room,
    Building,
    Note,
}

const COLUMNS: [(Column, &[&str]); 10] = [
    (Column::Order, &["ลำดับ", "No"]),
    (Column::Code, &["รหัสวิชา"]),
    (Column::Name, &["ชื่อวิชา"]),
    (Column::Credits, &["หน่วยกิต"]),
    (Column::Theory, &["ทฤษฎี", "ทฤษฏี"]),
    (Column::Practice, &["ปฏิบัติ"]),
    (Column::Time, &["วัน", "เวลา"]),
    (Column::Room, &["ห้อง"]),
    (Column::Building, &["อาคาร", "ตึก"]),
    (Column::Note, &["หมายเหตุ"]),
];

/// Retained-cell position of each column, in `COLUMNS` order.
#[derive(Debug, Clone, PartialEq)]
struct ColumnMap([usize; 10]);

impl ColumnMap {
    /// Columns the header does not name keep their listed position.
    fn from_header(labels: &[String]) -> Self {
        let mut positions = [0; 10];
        for (i, (_, keywords)) in COLUMNS.iter().enumerate() {
            positions[i] = labels
                .iter()
                .position(|l| keywords.iter().any(|k| l.contains(k)))
                .unwrap_or(i);
        }
        ColumnMap(positions)
    }

    fn get(&self, column: Column) -> usize {
        let i = COLUMNS.iter().position(|(c, _)| *c == column).unwrap_or(0);
        self.0[i]
    }
}

/// Row cells minus the narrow spacer columns.
fn retained_cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row_cells(row)
        .into_iter()
        .filter(|cell| {
            !attr(*cell, "width")
                .and_then(leading_int)
                .is_some_and(|w| w <= 2)
        })
        .collect()
}

fn is_header(labels: &[String]) -> bool {
    labels.iter().any(|l| l.contains("รหัสวิชา")) && labels.iter().any(|l| l.contains("ชื่อวิชา"))
}

// ── Scraping ──

pub fn scrape_timetable(doc: &Html) -> Option<Timetable> {
    let (table, columns) = doc.select(&TABLE).find_map(|table| {
        table_rows(table).into_iter().find_map(|row| {
            let labels: Vec<String> = retained_cells(row).into_iter().map(element_text).collect();
            is_header(&labels).then(|| (table, ColumnMap::from_header(&labels)))
        })
    })?;
    let rows = table_rows(table);

    let mut entries: Vec<ClassEntry> = rows.iter().flat_map(|row| parse_row(*row, &columns)).collect();
    sort_entries(&mut entries);

    Some(Timetable {
        student: student_info(&rows),
        entries,
    })
}

/// One entry per time slot in the row's time cell.
fn parse_row(row: ElementRef<'_>, columns: &ColumnMap) -> Vec<ClassEntry> {
    let cells = retained_cells(row);
    if cells.len() < MIN_COURSE_CELLS {
        return Vec::new();
    }
    let text_at = |column: Column| {
        cells
            .get(columns.get(column))
            .map(|c| element_text(*c))
            .unwrap_or_default()
    };
    let lines_at = |column: Column| -> Vec<String> {
        cells
            .get(columns.get(column))
            .map(|c| {
                raw_text(*c)
                    .lines()
                    .map(normalize_text)
                    .filter(|l| !l.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    };

    let order = text_at(Column::Order);
    if !is_positive_integer(&order) {
        return Vec::new();
    }

    let time_text = cells
        .get(columns.get(Column::Time))
        .map(|c| raw_text(*c))
        .unwrap_or_default();
    let rooms = lines_at(Column::Room);
    let buildings = lines_at(Column::Building);
    let pick = |lines: &[String], i: usize| {
        lines.get(i).or_else(|| lines.last()).cloned().unwrap_or_default()
    };

    let entries: Vec<ClassEntry> = SLOT_RE
        .captures_iter(&time_text)
        .enumerate()
        .map(|(i, caps)| ClassEntry {
            order: order.clone(),
            code: text_at(Column::Code),
            name: text_at(Column::Name),
            credits: text_at(Column::Credits),
            theory: text_at(Column::Theory),
            practice: text_at(Column::Practice),
            time: ClassTime {
                day: caps[1].to_string(),
                start: caps[2].to_string(),
                end: caps[3].to_string(),
                kind: (if &caps[4] == "ท" { THEORY } else { PRACTICE }).to_string(),
            },
            room: pick(&rooms, i),
            building: pick(&buildings, i),
            note: text_at(Column::Note),
        })
        .collect();

    if entries.is_empty() {
        debug!(order = %order, "course row without a time slot");
    }
    entries
}

fn minutes(hhmm: &str) -> Option<u32> {
    let (h, m) = hhmm.split_once(':')?;
    Some(h.trim().parse::<u32>().ok()? * 60 + m.trim().parse::<u32>().ok()?)
}

fn day_rank(day: &str) -> usize {
    DAY_ORDER.iter().position(|d| *d == day).unwrap_or(DAY_ORDER.len())
}

/// Weekday order, then start time. Unknown days go last.
fn sort_entries(entries: &mut [ClassEntry]) {
    entries.sort_by_key(|e| (day_rank(&e.time.day), minutes(&e.time.start).unwrap_or(u32::MAX)));
}

/// Lays one day out on fifteen-minute slots from 08:00. A class fills the
/// slot at its start time and absorbs the slots it spans.
pub fn time_slots<'a>(entries: &'a [ClassEntry], day: &str) -> Vec<TimeSlot<'a>> {
    let on_day: Vec<&ClassEntry> = entries.iter().filter(|e| e.time.day == day).collect();
    let mut slots = Vec::new();
    let mut i = 0;
    while i < SLOTS_PER_DAY {
        let at = DAY_START_MINUTES + i as u32 * SLOT_MINUTES;
        let class = on_day
            .iter()
            .find(|e| minutes(&e.time.start) == Some(at));
        match class {
            Some(&entry) => {
                let end = minutes(&entry.time.end).unwrap_or(at);
                let span = (end.saturating_sub(at) / SLOT_MINUTES).max(1) as usize;
                slots.push(TimeSlot::Class { entry, span });
                i += span;
            }
            None => {
                slots.push(TimeSlot::Free {
                    start: format!("{:02}:{:02}", at / 60, at % 60),
                });
                i += 1;
            }
        }
    }
    slots
}

// ── Student info ──

/// Value of a "label : value" piece, or the piece itself.
fn strip_label(text: &str) -> String {
    let value = text.split_once(':').map_or(text, |(_, v)| v);
    normalize_text(value)
}

fn squeeze(text: &str) -> String {
    text.split_whitespace().collect()
}

/// Values held by the child elements of a row's first cell.
fn row_parts(row: ElementRef<'_>) -> (String, String) {
    let Some(cell) = row_cells(row).into_iter().next() else {
        return (String::new(), String::new());
    };
    let mut parts = child_elements(cell).map(|el| strip_label(&element_text(el)));
    (parts.next().unwrap_or_default(), parts.next().unwrap_or_default())
}

fn fill(slot: &mut String, value: String) {
    if slot.is_empty() && !value.is_empty() {
        *slot = value;
    }
}

fn student_info(rows: &[ElementRef<'_>]) -> StudentInfo {
    let mut info = StudentInfo::default();

    for row in rows {
        let text = element_text(*row);
        if text.starts_with("คณะ") {
            fill(&mut info.faculty, squeeze(&text));
        } else if text.starts_with("ภาควิชา") {
            let (department, major) = row_parts(*row);
            fill(&mut info.department, squeeze(&department));
            fill(&mut info.major, squeeze(&major));
        } else if text.starts_with("ภาคเรียน") || text.starts_with("ภาคการศึกษา") {
            let (semester, year) = row_parts(*row);
            fill(&mut info.semester, squeeze(&semester));
            fill(&mut info.year, squeeze(&year));
        } else if text.starts_with("รหัส") && !text.contains("รหัสวิชา") {
            let (id, name) = row_parts(*row);
            fill(&mut info.student_id, squeeze(&id));
            fill(&mut info.name, name);
        }
    }

    if !info.student_id.is_empty() || rows.len() <= LEGACY_INFO_ROWS[3] {
        return info;
    }

    // Unlabelled legacy layout: fixed rows fill whatever the labels missed.
    debug!("timetable info rows carry no labels, using fixed positions");
    let [faculty, department, semester, student] = LEGACY_INFO_ROWS.map(|i| rows[i]);
    fill(&mut info.faculty, squeeze(&element_text(faculty)));
    let (d, m) = row_parts(department);
    fill(&mut info.department, squeeze(&d));
    fill(&mut info.major, squeeze(&m));
    let (s, y) = row_parts(semester);
    fill(&mut info.semester, squeeze(&s));
    fill(&mut info.year, squeeze(&y));
    let (id, name) = row_parts(student);
    fill(&mut info.student_id, squeeze(&id));
    fill(&mut info.name, name);
    info
}

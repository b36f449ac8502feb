use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use url::Url;

use crate::fetch::resolve;
use crate::parser::text::{attr, child_elements, element_text, row_cells};

static FIELD_DIVS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("[id^='div_']").unwrap());
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static ACCORDION: LazyLock<Selector> = LazyLock::new(|| Selector::parse("#accordion").unwrap());
static ACCORDION_PANEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".ui-accordion-content").unwrap());
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static SPOTLIGHT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("#kmitl_exp a").unwrap());

static NO_ANNOUNCEMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new("ไม่มีประกาศ").unwrap());

const NATIONAL_ID_LABEL: &str = "เลขประจำตัวประชาชน";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnnouncementSource {
    PersonalInfo,
    RegistrarHighlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AnnouncementVariant {
    Highlight,
    Info,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Announcement {
    pub id: String,
    pub title: String,
    pub href: Option<String>,
    pub source: AnnouncementSource,
    pub variant: AnnouncementVariant,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    pub student_id: String,
    pub national_id: String,
    pub national_id_masked: String,
    pub thai_title: String,
    pub thai_name: String,
    pub thai_full_name: String,
    pub english_title: String,
    pub english_name: String,
    pub english_full_name: String,
    pub birth_date: String,
    pub gender: String,
    pub status: String,
    pub faculty: String,
    pub curriculum: String,
    pub admission_type: String,
    pub admission_year: String,
    pub expected_graduation_year: String,
    pub expected_graduation_date: String,
    pub advisory_message: String,
    pub announcements: Vec<Announcement>,
}

/// Profile fields from the `div_*` placeholders; missing ones are empty.
pub fn scrape_profile(doc: &Html, base_url: &Url) -> StudentProfile {
    let mut fields: HashMap<&str, String> = HashMap::new();
    for el in doc.select(&FIELD_DIVS) {
        if let Some(id) = attr(el, "id").and_then(|id| id.strip_prefix("div_")) {
            fields.entry(id).or_insert_with(|| element_text(el));
        }
    }
    let field = |name: &str| fields.get(name).cloned().unwrap_or_default();

    let thai_title = field("t_prename");
    let thai_name = field("t_name");
    let english_title = field("e_prename");
    let english_name = field("e_name");

    let national_id_raw = value_by_label(doc, NATIONAL_ID_LABEL)
        .filter(|v| !v.is_empty())
        .or_else(|| row_before_title(doc))
        .unwrap_or_default();
    let digits: String = national_id_raw.chars().filter(char::is_ascii_digit).collect();
    let or_raw = |s: String| if s.is_empty() { national_id_raw.clone() } else { s };

    StudentProfile {
        student_id: field("student_id"),
        national_id: or_raw(format_national_id(&digits)),
        national_id_masked: or_raw(mask_national_id(&digits)),
        thai_full_name: full_name(&thai_title, &thai_name),
        english_full_name: full_name(&english_title, &english_name).to_uppercase(),
        thai_title,
        thai_name,
        english_title,
        english_name,
        birth_date: field("birth_date"),
        gender: field("gender"),
        status: field("status"),
        faculty: field("faculty_name"),
        curriculum: field("curr2_tname"),
        admission_type: field("admis_type"),
        admission_year: field("admis_year"),
        expected_graduation_year: field("grad_year"),
        expected_graduation_date: field("grad_date"),
        advisory_message: field("msg"),
        announcements: extract_announcements(doc, base_url),
    }
}

fn full_name(title: &str, name: &str) -> String {
    [title, name]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Second cell of the first row holding a cell that mentions `label`,
/// ignoring whitespace on both sides.
fn value_by_label(doc: &Html, label: &str) -> Option<String> {
    let label: String = label.split_whitespace().collect();
    doc.select(&CELL).find_map(|cell| {
        let text: String = element_text(cell).split_whitespace().collect();
        if !text.contains(&label) {
            return None;
        }
        let row = cell.parent().and_then(ElementRef::wrap)?;
        let cells = row_cells(row);
        (cells.len() > 1).then(|| element_text(cells[1]))
    })
}

// Older layouts print the national id unlabelled, one row above the Thai title.
fn row_before_title(doc: &Html) -> Option<String> {
    let title = doc
        .select(&FIELD_DIVS)
        .find(|el| attr(*el, "id") == Some("div_t_prename"))?;
    let row = title
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "tr")?;
    let previous = row.prev_siblings().filter_map(ElementRef::wrap).next()?;
    if previous.value().name() != "tr" {
        return None;
    }
    row_cells(previous).last().map(|c| element_text(*c))
}

/// `1-2345-67890-12-3` for 13 digits; anything else unchanged.
pub fn format_national_id(digits: &str) -> String {
    let chars: Vec<char> = digits.chars().collect();
    if chars.len() != 13 {
        return digits.to_string();
    }
    [&chars[0..1], &chars[1..5], &chars[5..10], &chars[10..12], &chars[12..13]]
        .iter()
        .map(|part| part.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("-")
}

/// Keeps the first digit and the last two.
pub fn mask_national_id(digits: &str) -> String {
    let len = digits.chars().count();
    let masked: String = digits
        .chars()
        .enumerate()
        .map(|(i, c)| if i == 0 || i + 2 >= len { c } else { '*' })
        .collect();
    format_national_id(&masked)
}

// ── Announcements ──

fn extract_announcements(doc: &Html, base_url: &Url) -> Vec<Announcement> {
    let mut announcements = Vec::new();

    if let Some(accordion) = doc.select(&ACCORDION).next() {
        let panel = accordion.select(&ACCORDION_PANEL).next().unwrap_or(accordion);
        let mut items: Vec<ElementRef<'_>> = child_elements(panel).collect();
        if items.is_empty() {
            items.push(panel);
        }

        for (index, item) in items.into_iter().enumerate() {
            let links: Vec<_> = item.select(&ANCHOR).collect();
            if links.is_empty() {
                let text = element_text(item);
                if text.is_empty() {
                    continue;
                }
                let variant = if NO_ANNOUNCEMENT_RE.is_match(&text) {
                    AnnouncementVariant::Empty
                } else {
                    AnnouncementVariant::Info
                };
                announcements.push(Announcement {
                    id: format!("accordion-note-{index}"),
                    title: text,
                    href: None,
                    source: AnnouncementSource::PersonalInfo,
                    variant,
                });
                continue;
            }

            for (link_index, link) in links.into_iter().enumerate() {
                let title = element_text(link);
                if title.is_empty() {
                    continue;
                }
                announcements.push(Announcement {
                    id: format!(
                        "accordion-link-{index}-{link_index}-{}",
                        attr(link, "id").unwrap_or("anchor")
                    ),
                    title,
                    href: attr(link, "href").and_then(|h| resolve(base_url, h)),
                    source: AnnouncementSource::PersonalInfo,
                    variant: AnnouncementVariant::Highlight,
                });
            }
        }
    }

    if let Some(link) = doc.select(&SPOTLIGHT).next() {
        let title = element_text(link);
        if !title.is_empty() {
            announcements.push(Announcement {
                id: format!("spotlight-{}", attr(link, "id").unwrap_or("primary")),
                title,
                href: attr(link, "href").and_then(|h| resolve(base_url, h)),
                source: AnnouncementSource::RegistrarHighlight,
                variant: AnnouncementVariant::Highlight,
            });
        }
    }

    let mut seen = HashSet::new();
    announcements.retain(|a| seen.insert((a.title.clone(), a.href.clone())));
    announcements
}

pub mod eligibility;
pub mod grade_report;
pub mod midterm;
pub mod minor;
pub mod news;
pub mod schedule;
pub mod score;
pub mod transcript;

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use super::text::{attr, attr_nonempty, element_text};
use crate::model::ScheduleOption;

static EDIT_FORM: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("form[name='edit']").unwrap());
static YEAR_SELECT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("select[name='year']").unwrap());
static SEMESTER_SELECT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("select[name='semester']").unwrap());
static OPTION: LazyLock<Selector> = LazyLock::new(|| Selector::parse("option").unwrap());
static TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());

/// A `<select>` read the way a browser would present it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Choice {
    pub options: Vec<ScheduleOption>,
    /// Last `selected` option, else the first option.
    pub selected: Option<String>,
}

/// The portal's year/semester picker (`form[name=edit]`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditForm {
    pub action: Option<String>,
    pub year: Option<Choice>,
    pub semester: Option<Choice>,
}

impl EditForm {
    pub fn find(doc: &Html) -> Option<Self> {
        let form = doc.select(&EDIT_FORM).next()?;
        Some(EditForm {
            action: attr_nonempty(form, "action").map(str::to_string),
            year: form.select(&YEAR_SELECT).next().map(read_choice),
            semester: form.select(&SEMESTER_SELECT).next().map(read_choice),
        })
    }

    pub fn years(&self) -> Vec<ScheduleOption> {
        self.year.as_ref().map(|c| c.options.clone()).unwrap_or_default()
    }

    pub fn semesters(&self) -> Vec<ScheduleOption> {
        self.semester
            .as_ref()
            .map(|c| c.options.clone())
            .unwrap_or_default()
    }

    pub fn selected_year(&self) -> Option<String> {
        self.year.as_ref().and_then(|c| c.selected.clone())
    }

    pub fn selected_semester(&self) -> Option<String> {
        self.semester.as_ref().and_then(|c| c.selected.clone())
    }
}

fn read_choice(select: ElementRef<'_>) -> Choice {
    let mut options = Vec::new();
    let mut selected = None;
    for option in select.select(&OPTION) {
        let text = element_text(option);
        let value = attr(option, "value")
            .map(str::to_string)
            .unwrap_or_else(|| text.clone());
        let label = if text.is_empty() { value.clone() } else { text };
        if attr(option, "selected").is_some() {
            selected = Some(value.clone());
        }
        options.push(ScheduleOption { value, label });
    }
    let selected = selected.or_else(|| options.first().map(|o| o.value.clone()));
    Choice { options, selected }
}

pub fn tables(doc: &Html) -> Vec<ElementRef<'_>> {
    doc.select(&TABLE).collect()
}

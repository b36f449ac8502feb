use scraper::Html;

use super::EditForm;
use crate::model::{
    Block, ContentKind, ContentModel, ExamTableBlock, ScheduleOption, ScheduleTableBlock,
};
use crate::parser::MapOptions;

pub const SCHEDULE_TITLE: &str = "ตารางเรียนส่วนบุคคล";
pub const EXAM_TITLE: &str = "ตารางสอบส่วนบุคคล";

/// Year/semester picker shared by the class and exam timetable pages.
struct Picker {
    years: Vec<ScheduleOption>,
    semesters: Vec<ScheduleOption>,
    action_url: String,
}

fn read_picker(doc: &Html, options: &MapOptions, page: &str, results_page: &str) -> Option<Picker> {
    let form = EditForm::find(doc)?;
    if form.year.is_none() || form.semester.is_none() {
        return None;
    }

    let action_url = form
        .action
        .clone()
        .or_else(|| {
            options
                .source_url
                .as_deref()
                .map(|url| url.replace(page, results_page))
        })
        .unwrap_or_default();

    Some(Picker {
        years: form.years(),
        semesters: form.semesters(),
        action_url,
    })
}

pub fn extract_schedule(doc: &Html, options: &MapOptions) -> Option<ContentModel> {
    let picker = read_picker(
        doc,
        options,
        "report_studytable.php",
        "report_studytable_show.php",
    )?;
    Some(ContentModel::new(
        Some(ContentKind::Schedule),
        SCHEDULE_TITLE,
        vec![Block::ScheduleTable(ScheduleTableBlock {
            title: Some(SCHEDULE_TITLE.to_string()),
            years: picker.years,
            semesters: picker.semesters,
            action_url: picker.action_url,
        })],
    ))
}

pub fn extract_exam(doc: &Html, options: &MapOptions) -> Option<ContentModel> {
    let picker = read_picker(
        doc,
        options,
        "report_examtable.php",
        "report_examtable_show.php",
    )?;
    Some(ContentModel::new(
        Some(ContentKind::Exam),
        EXAM_TITLE,
        vec![Block::ExamTable(ExamTableBlock {
            title: Some(EXAM_TITLE.to_string()),
            years: picker.years,
            semesters: picker.semesters,
            action_url: picker.action_url,
        })],
    ))
}

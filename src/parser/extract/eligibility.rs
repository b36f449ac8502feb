use std::sync::LazyLock;

use scraper::{Html, Selector};

use crate::model::{Block, ContentKind, ContentModel, RegistrationEligibilityBlock};
use crate::parser::text::{element_text, row_cells};
use crate::parser::MapOptions;

static PROMPT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1.prompt").unwrap());
static STUDENT_ID: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#div_student_id").unwrap());
static STUDENT_NAME: LazyLock<Selector> = LazyLock::new(|| Selector::parse("#div_tname").unwrap());
static SEMESTER: LazyLock<Selector> = LazyLock::new(|| Selector::parse("#div_semester").unwrap());
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());

const ELIGIBLE_MARKER: &str = "สามารถลงทะเบียน";

pub fn extract(doc: &Html, _options: &MapOptions) -> Option<ContentModel> {
    let prompt = doc.select(&PROMPT).next()?;
    let has_eligibility = element_text(prompt).contains(ELIGIBLE_MARKER);

    let by_id = |sel: &Selector| {
        doc.select(sel)
            .next()
            .map(element_text)
            .filter(|t| !t.is_empty())
    };
    let mut student_id = by_id(&STUDENT_ID);
    let mut student_name = by_id(&STUDENT_NAME);
    let mut semester = by_id(&SEMESTER);

    if student_id.is_none() || student_name.is_none() {
        for row in doc.select(&ROW) {
            let cells = row_cells(row);
            if cells.len() < 2 {
                continue;
            }
            let label = element_text(cells[0]);
            let value = element_text(cells[1]);

            if label.contains("รหัสนักศึกษา") {
                fill(&mut student_id, value);
            } else if label.contains("ชื่อ-นามสกุล") || label.contains("ชื่อ") {
                fill(&mut student_name, value);
            } else if label.contains("ภาคการศึกษา") {
                fill(&mut semester, value);
            }
        }
    }

    let student_id = student_id?;
    let student_name = student_name?;

    Some(
        ContentModel::new(
            Some(ContentKind::RegistrationEligibility),
            "ตรวจสอบสิทธิ์ก่อนลงทะเบียน",
            vec![Block::RegistrationEligibility(RegistrationEligibilityBlock {
                student_id,
                student_name,
                semester: semester.unwrap_or_else(|| "-".to_string()),
                has_eligibility,
            })],
        )
        .with_subtitle(Some("Registration Eligibility Check".to_string())),
    )
}

fn fill(slot: &mut Option<String>, value: String) {
    if slot.is_none() && !value.is_empty() {
        *slot = Some(value);
    }
}

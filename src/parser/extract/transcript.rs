use std::sync::LazyLock;

use scraper::{Html, Selector};

use super::tables;
use crate::model::{Block, ContentKind, ContentModel, TranscriptBlock};
use crate::parser::text::{attr, raw_text};
use crate::parser::MapOptions;

static PDF_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href*='transcript_pdf']").unwrap());

const ACTION_URL: &str = "report_transcript_show2.php";

pub fn extract(doc: &Html, _options: &MapOptions) -> Option<ContentModel> {
    let has_transcript = tables(doc).into_iter().any(|table| {
        let text = raw_text(table);
        text.contains("COURSE TITLE") && text.contains("CREDIT") && text.contains("GRADE")
    });
    if !has_transcript {
        return None;
    }

    let pdf_url = doc
        .select(&PDF_LINK)
        .next()
        .and_then(|a| attr(a, "href"))
        .filter(|h| !h.is_empty())
        .map(str::to_string);

    Some(ContentModel::new(
        Some(ContentKind::Transcript),
        "ทรานสคริปต์",
        vec![Block::Transcript(TranscriptBlock {
            action_url: ACTION_URL.to_string(),
            pdf_url,
        })],
    ))
}

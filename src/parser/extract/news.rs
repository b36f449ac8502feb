use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::tables;
use crate::model::{Block, ContentKind, ContentModel, NewsItem, NewsListBlock};
use crate::parser::text::{attr, element_text, normalize_text, raw_text, row_cells, table_rows};
use crate::parser::MapOptions;

static NEWS_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href*='group_news']").unwrap());
static LINK_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span, strong").unwrap());
static GROUP_IMAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[src*='group']").unwrap());
static HEADING: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1, h2").unwrap());

// "[ 21 Oct. 62 - 10:06 ]"
static DATE_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\s*(\d{1,2}\s+[^\d\s]+\s+\d{2,4})\s*-\s*(\d{1,2}:\d{2}\s*[^\]]*)\s*\]").unwrap()
});
static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,2}\s+[^\d\s]+\s+\d{2,4}").unwrap());

pub const DEFAULT_TITLE: &str = "ข่าวประชาสัมพันธ์";

/// Fewer news rows than this is a sidebar, not the listing.
const MIN_NEWS_ROWS: usize = 4;

pub fn extract(doc: &Html, _options: &MapOptions) -> Option<ContentModel> {
    let table = find_news_table(doc)?;

    let items: Vec<NewsItem> = table_rows(table)
        .into_iter()
        .enumerate()
        .filter_map(|(index, row)| parse_row(index, row))
        .collect();
    if items.is_empty() {
        return None;
    }

    Some(ContentModel::new(
        Some(ContentKind::NewsList),
        news_title(doc),
        vec![Block::NewsList(NewsListBlock { title: None, items })],
    ))
}

fn news_link(row: ElementRef<'_>) -> Option<ElementRef<'_>> {
    row_cells(row).first()?.select(&NEWS_LINK).next()
}

/// Table with the most rows leading with a news link; earliest wins ties.
fn find_news_table(doc: &Html) -> Option<ElementRef<'_>> {
    let mut best: Option<(ElementRef<'_>, usize)> = None;
    for table in tables(doc) {
        let count = table_rows(table)
            .into_iter()
            .filter(|row| news_link(*row).is_some())
            .count();
        if best.map_or(true, |(_, n)| count > n) {
            best = Some((table, count));
        }
    }
    best.filter(|(_, n)| *n >= MIN_NEWS_ROWS).map(|(t, _)| t)
}

fn parse_row(index: usize, row: ElementRef<'_>) -> Option<NewsItem> {
    let cell = *row_cells(row).first()?;
    let link = cell.select(&NEWS_LINK).next()?;
    let href = attr(link, "href").filter(|h| !h.is_empty() && !h.starts_with("javascript:"))?;

    let title = link
        .select(&LINK_TITLE)
        .next()
        .map(element_text)
        .unwrap_or_else(|| element_text(link));
    if title.is_empty() {
        return None;
    }

    Some(NewsItem {
        id: format!("news-{index}"),
        title,
        href: href.to_string(),
        date: parse_date(&raw_text(cell)),
        category: None,
    })
}

/// "[ 21 Oct. 62 - 10:06 ]" → "21 Oct. 62 10:06"; a bare "21 Oct. 62" is kept as is.
pub fn parse_date(text: &str) -> Option<String> {
    if let Some(caps) = DATE_TIME_RE.captures(text) {
        return Some(format!(
            "{} {}",
            normalize_text(&caps[1]),
            normalize_text(&caps[2])
        ));
    }
    DATE_RE.find(text).map(|m| normalize_text(m.as_str()))
}

fn news_title(doc: &Html) -> String {
    doc.select(&GROUP_IMAGE)
        .next()
        .and_then(|img| attr(img, "alt"))
        .map(normalize_text)
        .filter(|t| !t.is_empty())
        .or_else(|| {
            doc.select(&HEADING)
                .next()
                .map(element_text)
                .filter(|t| !t.is_empty())
        })
        .unwrap_or_else(|| DEFAULT_TITLE.to_string())
}

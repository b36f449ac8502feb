use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::fetch::resolve;
use crate::parser::text::{attr, element_text, raw_text};

static MENU_ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td.slideMenu a").unwrap());
static HEADER_IMG: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[src*='header']").unwrap());
static LOGO: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("img[src*='KMITL_Sublogo'], img[src*='LogoX']").unwrap()
});
static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static SCRIPT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("script").unwrap());

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)header(\d+)").unwrap());
static ONCLICK_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)getiContent\(['"]([^'"]+)"#).unwrap());
static SERVER_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"server_date\(['"]([^'"]+)['"]\)"#).unwrap());
static SLUG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]+").unwrap());

const DEFAULT_TITLE: &str = "KMITL Portal";

// ── Sections ──

struct SectionMeta {
    header: u32,
    id: &'static str,
    title: &'static str,
    description: &'static str,
    icon: &'static str,
    accent: &'static str,
    order: u32,
}

const SECTIONS: &[SectionMeta] = &[
    SectionMeta {
        header: 1,
        id: "general",
        title: "ข้อมูลและบริการทั่วไป",
        description: "บริการพื้นฐานและลิงก์ภายนอกที่ใช้งานบ่อย",
        icon: "ph:compass-duotone",
        accent: "#fb923c",
        order: 1,
    },
    SectionMeta {
        header: 2,
        id: "student",
        title: "ข้อมูลนักศึกษา",
        description: "โปรไฟล์และข้อมูลพื้นฐานของนักศึกษา",
        icon: "ph:identification-card-duotone",
        accent: "#f97316",
        order: 2,
    },
    SectionMeta {
        header: 3,
        id: "registration",
        title: "การลงทะเบียน",
        description: "วางแผนตารางเรียนและการลงทะเบียน",
        icon: "ph:calendar-check-duotone",
        accent: "#f59e0b",
        order: 3,
    },
    SectionMeta {
        header: 4,
        id: "grades",
        title: "ผลการเรียน",
        description: "ติดตามคะแนน สรุปผล และทรานสคริปต์",
        icon: "ph:chart-line-up-duotone",
        accent: "#f97316",
        order: 4,
    },
    SectionMeta {
        header: 5,
        id: "scholarship",
        title: "ทุนและสวัสดิการ",
        description: "ประกาศทุนและข้อมูลการสนับสนุนนักศึกษา",
        icon: "ph:hand-coins-duotone",
        accent: "#fb923c",
        order: 5,
    },
    SectionMeta {
        header: 6,
        id: "systems",
        title: "ระบบสนับสนุน",
        description: "เครื่องมือและระบบเสริมการเรียน",
        icon: "ph:toolbox-duotone",
        accent: "#fbbf24",
        order: 6,
    },
    SectionMeta {
        header: 7,
        id: "news",
        title: "ข่าวและประกาศ",
        description: "ข่าวสาร กิจกรรม และเว็บบอร์ด",
        icon: "ph:megaphone-duotone",
        accent: "#fb923c",
        order: 7,
    },
    SectionMeta {
        header: 8,
        id: "messages",
        title: "กล่องข้อความ",
        description: "ส่งข้อความ รายงานปัญหา และติดตามแจ้งเตือน",
        icon: "ph:chat-circle-text-duotone",
        accent: "#fb923c",
        order: 8,
    },
];

// ── Dataset ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LinkKind {
    Internal,
    External,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalMenuItem {
    pub id: String,
    pub label: String,
    /// As written in the page.
    pub url: String,
    pub absolute_url: String,
    #[serde(rename = "type")]
    pub kind: LinkKind,
    pub supports_embed: bool,
    pub open_in_new_tab: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_onclick: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalSection {
    pub key: String,
    pub id: String,
    pub title: String,
    pub description: String,
    pub icon: String,
    pub accent: String,
    pub order: u32,
    pub items: Vec<PortalMenuItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalMeta {
    pub title: String,
    pub logo_url: Option<String>,
    pub initial_server_time: Option<String>,
    pub home_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortalDataset {
    pub sections: Vec<PortalSection>,
    pub meta: PortalMeta,
}

pub fn scrape_menu(doc: &Html, page_url: &Url) -> PortalDataset {
    PortalDataset {
        sections: extract_sections(doc, page_url),
        meta: extract_meta(doc, page_url),
    }
}

fn extract_sections(doc: &Html, page_url: &Url) -> Vec<PortalSection> {
    let mut sections: BTreeMap<u32, PortalSection> = BTreeMap::new();
    let mut taken: HashSet<(&'static str, String)> = HashSet::new();

    for (index, anchor) in doc.select(&MENU_ANCHOR).enumerate() {
        let Some(meta) = header_number(anchor).and_then(|n| SECTIONS.iter().find(|s| s.header == n))
        else {
            continue;
        };
        let Some(item) = build_item(anchor, meta.id, index, page_url) else {
            continue;
        };
        if !taken.insert((meta.id, item.absolute_url.clone())) {
            debug!(section = meta.id, url = %item.absolute_url, "duplicate menu link");
            continue;
        }

        sections
            .entry(meta.order)
            .or_insert_with(|| PortalSection {
                key: format!("header{}", meta.header),
                id: meta.id.to_string(),
                title: meta.title.to_string(),
                description: meta.description.to_string(),
                icon: meta.icon.to_string(),
                accent: meta.accent.to_string(),
                order: meta.order,
                items: Vec::new(),
            })
            .items
            .push(item);
    }

    sections
        .into_values()
        .map(|mut section| {
            section.items.sort_by(|a, b| a.label.cmp(&b.label));
            section
        })
        .collect()
}

/// The `headerN` image number of the anchor's nearest enclosing table.
fn header_number(anchor: ElementRef<'_>) -> Option<u32> {
    let table = anchor
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "table")?;
    let src = attr(table.select(&HEADER_IMG).next()?, "src")?;
    HEADER_RE.captures(src)?[1].parse().ok()
}

fn build_item(
    anchor: ElementRef<'_>,
    section: &str,
    index: usize,
    page_url: &Url,
) -> Option<PortalMenuItem> {
    let label = element_text(anchor);
    if label.is_empty() {
        return None;
    }

    let onclick = attr(anchor, "onclick").unwrap_or("");
    let from_onclick = ONCLICK_URL_RE
        .captures(onclick)
        .map(|c| c[1].to_string());
    let url = from_onclick
        .clone()
        .or_else(|| attr(anchor, "href").map(str::to_string))
        .filter(|u| !u.is_empty())?;
    let absolute_url = resolve(page_url, &url)?;

    let internal = Url::parse(&absolute_url)
        .map(|u| u.origin() == page_url.origin())
        .unwrap_or(false);
    let supports_embed = internal && from_onclick.is_some();
    let blank_target = attr(anchor, "target") == Some("_blank");

    Some(PortalMenuItem {
        id: format!("{section}-{index}-{}", slugify(&absolute_url)),
        label,
        url,
        kind: if internal {
            LinkKind::Internal
        } else {
            LinkKind::External
        },
        supports_embed,
        open_in_new_tab: blank_target || !supports_embed,
        raw_onclick: Some(onclick.to_string()).filter(|o| !o.is_empty()),
        absolute_url,
    })
}

fn slugify(url: &str) -> String {
    SLUG_RE.replace_all(url, "-").to_lowercase()
}

fn extract_meta(doc: &Html, page_url: &Url) -> PortalMeta {
    let title = doc
        .select(&TITLE)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());
    let logo_url = doc
        .select(&LOGO)
        .next()
        .and_then(|img| attr(img, "src"))
        .and_then(|src| page_url.join(src).ok())
        .map(String::from);
    let initial_server_time = doc
        .select(&SCRIPT)
        .find_map(|s| SERVER_DATE_RE.captures(&raw_text(s)).map(|c| c[1].to_string()));

    PortalMeta {
        title,
        logo_url,
        initial_server_time,
        home_url: page_url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_url() -> Url {
        Url::parse("https://reg.test/registrar/home.php").unwrap()
    }

    #[test]
    fn item_rules() {
        let doc = Html::parse_document(
            r##"<table><tr><td><img src="img/header3.gif"></td></tr>
               <tr><td class="slideMenu">
                 <a href="#" onclick="getiContent('enroll.php')">ลงทะเบียน</a>
                 <a href="plan.php">วางแผน</a>
                 <a href="https://other.test/x" target="_blank">ภายนอก</a>
                 <a href="javascript:void(0)">ปิด</a>
                 <a href="empty.php">  </a>
               </td></tr></table>"##,
        );
        let dataset = scrape_menu(&doc, &page_url());
        assert_eq!(dataset.sections.len(), 1);
        let section = &dataset.sections[0];
        assert_eq!(section.id, "registration");
        assert_eq!(section.key, "header3");

        let labels: Vec<&str> = section.items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["ภายนอก", "ลงทะเบียน", "วางแผน"]);

        let enroll = &section.items[1];
        assert_eq!(enroll.url, "enroll.php");
        assert_eq!(enroll.absolute_url, "https://reg.test/registrar/enroll.php");
        assert_eq!(enroll.kind, LinkKind::Internal);
        assert!(enroll.supports_embed);
        assert!(!enroll.open_in_new_tab);
        assert_eq!(
            enroll.id,
            "registration-0-https-reg-test-registrar-enroll-php"
        );

        let plan = &section.items[2];
        assert!(!plan.supports_embed);
        assert!(plan.open_in_new_tab);
        assert!(plan.raw_onclick.is_none());

        let external = &section.items[0];
        assert_eq!(external.kind, LinkKind::External);
        assert!(external.open_in_new_tab);
    }

    #[test]
    fn anchors_without_header_are_ignored() {
        let doc = Html::parse_document(
            r#"<table><tr><td class="slideMenu"><a href="a.php">A</a></td></tr></table>
               <table><tr><td><img src="img/header99.gif"></td><td class="slideMenu"><a href="b.php">B</a></td></tr></table>"#,
        );
        assert!(scrape_menu(&doc, &page_url()).sections.is_empty());
    }

    #[test]
    fn fixture_page() {
        let html = std::fs::read_to_string("tests/fixtures/portal_menu.html").unwrap();
        let doc = Html::parse_document(&html);
        let dataset = scrape_menu(&doc, &page_url());

        let ids: Vec<&str> = dataset.sections.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["general", "grades", "news"]);

        let grades = &dataset.sections[1];
        assert_eq!(grades.title, "ผลการเรียน");
        // The duplicate grade report link is kept once.
        assert_eq!(grades.items.len(), 2);

        // The same URL may appear in two sections.
        let news = &dataset.sections[2];
        assert!(news
            .items
            .iter()
            .any(|i| i.absolute_url == "https://reg.test/registrar/news.php"));
        assert!(dataset.sections[0]
            .items
            .iter()
            .any(|i| i.absolute_url == "https://reg.test/registrar/news.php"));

        assert_eq!(dataset.meta.title, "ระบบบริการการศึกษา");
        assert_eq!(
            dataset.meta.logo_url.as_deref(),
            Some("https://reg.test/registrar/images/KMITL_Sublogo.png")
        );
        assert_eq!(
            dataset.meta.initial_server_time.as_deref(),
            Some("2025-10-19 09:30:00")
        );
        assert_eq!(dataset.meta.home_url, "https://reg.test/registrar/home.php");
    }

    #[test]
    fn default_meta() {
        let dataset = scrape_menu(&Html::parse_document("<p>x</p>"), &page_url());
        assert_eq!(dataset.meta.title, DEFAULT_TITLE);
        assert!(dataset.meta.logo_url.is_none());
        assert!(dataset.meta.initial_server_time.is_none());
    }
}

use std::panic::{self, AssertUnwindSafe};

use scraper::Html;
use tracing::{debug, warn};

use super::extract::{eligibility, grade_report, midterm, minor, news, schedule, transcript};
use super::MapOptions;
use crate::model::{Block, ContentModel};

pub type ExtractFn = fn(&Html, &MapOptions) -> Option<ContentModel>;

pub enum Handler {
    /// Known page with no structured rendering yet.
    Unsupported(&'static str),
    Extract(ExtractFn),
}

pub struct Route {
    pub name: &'static str,
    /// Substrings of the URL hint; any one selects the route.
    pub markers: &'static [&'static str],
    pub handler: Handler,
}

impl Route {
    pub fn matches(&self, url: &str) -> bool {
        self.markers.iter().any(|m| url.contains(m))
    }
}

pub const UNSUPPORTED_NOTE: &str =
    "ฟีเจอร์นี้กำลังอยู่ในระหว่างการพัฒนา กรุณาใช้หน้าต้นฉบับในการดูข้อมูล";

/// Evaluated top to bottom. Order matters: unsupported pages are claimed
/// before any extractor can misread them.
pub static ROUTES: &[Route] = &[
    Route {
        name: "advance_gradetable",
        markers: &["advance_gradetable"],
        handler: Handler::Unsupported("ข้อมูลผลการเรียน 4+1"),
    },
    Route {
        name: "graduation",
        markers: &["grad/grad.php", "unauthor.php"],
        handler: Handler::Unsupported("แจ้งคาดว่าจะสำเร็จการศึกษา"),
    },
    Route {
        name: "webboard",
        markers: &["webboardX.php"],
        handler: Handler::Unsupported("เว็บบอร์ดสำนักฯ"),
    },
    Route {
        name: "grade_process",
        markers: &["grade_process.php"],
        handler: Handler::Unsupported("ขั้นตอนการส่งเกรด"),
    },
    Route {
        name: "grade_report",
        markers: &["report_gradetable"],
        handler: Handler::Extract(grade_report::extract),
    },
    Route {
        name: "transcript",
        markers: &["report_transcript"],
        handler: Handler::Extract(transcript::extract),
    },
    Route {
        name: "midterm_score",
        markers: &["midterm_score"],
        handler: Handler::Extract(midterm::extract),
    },
    Route {
        name: "news",
        markers: &["newsX.php"],
        handler: Handler::Extract(news::extract),
    },
    Route {
        name: "schedule",
        markers: &["report_studytable.php"],
        handler: Handler::Extract(schedule::extract_schedule),
    },
    Route {
        name: "exam",
        markers: &["report_examtable.php"],
        handler: Handler::Extract(schedule::extract_exam),
    },
    Route {
        name: "minor",
        markers: &["minor.php"],
        handler: Handler::Extract(minor::extract),
    },
    Route {
        name: "eligibility",
        markers: &["check_regis_no_right.php"],
        handler: Handler::Extract(eligibility::extract),
    },
];

/// Names of every route whose markers match, in evaluation order.
pub fn matching_routes(url: &str) -> Vec<&'static str> {
    ROUTES
        .iter()
        .filter(|r| r.matches(url))
        .map(|r| r.name)
        .collect()
}

/// First route that both matches the URL hint and recognizes the page.
pub fn route(doc: &Html, options: &MapOptions) -> Option<ContentModel> {
    let url = options.source_url.as_deref()?;

    for route in ROUTES.iter().filter(|r| r.matches(url)) {
        match route.handler {
            Handler::Unsupported(title) => {
                debug!(route = route.name, "unsupported page");
                return Some(unsupported(title));
            }
            Handler::Extract(extract) => {
                match panic::catch_unwind(AssertUnwindSafe(|| extract(doc, options))) {
                    Ok(Some(model)) => {
                        debug!(route = route.name, blocks = model.blocks.len(), "matched");
                        return Some(model);
                    }
                    Ok(None) => debug!(route = route.name, "shape mismatch"),
                    Err(_) => warn!(route = route.name, url, "extractor panicked, treating as no match"),
                }
            }
        }
    }
    None
}

fn unsupported(title: &str) -> ContentModel {
    ContentModel::new(None, title, vec![Block::info(UNSUPPORTED_NOTE)])
}

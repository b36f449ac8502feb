use std::sync::LazyLock;

use scraper::{Html, Selector};

use crate::model::{Block, ContentKind, ContentModel, MinorProgramBlock};
use crate::parser::MapOptions;

static MINOR_NAV: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "ul.blue a[href*='minor_news.php'], ul.blue a[href*='minor_program.php'], ul.blue a[href*='minor_apply.php']",
    )
    .unwrap()
});
static PROMPT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h3.prompt").unwrap());

pub fn extract(doc: &Html, options: &MapOptions) -> Option<ContentModel> {
    let source_url = options.source_url.as_deref()?;
    if !source_url.contains("minor.php") {
        return None;
    }
    if doc.select(&MINOR_NAV).next().is_none() && doc.select(&PROMPT).next().is_none() {
        return None;
    }

    Some(
        ContentModel::new(
            Some(ContentKind::MinorProgram),
            "หลักสูตรวิชาโท",
            vec![Block::MinorProgram(MinorProgramBlock {
                source_url: source_url.to_string(),
            })],
        )
        .with_subtitle(Some("Minor Program Management".to_string())),
    )
}

pub mod extract;
pub mod generic;
pub mod router;
pub mod text;

use scraper::Html;

use crate::model::ContentModel;

/// Context for a mapping call. The URL hint only steers routing.
#[derive(Debug, Clone, Default)]
pub struct MapOptions {
    pub source_url: Option<String>,
}

impl MapOptions {
    pub fn with_url(url: impl Into<String>) -> Self {
        MapOptions {
            source_url: Some(url.into()),
        }
    }
}

/// Two-stage mapping: URL-routed specialized extractors, then the generic walker.
/// Never fails; the worst case is a titled model with no blocks.
pub fn map_document(doc: &Html, options: &MapOptions) -> ContentModel {
    if let Some(model) = router::route(doc, options) {
        return model;
    }
    generic::extract(doc)
}

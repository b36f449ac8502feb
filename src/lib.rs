pub mod config;
pub mod error;
pub mod fetch;
pub mod model;
pub mod parser;
pub mod portal;

pub use error::{PortalError, Result};
pub use model::ContentModel;
pub use parser::{map_document, MapOptions};

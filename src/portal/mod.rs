//! Scrapers for the portal's own pages: the side menu, the student profile
//! and the class timetable. Unlike the content mappers these return
//! page-specific datasets rather than a `ContentModel`.

pub mod menu;
pub mod profile;
pub mod timetable;

pub use menu::{scrape_menu, PortalDataset};
pub use profile::{scrape_profile, StudentProfile};
pub use timetable::{scrape_timetable, time_slots, Timetable};

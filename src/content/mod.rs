//! Content module - post models, rich text, and reading time

mod fields;
mod post;
pub mod reading_time;
pub mod rich_text;

pub use post::{parse_timestamp, Banner, ContentSection, NavPost, PostDetail, PostSummary};
pub use reading_time::estimate_reading_minutes;
pub use rich_text::RichTextBlock;

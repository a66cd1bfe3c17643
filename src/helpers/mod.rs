//! Helper functions for templates
//!
//! URL generation, HTML escaping and locale-aware date formatting shared by
//! the generator and the server.

mod date;
mod html;
mod url;

pub use date::*;
pub use html::*;
pub use url::*;

pub mod handler;
pub mod models;
pub mod selector;

pub use handler::create_content_router;
pub use models::{ContentLibrary, StyleTokens, Template, TextEntry, Tone};
pub use selector::{SelectionQuery, reshuffle_text, select_text};

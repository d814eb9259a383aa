//! HTML helpers for mail bodies and created content.

pub mod text;

pub use text::text_content;

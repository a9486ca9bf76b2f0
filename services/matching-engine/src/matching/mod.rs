//! Matching logic module
//!
//! Trigger rule plus the post-execution holding/position book-keeping

pub mod crossing;
pub mod fills;

pub use crossing::triggers;
pub use fills::apply_fill;

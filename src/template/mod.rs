//! Template module - layout, template flowset serialization and caching.
//!
//! - [`TemplateLayout`] / [`build_template`] - field layout and pre-built flowset bytes
//! - [`TemplateCache`] - one descriptor per record signature, ids from 256 upward

mod builder;
mod cache;

pub use builder::{build_template, flowset_length, BuiltTemplate, TemplateLayout};
pub use cache::{Signature, TemplateCache, TemplateDescriptor, TEMPLATE_ID_SPACE};

//! Builders for synthetic modules and loader lists.

pub mod image;
pub mod loader;

//! Langbase API client and types for pipe communication.
//!
//! Both AI collaborators of the analysis workflow (testimony classifier and
//! cause-tree generator) are Langbase pipes reached through [`LangbaseClient`].

mod client;
mod types;


pub use client::LangbaseClient;
pub use types::*;

/// Model used when the server creates its pipes.
pub const DEFAULT_MODEL: &str = "openai:gpt-4o";

//! Prompt module for LLM-based operations.
//!
//! Each submodule holds the messages and sampling options for one task.

pub mod phrase_extraction;
pub mod summary;

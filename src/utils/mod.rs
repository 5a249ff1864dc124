//! Utility modules for the workshop server.

pub mod exec;
pub mod git;

//! Git helpers.

mod ignore;

pub use ignore::GitIgnore;

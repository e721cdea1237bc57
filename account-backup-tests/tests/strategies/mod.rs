//! Strategy lifecycle tests
//!
//! Tree walks run against in-memory remotes, dump and archive strategies
//! against the mock executor.

mod dumps;
mod walker;

//! Unit tests for account-backup building blocks

mod registration;
mod retention;
mod schema;

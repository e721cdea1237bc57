//! Batch coordinator tests
//!
//! These tests drive `BackupManager` over real config stores with mocked
//! external tools and a recording mailer.

mod batch;
mod notification;

//! Managers orchestrating batches, registration, logging and notification

pub mod backup;
pub mod logging;
pub mod notification;
pub mod registration;

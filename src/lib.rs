//! Reconciles survey-response exports with the `teaching-stats` reporting
//! database: normalizes the dynamically-shaped response JSON into flat
//! answer rows, imports them with a conflict-free evaluation-id range, and
//! performs the one-time transactional upgrade of the legacy schema.

pub mod db;
pub mod error;
pub mod import;
pub mod settings;
pub mod survey;
pub mod upgrade;

pub use error::{Error, Result};

//! Alerting System
//!
//! Decides whether a detector alert may reach the user: the settings
//! gate (master switch, per-category toggles, active hours) and a
//! per-category re-notification throttle.

mod gate;
mod manager;

pub use gate::{allow_notification, check_gate, parse_clock};
pub use manager::{AlertCategory, AlertConfig, AlertManager, AlertState};

use thiserror::Error;

/// Alerting errors
#[derive(Debug, Error, PartialEq)]
pub enum AlertError {
    #[error("Invalid time of day {0:?}, expected HH:MM")]
    InvalidTime(String),
}

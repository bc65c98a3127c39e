//! Monitoring Sessions
//!
//! Runs the per-frame loop over a landmark feed, persists events,
//! publishes live statistics, dispatches notifications and enforces
//! that at most one monitoring or calibration run is active.

mod aggregator;
mod clock;
mod controller;
mod live;
mod monitor;
mod notifier;
mod source;

#[cfg(test)]
mod testing;

pub use aggregator::{LogEntry, SessionAggregator, SessionTotals};
pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{Controller, ControllerMode};
pub use live::{LiveStats, LiveStatsHandle};
pub use monitor::{run_calibration, run_monitoring, MonitorContext, SessionOutcome};
pub use notifier::{LogNotifier, Notification, NotificationDispatcher, Notifier, Popup};
pub use source::{frame_channel, ChannelSource, FrameSender, LandmarkFrame, LandmarkSource};

use thiserror::Error;

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Monitoring is already active")]
    AlreadyActive,

    #[error("Cannot start while {0} is running")]
    Conflict(ControllerMode),

    #[error("No active monitoring session")]
    NotMonitoring,

    #[error("Frame queue is full")]
    FeedFull,

    #[error("Frame feed is closed")]
    FeedClosed,

    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Detector error: {0}")]
    Detector(#[from] detector::DetectorError),

    #[error("Background task failed: {0}")]
    Task(String),
}

//! Alert Manager Implementation

use detector::EventType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// User-facing notification category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    Drowsiness,
    Stare,
    #[serde(rename = "low_bpm")]
    LowBlinkRate,
    Break,
}

impl AlertCategory {
    pub const ALL: [AlertCategory; 4] = [
        AlertCategory::Drowsiness,
        AlertCategory::Stare,
        AlertCategory::LowBlinkRate,
        AlertCategory::Break,
    ];

    /// Category notified for a detector event, if any
    pub fn for_event(event_type: EventType) -> Option<Self> {
        match event_type {
            EventType::FatigueScoreAlert => Some(AlertCategory::Drowsiness),
            EventType::StareAlertTriggered => Some(AlertCategory::Stare),
            EventType::LowBpmAlertTriggered => Some(AlertCategory::LowBlinkRate),
            EventType::BreakTaken => Some(AlertCategory::Break),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertCategory::Drowsiness => "drowsiness",
            AlertCategory::Stare => "stare",
            AlertCategory::LowBlinkRate => "low_bpm",
            AlertCategory::Break => "break",
        }
    }
}

impl fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Minimum seconds between drowsiness notifications (default: 10)
    pub drowsiness_cooldown_secs: u64,
    /// Minimum seconds between stare notifications (default: 30)
    pub stare_cooldown_secs: u64,
    /// Minimum seconds between low blink-rate notifications (default: 30)
    pub low_bpm_cooldown_secs: u64,
    /// Minimum seconds between break notifications (default: 0)
    pub break_cooldown_secs: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            drowsiness_cooldown_secs: 10,
            stare_cooldown_secs: 30,
            low_bpm_cooldown_secs: 30,
            break_cooldown_secs: 0,
        }
    }
}

impl AlertConfig {
    pub fn cooldown(&self, category: AlertCategory) -> Duration {
        Duration::from_secs(match category {
            AlertCategory::Drowsiness => self.drowsiness_cooldown_secs,
            AlertCategory::Stare => self.stare_cooldown_secs,
            AlertCategory::LowBlinkRate => self.low_bpm_cooldown_secs,
            AlertCategory::Break => self.break_cooldown_secs,
        })
    }
}

/// State of an alert category
#[derive(Debug, Clone)]
pub struct AlertState {
    /// Last time this category was notified
    pub last_fired: Instant,
    /// Number of notifications sent
    pub fire_count: usize,
}

/// Re-notification throttle keyed by category
pub struct AlertManager {
    config: AlertConfig,
    states: HashMap<AlertCategory, AlertState>,
}

impl AlertManager {
    pub fn new(config: AlertConfig) -> Self {
        info!("Creating alert manager with config: {:?}", config);
        Self {
            config,
            states: HashMap::new(),
        }
    }

    /// Check whether `category` is out of its cooldown
    pub fn should_fire(&self, category: AlertCategory, now: Instant) -> bool {
        if let Some(state) = self.states.get(&category) {
            let cooldown = self.config.cooldown(category);
            if now.saturating_duration_since(state.last_fired) < cooldown {
                debug!("{} notification suppressed: in cooldown period", category);
                return false;
            }
        }
        true
    }

    /// Record that a notification was sent
    pub fn record_fire(&mut self, category: AlertCategory, now: Instant) {
        let state = self.states.entry(category).or_insert(AlertState {
            last_fired: now,
            fire_count: 0,
        });
        state.last_fired = now;
        state.fire_count += 1;

        debug!("Notification recorded: {} (count: {})", category, state.fire_count);
    }

    /// `should_fire` followed by `record_fire` when it passes
    pub fn try_fire(&mut self, category: AlertCategory, now: Instant) -> bool {
        if self.should_fire(category, now) {
            self.record_fire(category, now);
            true
        } else {
            false
        }
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new(AlertConfig::default())
    }
}

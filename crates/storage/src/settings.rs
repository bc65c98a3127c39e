//! User settings record

use serde::{Deserialize, Serialize};

/// The single settings row
///
/// Accepts camelCase keys on input as well, which is what the web
/// dashboard posts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(alias = "userName")]
    pub user_name: String,
    /// Target blinks per minute
    #[serde(alias = "goalBlinkRate")]
    pub goal_blink_rate: u32,
    #[serde(alias = "goalBreaks")]
    pub goal_breaks: u32,
    #[serde(alias = "enableWeeklyGoals")]
    pub enable_weekly_goals: bool,
    #[serde(alias = "enableDailyStreak")]
    pub enable_daily_streak: bool,
    /// Master switch for every notification
    #[serde(alias = "masterNotifications")]
    pub master_notifications: bool,
    /// Drowsiness, stare and low blink-rate notifications
    #[serde(alias = "notifyBlink")]
    pub notify_blink: bool,
    #[serde(alias = "notifyBreak")]
    pub notify_break: bool,
    /// Minutes of work between eye breaks
    #[serde(alias = "notifyFrequency")]
    pub notify_frequency: u32,
    /// Start of the daily notification window, "HH:MM"
    #[serde(alias = "activeStartTime")]
    pub active_start_time: String,
    /// End of the daily notification window, "HH:MM"
    #[serde(alias = "activeEndTime")]
    pub active_end_time: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            user_name: "User".to_string(),
            goal_blink_rate: 20,
            goal_breaks: 5,
            enable_weekly_goals: true,
            enable_daily_streak: false,
            master_notifications: true,
            notify_blink: true,
            notify_break: true,
            notify_frequency: 30,
            active_start_time: "09:00".to_string(),
            active_end_time: "17:00".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_dashboard_keys() {
        let settings: Settings = serde_json::from_str(
            r#"{"userName": "Asha", "notifyFrequency": 25, "masterNotifications": false}"#,
        )
        .unwrap();
        assert_eq!(settings.user_name, "Asha");
        assert_eq!(settings.notify_frequency, 25);
        assert!(!settings.master_notifications);
        assert_eq!(settings.active_end_time, "17:00");
    }
}

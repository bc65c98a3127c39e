//! Settings gate

use crate::{AlertCategory, AlertError};
use chrono::NaiveTime;
use storage::{Settings, StorageError};
use tracing::{debug, error};

/// Parse an "HH:MM" setting
pub fn parse_clock(s: &str) -> Result<NaiveTime, AlertError> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").map_err(|_| AlertError::InvalidTime(s.to_string()))
}

/// Gate decision against a settings record
///
/// No settings row means nothing is allowed. The active window is
/// inclusive at both ends and wraps past midnight when it starts after
/// it ends.
pub fn check_gate(
    category: AlertCategory,
    settings: Option<&Settings>,
    now: NaiveTime,
) -> Result<bool, AlertError> {
    let Some(settings) = settings else {
        return Ok(false);
    };
    if !settings.master_notifications {
        return Ok(false);
    }

    let toggle = match category {
        AlertCategory::Drowsiness | AlertCategory::Stare | AlertCategory::LowBlinkRate => {
            settings.notify_blink
        }
        AlertCategory::Break => settings.notify_break,
    };
    if !toggle {
        return Ok(false);
    }

    let start = parse_clock(&settings.active_start_time)?;
    let end = parse_clock(&settings.active_end_time)?;
    Ok(in_window(start, end, now))
}

fn in_window(start: NaiveTime, end: NaiveTime, now: NaiveTime) -> bool {
    if start <= end {
        start <= now && now <= end
    } else {
        now >= start || now <= end
    }
}

/// Gate decision from a settings read, failing open on any error
pub fn allow_notification(
    category: AlertCategory,
    settings: Result<Option<Settings>, StorageError>,
    now: NaiveTime,
) -> bool {
    let settings = match settings {
        Ok(s) => s,
        Err(e) => {
            error!("Could not read notification settings: {}", e);
            return true;
        }
    };

    match check_gate(category, settings.as_ref(), now) {
        Ok(allowed) => {
            if !allowed {
                debug!("{} notification suppressed by settings", category);
            }
            allowed
        }
        Err(e) => {
            error!("Could not check notification settings: {}", e);
            true
        }
    }
}

//! Notification dispatch
//!
//! The frame loop hands notifications to a bounded queue and moves on.
//! A worker task applies the settings gate and the per-category
//! throttle, then calls the [`Notifier`]. Nothing on this path can fail
//! the frame loop.

use crate::SessionError;
use alerting::{allow_notification, AlertCategory, AlertConfig, AlertManager};
use chrono::NaiveTime;
use detector::DetectorEvent;
use std::sync::Arc;
use std::time::{Duration, Instant};
use storage::Repository;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Desktop pop-up content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Popup {
    pub title: String,
    pub message: String,
}

/// A user-facing notification and its spoken cue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// `None` for ungated voice cues
    pub category: Option<AlertCategory>,
    pub popup: Option<Popup>,
    pub spoken: String,
}

impl Notification {
    fn alert(category: AlertCategory, title: &str, message: String, spoken: &str) -> Self {
        Self {
            category: Some(category),
            popup: Some(Popup {
                title: title.to_string(),
                message,
            }),
            spoken: spoken.to_string(),
        }
    }

    fn cue(spoken: &str) -> Self {
        Self {
            category: None,
            popup: None,
            spoken: spoken.to_string(),
        }
    }

    /// Notification raised by a detector event, if it raises one
    pub fn for_event(event: &DetectorEvent, break_duration: Duration) -> Option<Self> {
        let notification = match *event {
            DetectorEvent::FatigueAlert { score } => Self::alert(
                AlertCategory::Drowsiness,
                "Fatigue Alert!",
                format!("High fatigue score: {score}. Consider taking a break."),
                "High level of fatigue detected. Please consider taking a break.",
            ),
            DetectorEvent::StareAlert { seconds_since_blink } => Self::alert(
                AlertCategory::Stare,
                "Eye Strain Warning!",
                format!("No blink for {}+ seconds!", seconds_since_blink as u64),
                "Please blink your eyes.",
            ),
            DetectorEvent::LowBlinkRate { bpm } => Self::alert(
                AlertCategory::LowBlinkRate,
                "Low Blink Rate",
                format!("Low blink rate ({} BPM).", bpm as u64),
                "Your blink rate is low.",
            ),
            DetectorEvent::BreakTaken => Self::alert(
                AlertCategory::Break,
                "Take a Break!",
                format!("Time for a {}-second break!", break_duration.as_secs()),
                "It's time for a short eye break.",
            ),
            DetectorEvent::UserActive { .. } => Self::cue("Welcome back."),
            DetectorEvent::UserIdle { .. } => Self::cue("Monitoring paused."),
            DetectorEvent::Blink | DetectorEvent::MicroSleep { .. } | DetectorEvent::Yawn => {
                return None
            }
        };
        Some(notification)
    }
}

/// Delivery backend (desktop pop-ups, text-to-speech, ...)
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), SessionError>;
}

/// Writes notifications to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), SessionError> {
        match &notification.popup {
            Some(popup) => info!(
                category = ?notification.category,
                "{}: {} ({})",
                popup.title,
                popup.message,
                notification.spoken
            ),
            None => info!("{}", notification.spoken),
        }
        Ok(())
    }
}

/// Sending side of the notification queue
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::Sender<Notification>,
}

impl NotificationDispatcher {
    /// Start the worker; it exits once every dispatcher clone is dropped
    pub fn spawn(
        repo: Repository,
        notifier: Arc<dyn Notifier>,
        config: AlertConfig,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        Self::spawn_with_clock(repo, notifier, config, capacity, || {
            chrono::Local::now().time()
        })
    }

    /// Same as [`spawn`](Self::spawn) with a custom wall clock for the
    /// active-hours window
    pub fn spawn_with_clock(
        repo: Repository,
        notifier: Arc<dyn Notifier>,
        config: AlertConfig,
        capacity: usize,
        time_of_day: fn() -> NaiveTime,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = NotificationWorker {
            rx,
            repo,
            notifier,
            throttle: AlertManager::new(config),
            time_of_day,
        };
        (Self { tx }, tokio::spawn(worker.run()))
    }

    /// Queue a notification without waiting
    pub fn dispatch(&self, notification: Notification) {
        match self.tx.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(n)) => {
                warn!("Notification queue full, dropping {:?}", n.category);
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Notification worker stopped, dropping notification");
            }
        }
    }
}

struct NotificationWorker {
    rx: mpsc::Receiver<Notification>,
    repo: Repository,
    notifier: Arc<dyn Notifier>,
    throttle: AlertManager,
    time_of_day: fn() -> NaiveTime,
}

impl NotificationWorker {
    async fn run(mut self) {
        debug!("Notification worker started");
        while let Some(notification) = self.rx.recv().await {
            if let Some(category) = notification.category {
                let settings = self.repo.get_settings().await;
                if !allow_notification(category, settings, (self.time_of_day)()) {
                    continue;
                }
                if !self.throttle.try_fire(category, Instant::now()) {
                    continue;
                }
            }

            if let Err(e) = self.notifier.notify(&notification) {
                warn!("Notification delivery failed: {}", e);
            }
        }
        debug!("Notification worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use storage::Settings;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<Notification>>,
    }

    impl Notifier for Recording {
        fn notify(&self, notification: &Notification) -> Result<(), SessionError> {
            self.seen.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    struct Failing;

    impl Notifier for Failing {
        fn notify(&self, _: &Notification) -> Result<(), SessionError> {
            Err(SessionError::Delivery("no display".into()))
        }
    }

    fn noon() -> NaiveTime {
        NaiveTime::from_hms_opt(12, 0, 0).unwrap()
    }

    fn night() -> NaiveTime {
        NaiveTime::from_hms_opt(23, 0, 0).unwrap()
    }

    fn stare() -> Notification {
        Notification::for_event(
            &DetectorEvent::StareAlert {
                seconds_since_blink: 8.4,
            },
            Duration::from_secs(20),
        )
        .unwrap()
    }

    #[test]
    fn test_texts() {
        let n = Notification::for_event(&DetectorEvent::FatigueAlert { score: 11 }, Duration::ZERO)
            .unwrap();
        assert_eq!(n.category, Some(AlertCategory::Drowsiness));
        assert_eq!(
            n.popup.unwrap().message,
            "High fatigue score: 11. Consider taking a break."
        );

        assert_eq!(stare().popup.unwrap().message, "No blink for 8+ seconds!");

        let n = Notification::for_event(&DetectorEvent::BreakTaken, Duration::from_secs(20)).unwrap();
        assert_eq!(n.popup.unwrap().message, "Time for a 20-second break!");

        let n = Notification::for_event(&DetectorEvent::UserActive { idle_secs: 50.0 }, Duration::ZERO)
            .unwrap();
        assert_eq!(n.category, None);
        assert_eq!(n.spoken, "Welcome back.");

        assert!(Notification::for_event(&DetectorEvent::Blink, Duration::ZERO).is_none());
    }

    #[tokio::test]
    async fn test_gate_and_throttle() {
        let repo = Repository::in_memory().await.unwrap();
        let recorder = Arc::new(Recording::default());
        let (dispatcher, worker) = NotificationDispatcher::spawn_with_clock(
            repo,
            recorder.clone(),
            AlertConfig::default(),
            8,
            noon,
        );

        // second stare falls inside the cooldown
        dispatcher.dispatch(stare());
        dispatcher.dispatch(stare());
        dispatcher.dispatch(Notification::cue("Welcome back."));
        drop(dispatcher);
        worker.await.unwrap();

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].category, Some(AlertCategory::Stare));
        assert_eq!(seen[1].spoken, "Welcome back.");
    }

    #[tokio::test]
    async fn test_outside_active_hours() {
        let repo = Repository::in_memory().await.unwrap();
        let recorder = Arc::new(Recording::default());
        let (dispatcher, worker) = NotificationDispatcher::spawn_with_clock(
            repo,
            recorder.clone(),
            AlertConfig::default(),
            8,
            night,
        );

        dispatcher.dispatch(stare());
        // voice cues ignore the window
        dispatcher.dispatch(Notification::cue("Monitoring paused."));
        drop(dispatcher);
        worker.await.unwrap();

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].category, None);
    }

    #[tokio::test]
    async fn test_category_toggle() {
        let repo = Repository::in_memory().await.unwrap();
        repo.save_settings(&Settings {
            notify_blink: false,
            ..Default::default()
        })
        .await
        .unwrap();

        let recorder = Arc::new(Recording::default());
        let (dispatcher, worker) = NotificationDispatcher::spawn_with_clock(
            repo,
            recorder.clone(),
            AlertConfig::default(),
            8,
            noon,
        );
        dispatcher.dispatch(stare());
        dispatcher.dispatch(
            Notification::for_event(&DetectorEvent::BreakTaken, Duration::from_secs(20)).unwrap(),
        );
        drop(dispatcher);
        worker.await.unwrap();

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].category, Some(AlertCategory::Break));
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        let repo = Repository::in_memory().await.unwrap();
        let (dispatcher, worker) = NotificationDispatcher::spawn_with_clock(
            repo,
            Arc::new(Failing),
            AlertConfig::default(),
            8,
            noon,
        );
        dispatcher.dispatch(stare());
        drop(dispatcher);
        assert!(worker.await.is_ok());
    }
}

//! Monitoring and calibration runs over a landmark feed

use crate::aggregator::{LogEntry, SessionAggregator, SessionTotals};
use crate::clock::{Clock, SystemClock};
use crate::live::LiveStatsHandle;
use crate::notifier::{Notification, NotificationDispatcher};
use crate::source::LandmarkSource;
use crate::SessionError;
use chrono::NaiveDateTime;
use detector::{
    CalibrationBuilder, CalibrationPhase, CalibrationProfile, DetectorConfig, EventType,
    FatigueDetector, FrameAnalysis,
};
use feature_engine::FrameFeatures;
use metrics::{counter, gauge};
use report::SessionReport;
use std::sync::Arc;
use std::time::Duration;
use storage::{ProfileStore, Repository};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Everything a monitoring run needs besides the feed
#[derive(Clone)]
pub struct MonitorContext {
    pub repo: Repository,
    pub profiles: ProfileStore,
    pub config: DetectorConfig,
    pub dispatcher: Option<NotificationDispatcher>,
    pub live: LiveStatsHandle,
    pub clock: Arc<dyn Clock>,
}

impl MonitorContext {
    pub fn new(repo: Repository, profiles: ProfileStore, config: DetectorConfig) -> Self {
        Self {
            repo,
            profiles,
            config,
            dispatcher: None,
            live: LiveStatsHandle::new(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: NotificationDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn log(&self, session_id: i64, entry: LogEntry) {
        if let Err(e) = self
            .repo
            .log_event(session_id, entry.event_type, entry.value, None, wall_now())
            .await
        {
            error!("Dropped {} event for session {}: {}", entry.event_type, session_id, e);
        }
    }
}

/// How a monitoring run ended
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub session_id: i64,
    pub totals: SessionTotals,
    /// `None` when the report could not be built
    pub report: Option<SessionReport>,
}

fn wall_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Run one monitoring session until `stop` flips to true, its sender is
/// dropped, or the feed ends
///
/// Frames are processed strictly one at a time. Once the loop exits
/// the session is always closed out.
pub async fn run_monitoring<S: LandmarkSource>(
    ctx: &MonitorContext,
    source: &mut S,
    mut stop: watch::Receiver<bool>,
) -> Result<SessionOutcome, SessionError> {
    let started = ctx.clock.now();
    let session_id = ctx.repo.start_session(wall_now()).await?;
    ctx.log(session_id, LogEntry::new(EventType::SessionStart, None)).await;
    info!("Session {} started", session_id);

    let profile = match ctx.profiles.load().await {
        Ok(p) => p,
        Err(e) => {
            warn!("Could not read calibration profile: {}", e);
            None
        }
    };
    let mut detector = FatigueDetector::new(ctx.config.clone(), profile.as_ref(), started);

    let work_duration = match ctx.repo.get_settings().await {
        Ok(Some(s)) if s.notify_frequency > 0 => Duration::from_secs(u64::from(s.notify_frequency) * 60),
        Ok(_) => ctx.config.default_work_duration(),
        Err(e) => {
            warn!("Could not read settings, using default break interval: {}", e);
            ctx.config.default_work_duration()
        }
    };
    detector.set_work_duration(work_duration);

    let mut aggregator = SessionAggregator::new(ctx.config.summary_interval());
    ctx.live.begin(session_id, started).await;
    source.discard_pending();

    let mut stopping = *stop.borrow_and_update();
    while !stopping {
        let frame = tokio::select! {
            biased;
            changed = stop.changed() => {
                stopping = changed.is_err() || *stop.borrow_and_update();
                continue;
            }
            frame = source.next_frame() => frame,
        };
        let Some(frame) = frame else {
            info!("Landmark feed ended");
            break;
        };

        let now = ctx.clock.now();
        let analysis = match detector.process_landmarks(frame.landmarks.as_ref(), now) {
            Ok(a) => a,
            Err(e) => {
                warn!("Skipping frame: {}", e);
                continue;
            }
        };

        for entry in aggregator.record(&analysis, now) {
            counter!("blinkwatch_events_total", "type" => entry.event_type.as_str()).increment(1);
            ctx.log(session_id, entry).await;
        }
        gauge!("blinkwatch_fatigue_score").set(f64::from(analysis.fatigue_score));

        notify(ctx, &analysis);
        ctx.live
            .update(&analysis, &aggregator, detector.state().last_status_change)
            .await;
    }

    // Close-out runs to completion once the loop has exited
    let state = detector.state();
    let totals = aggregator.finalize(state.status, state.last_status_change, ctx.clock.now());
    ctx.log(session_id, LogEntry::new(EventType::SessionEnd, None)).await;

    let closed = ctx
        .repo
        .end_session(
            session_id,
            totals.active_secs as i64,
            totals.idle_secs as i64,
            wall_now(),
        )
        .await;
    ctx.live.end(totals.active_secs).await;
    if let Err(e) = closed {
        error!("Could not close session {}: {}", session_id, e);
        return Err(e.into());
    }

    info!(
        "Session {} ended: active {:.0}s, idle {:.0}s, {} blinks, {} yawns",
        session_id, totals.active_secs, totals.idle_secs, totals.blinks, totals.yawns
    );

    let report = match report::session_report(&ctx.repo, session_id).await {
        Ok(r) => {
            match serde_json::to_string(&r) {
                Ok(json) => info!("Session report: {}", json),
                Err(e) => warn!("Could not serialize session report: {}", e),
            }
            Some(r)
        }
        Err(e) => {
            warn!("Could not build report for session {}: {}", session_id, e);
            None
        }
    };

    Ok(SessionOutcome {
        session_id,
        totals,
        report,
    })
}

fn notify(ctx: &MonitorContext, analysis: &FrameAnalysis) {
    let Some(dispatcher) = &ctx.dispatcher else {
        return;
    };
    for event in &analysis.events {
        if let Some(n) = Notification::for_event(event, ctx.config.break_duration()) {
            dispatcher.dispatch(n);
        }
    }
}

/// Collect calibration frames until both phases are full or the feed ends
pub async fn run_calibration<S: LandmarkSource>(
    config: &DetectorConfig,
    source: &mut S,
) -> Result<CalibrationProfile, SessionError> {
    let mut builder = CalibrationBuilder::from_config(config);
    source.discard_pending();
    info!("Calibration started: keep your eyes open and look at the screen");

    let mut phase = builder.phase();
    while !builder.is_done() {
        let Some(frame) = source.next_frame().await else {
            warn!("Landmark feed ended during calibration");
            break;
        };

        let features = match frame.landmarks.as_ref().map(FrameFeatures::extract).transpose() {
            Ok(f) => f,
            Err(e) => {
                debug!("Calibration frame skipped: {}", e);
                None
            }
        };

        let next = builder.push(features.as_ref());
        if next != phase && next == CalibrationPhase::Blink {
            info!("Calibration: now blink naturally");
        } else if features.is_some() {
            let (recorded, quota) = builder.progress();
            debug!("Calibration {:?}: {}/{}", next, recorded, quota);
        }
        phase = next;
    }

    Ok(builder.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::source::{frame_channel, LandmarkFrame};
    use crate::testing::face;
    use detector::DetectorError;
    use sqlx::{Connection, SqliteConnection};
    use std::collections::VecDeque;

    struct ScriptedSource {
        frames: VecDeque<LandmarkFrame>,
        clock: Arc<ManualClock>,
        step: Duration,
    }

    impl LandmarkSource for ScriptedSource {
        async fn next_frame(&mut self) -> Option<LandmarkFrame> {
            let frame = self.frames.pop_front()?;
            self.clock.advance(self.step);
            Some(frame)
        }
    }

    /// Drops the events table from a second connection before frame `drop_at`
    struct TableDroppingSource {
        inner: ScriptedSource,
        conn: Option<SqliteConnection>,
        drop_at: usize,
        served: usize,
    }

    impl LandmarkSource for TableDroppingSource {
        async fn next_frame(&mut self) -> Option<LandmarkFrame> {
            if self.served == self.drop_at {
                if let Some(mut conn) = self.conn.take() {
                    sqlx::query("DROP TABLE events").execute(&mut conn).await.unwrap();
                    conn.close().await.unwrap();
                }
            }
            self.served += 1;
            self.inner.next_frame().await
        }
    }

    fn idle_round_trip_frames() -> VecDeque<LandmarkFrame> {
        let mut frames: VecDeque<LandmarkFrame> = VecDeque::new();
        frames.extend((0..10).map(|_| face(0.03)));
        frames.extend((0..50).map(|_| LandmarkFrame::no_face()));
        frames.extend((0..10).map(|_| face(0.03)));
        frames
    }

    async fn context(dir: &tempfile::TempDir, clock: Arc<ManualClock>) -> MonitorContext {
        let repo = Repository::in_memory().await.unwrap();
        let profiles = ProfileStore::new(dir.path().join("calibration_profile.json"));
        MonitorContext::new(repo, profiles, DetectorConfig::default()).with_clock(clock)
    }

    #[tokio::test]
    async fn test_idle_round_trip_accounting() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new());
        let ctx = context(&dir, clock.clone()).await;

        let mut source = ScriptedSource {
            frames: idle_round_trip_frames(),
            clock,
            step: Duration::from_secs(1),
        };

        let (_stop_tx, stop_rx) = watch::channel(false);
        let outcome = run_monitoring(&ctx, &mut source, stop_rx).await.unwrap();

        let t = outcome.totals;
        assert!(t.active_secs > 0.0 && t.idle_secs > 0.0);
        assert!((t.active_secs + t.idle_secs - 70.0).abs() < 1e-6);

        let counts = ctx.repo.event_counts(outcome.session_id).await.unwrap();
        assert_eq!(counts.get(EventType::SessionStart), 1);
        assert_eq!(counts.get(EventType::UserIdleStart), 1);
        assert_eq!(counts.get(EventType::UserActiveResume), 1);
        assert_eq!(counts.get(EventType::SessionEnd), 1);
        assert!(counts.get(EventType::SummaryEar) >= 1);

        let record = ctx.repo.get_session(outcome.session_id).await.unwrap().unwrap();
        assert!(record.is_completed());
        assert_eq!(record.total_active_time_sec, t.active_secs as i64);

        let live = ctx.live.snapshot(ctx.clock.now()).await;
        assert!(!live.monitoring);
        assert!(outcome.report.is_some());
    }

    #[tokio::test]
    async fn test_event_write_failures_do_not_stop_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("monitoring_data.db").display());
        let clock = Arc::new(ManualClock::new());
        let repo = Repository::connect(&url).await.unwrap();
        let profiles = ProfileStore::new(dir.path().join("calibration_profile.json"));
        let ctx = MonitorContext::new(repo, profiles, DetectorConfig::default())
            .with_clock(clock.clone());

        // every write after the fifth frame fails, including SESSION_END
        let mut source = TableDroppingSource {
            inner: ScriptedSource {
                frames: idle_round_trip_frames(),
                clock,
                step: Duration::from_secs(1),
            },
            conn: Some(SqliteConnection::connect(&url).await.unwrap()),
            drop_at: 5,
            served: 0,
        };

        let (_stop_tx, stop_rx) = watch::channel(false);
        let outcome = run_monitoring(&ctx, &mut source, stop_rx).await.unwrap();
        assert_eq!(source.served, 71);

        let t = outcome.totals;
        assert!(t.active_secs > 0.0 && t.idle_secs > 0.0);
        assert!((t.active_secs + t.idle_secs - 70.0).abs() < 1e-6);

        let record = ctx.repo.get_session(outcome.session_id).await.unwrap().unwrap();
        assert!(record.is_completed());
        assert_eq!(record.total_active_time_sec, t.active_secs as i64);
        assert!(ctx.repo.event_counts(outcome.session_id).await.is_err());
        assert!(outcome.report.is_none());
        assert!(!ctx.live.snapshot(ctx.clock.now()).await.monitoring);
    }

    #[tokio::test]
    async fn test_stop_signal_closes_session() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new());
        let ctx = context(&dir, clock).await;

        let (tx, mut source) = frame_channel(16);
        let (stop_tx, stop_rx) = watch::channel(false);
        let task_ctx = ctx.clone();
        let run = tokio::spawn(async move { run_monitoring(&task_ctx, &mut source, stop_rx).await });

        // wait for the run to start before feeding it
        while !ctx.live.snapshot(ctx.clock.now()).await.monitoring {
            tokio::task::yield_now().await;
        }
        tx.push(face(0.03)).unwrap();
        stop_tx.send(true).unwrap();

        let outcome = run.await.unwrap().unwrap();
        let record = ctx.repo.get_session(outcome.session_id).await.unwrap().unwrap();
        assert!(record.is_completed());
    }

    #[tokio::test]
    async fn test_calibration_profile() {
        let clock = Arc::new(ManualClock::new());
        let config = DetectorConfig {
            calibration_open_frames: 3,
            calibration_blink_frames: 3,
            ..Default::default()
        };
        let mut frames: VecDeque<LandmarkFrame> = VecDeque::new();
        frames.extend((0..3).map(|_| face(0.03)));
        frames.push_back(LandmarkFrame::no_face());
        frames.extend((0..3).map(|_| face(0.0)));
        let mut source = ScriptedSource {
            frames,
            clock,
            step: Duration::from_millis(33),
        };

        let profile = run_calibration(&config, &mut source).await.unwrap();
        assert!(profile.is_valid());
        assert!((profile.avg_open_ear - 0.3).abs() < 1e-3);
        assert!((profile.ear_threshold - 0.15).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_calibration_without_face_fails() {
        let clock = Arc::new(ManualClock::new());
        let mut source = ScriptedSource {
            frames: (0..5).map(|_| LandmarkFrame::no_face()).collect(),
            clock,
            step: Duration::from_millis(33),
        };

        let err = run_calibration(&DetectorConfig::default(), &mut source)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Detector(DetectorError::CalibrationFailed { .. })
        ));
    }
}

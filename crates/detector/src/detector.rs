//! Per-frame blink, yawn, gaze and fatigue state machine

use crate::analysis::{DetectorEvent, FrameAnalysis};
use crate::calibration::CalibrationProfile;
use crate::config::DetectorConfig;
use crate::state::{DetectorState, EyeState, UserStatus, YawnTimer};
use crate::DetectorError;
use feature_engine::{vertical_offset, FaceLandmarks, FrameFeatures};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Reference values derived from the calibration profile
#[derive(Debug, Clone, Copy)]
struct Baseline {
    ear_threshold: f64,
    center_gaze: Option<f64>,
    neutral_nose_y: f64,
    face_height: f64,
}

impl Baseline {
    fn resolve(profile: Option<&CalibrationProfile>, config: &DetectorConfig) -> Self {
        let positive = |v: f64| (v.is_finite() && v > 0.0).then_some(v);

        match profile {
            Some(p) if p.is_valid() => Self {
                ear_threshold: p.ear_threshold,
                center_gaze: Some(p.avg_center_gaze),
                neutral_nose_y: p.avg_nose_y,
                face_height: p.avg_face_height,
            },
            Some(p) => {
                warn!(
                    "Calibration profile incomplete; using default EAR threshold {:.2}",
                    config.default_ear_threshold
                );
                Self {
                    ear_threshold: config.default_ear_threshold,
                    center_gaze: positive(p.avg_center_gaze),
                    neutral_nose_y: positive(p.avg_nose_y).unwrap_or(0.0),
                    face_height: positive(p.avg_face_height).unwrap_or(0.0),
                }
            }
            None => {
                warn!(
                    "No calibration profile; using default EAR threshold {:.2}",
                    config.default_ear_threshold
                );
                Self {
                    ear_threshold: config.default_ear_threshold,
                    center_gaze: None,
                    neutral_nose_y: 0.0,
                    face_height: 0.0,
                }
            }
        }
    }
}

/// Head orientation relative to the calibrated baseline
#[derive(Debug, Clone, Copy)]
struct GazeReading {
    looking_away: bool,
    centered: bool,
    tilted_down: bool,
}

/// Frame-by-frame fatigue detector for one monitoring session
pub struct FatigueDetector {
    config: DetectorConfig,
    baseline: Baseline,
    work_duration: Duration,
    state: DetectorState,
}

impl FatigueDetector {
    /// Create a detector for a session starting at `now`
    ///
    /// A missing or invalid profile is not fatal: the default EAR
    /// threshold is used and gaze can never be asserted centered.
    pub fn new(config: DetectorConfig, profile: Option<&CalibrationProfile>, now: Instant) -> Self {
        let baseline = Baseline::resolve(profile, &config);
        Self {
            work_duration: config.default_work_duration(),
            baseline,
            config,
            state: DetectorState::new(now),
        }
    }

    /// Work interval between breaks
    pub fn set_work_duration(&mut self, duration: Duration) {
        self.work_duration = duration;
    }

    pub fn ear_threshold(&self) -> f64 {
        self.baseline.ear_threshold
    }

    pub fn state(&self) -> &DetectorState {
        &self.state
    }

    /// Advance the state machine by one frame
    ///
    /// `features` is `None` when no face was detected.
    pub fn process(&mut self, features: Option<&FrameFeatures>, now: Instant) -> FrameAnalysis {
        let mut events = Vec::new();

        if let Some(started) = self.state.break_started {
            if now.saturating_duration_since(started) < self.config.break_duration() {
                return self.analysis(None, true, events);
            }
            debug!("Break over, resuming detection");
            self.state.break_started = None;
            self.state.last_break = now;
        }

        match features {
            Some(f) => {
                let on_break = self.process_face(f, now, &mut events);
                self.analysis(Some(*f), on_break, events)
            }
            None => {
                self.process_no_face(now, &mut events);
                self.analysis(None, false, events)
            }
        }
    }

    /// Extract features from raw landmarks and process the frame
    pub fn process_landmarks(
        &mut self,
        landmarks: Option<&FaceLandmarks>,
        now: Instant,
    ) -> Result<FrameAnalysis, DetectorError> {
        let features = landmarks.map(FrameFeatures::extract).transpose()?;
        Ok(self.process(features.as_ref(), now))
    }

    /// Returns true when this frame started a break
    fn process_face(
        &mut self,
        f: &FrameFeatures,
        now: Instant,
        events: &mut Vec<DetectorEvent>,
    ) -> bool {
        if self.state.status == UserStatus::Idle {
            let idle = now.saturating_duration_since(self.state.last_status_change);
            info!("User returned after {}s", idle.as_secs());
            events.push(DetectorEvent::UserActive {
                idle_secs: idle.as_secs_f64(),
            });
            self.state.last_blink = now;
            self.state.last_break = now;
            self.state.last_status_change = now;
        }
        self.state.status = UserStatus::Active;
        self.state.no_face_since = None;

        let ear_velocity = self
            .state
            .previous_ear
            .map_or(0.0, |previous| f.avg_ear - previous);
        self.state.previous_ear = Some(f.avg_ear);

        let gaze = self.read_gaze(f);
        self.state.gaze_centered = gaze.centered;
        self.state.head_tilted_down = gaze.tilted_down;

        if now.saturating_duration_since(self.state.last_break) > self.work_duration {
            info!("Work interval elapsed, starting break");
            self.state.break_started = Some(now);
            events.push(DetectorEvent::BreakTaken);
            return true;
        }

        self.track_yawn(f.mar, now, events);

        // A nod while the eyes are shut keeps the closure running so the
        // reopening frame can be scored as a micro-sleep.
        let nodding_off = gaze.tilted_down
            && !gaze.looking_away
            && self.state.eye_state == EyeState::Closed;

        if gaze.centered {
            self.state.gaze_stable_frames = self.state.gaze_stable_frames.saturating_add(1);
        } else if !nodding_off {
            self.state.gaze_stable_frames = 0;
            self.state.eye_state = EyeState::Open;
            self.state.eye_closed_since = None;
            self.state.last_blink = now;
        }

        if self.state.gaze_stable_frames > self.config.gaze_stability_frames {
            self.track_blink(f.avg_ear, ear_velocity, gaze.tilted_down, now, events);
            self.check_stare(now, events);
            self.track_blink_rate(now, events);
        }

        self.decay_score(now);
        self.check_fatigue(now, events);
        false
    }

    fn process_no_face(&mut self, now: Instant, events: &mut Vec<DetectorEvent>) {
        self.state.gaze_centered = false;
        self.state.head_tilted_down = false;

        let Some(since) = self.state.no_face_since else {
            self.state.no_face_since = Some(now);
            return;
        };

        if now.saturating_duration_since(since) > self.config.idle_threshold()
            && self.state.status == UserStatus::Active
        {
            let active = now.saturating_duration_since(self.state.last_status_change);
            info!("No face for {}s, user is idle", self.config.idle_threshold_secs);
            events.push(DetectorEvent::UserIdle {
                active_secs: active.as_secs_f64(),
            });
            self.state.status = UserStatus::Idle;
            self.state.last_status_change = now;
        }
    }

    fn read_gaze(&self, f: &FrameFeatures) -> GazeReading {
        let tolerance = self.config.gaze_tolerance;
        let looking_away = match self.baseline.center_gaze {
            Some(center) => !(center - tolerance < f.gaze_ratio && f.gaze_ratio < center + tolerance),
            None => true,
        };

        let offset = vertical_offset(f.nose_y, self.baseline.neutral_nose_y, self.baseline.face_height);
        let tilted_down = offset.is_some_and(|o| o > self.config.head_tilt_down_ratio);
        let tilted_up = offset.is_some_and(|o| o < -self.config.head_tilt_up_ratio);

        GazeReading {
            looking_away,
            centered: !(looking_away || tilted_down || tilted_up),
            tilted_down,
        }
    }

    fn track_yawn(&mut self, mar: f64, now: Instant, events: &mut Vec<DetectorEvent>) {
        if mar <= self.config.yawn_mar_threshold {
            self.state.yawn = YawnTimer::Idle;
            return;
        }

        match self.state.yawn {
            YawnTimer::Idle => self.state.yawn = YawnTimer::Running(now),
            YawnTimer::Running(start) => {
                if now.saturating_duration_since(start) > self.config.yawn_duration() {
                    self.state.fatigue.add(self.config.score_increment_yawn);
                    info!("Yawn detected, fatigue score {}", self.state.fatigue.value());
                    events.push(DetectorEvent::Yawn);
                    self.state.yawn = YawnTimer::Counted;
                }
            }
            YawnTimer::Counted => {}
        }
    }

    fn track_blink(
        &mut self,
        ear: f64,
        velocity: f64,
        head_tilted_down: bool,
        now: Instant,
        events: &mut Vec<DetectorEvent>,
    ) {
        let threshold = self.baseline.ear_threshold;

        match self.state.eye_state {
            EyeState::Open if velocity < self.config.ear_velocity_threshold => {
                self.state.eye_state = EyeState::Closing;
            }
            EyeState::Closing if ear < threshold => {
                self.state.eye_state = EyeState::Closed;
                self.state.last_blink = now;
                self.state.blink_times.push_back(now);
                self.state.eye_closed_since = Some(now);
                events.push(DetectorEvent::Blink);
            }
            EyeState::Closed if ear > threshold * self.config.reopen_hysteresis => {
                self.state.eye_state = EyeState::Open;
                let Some(since) = self.state.eye_closed_since.take() else {
                    return;
                };
                let closed = now.saturating_duration_since(since);
                if closed <= self.config.micro_sleep_threshold() {
                    return;
                }

                let duration_ms = closed.as_secs_f64() * 1000.0;
                if head_tilted_down {
                    self.state.fatigue.add(self.config.score_increment_long_blink);
                    info!(
                        "Long blink with head nod ({:.0}ms), fatigue score {}",
                        duration_ms,
                        self.state.fatigue.value()
                    );
                    events.push(DetectorEvent::MicroSleep { duration_ms });
                } else {
                    debug!("Long blink ignored, no head nod ({:.0}ms)", duration_ms);
                }
            }
            _ => {}
        }
    }

    fn check_stare(&mut self, now: Instant, events: &mut Vec<DetectorEvent>) {
        let since_blink = now.saturating_duration_since(self.state.last_blink);
        if since_blink > self.config.no_blink_threshold()
            && elapsed_since(self.state.last_stare_alert, now, self.config.stare_alert_debounce())
        {
            events.push(DetectorEvent::StareAlert {
                seconds_since_blink: since_blink.as_secs_f64(),
            });
            self.state.last_stare_alert = Some(now);
        }
    }

    fn track_blink_rate(&mut self, now: Instant, events: &mut Vec<DetectorEvent>) {
        let window = self.config.blink_rate_window();
        while let Some(&oldest) = self.state.blink_times.front() {
            if now.saturating_duration_since(oldest) > window {
                self.state.blink_times.pop_front();
            } else {
                break;
            }
        }

        let window_secs = window.as_secs_f64();
        self.state.blink_rate_bpm = if window_secs > 0.0 {
            self.state.blink_times.len() as f64 / window_secs * 60.0
        } else {
            0.0
        };

        if now.saturating_duration_since(self.state.last_break) > window
            && self.state.blink_rate_bpm < self.config.low_blink_rate_bpm
            && self.state.blink_times.len() > 1
            && elapsed_since(
                self.state.last_low_bpm_alert,
                now,
                self.config.low_blink_rate_debounce(),
            )
        {
            events.push(DetectorEvent::LowBlinkRate {
                bpm: self.state.blink_rate_bpm,
            });
            self.state.last_low_bpm_alert = Some(now);
        }
    }

    fn decay_score(&mut self, now: Instant) {
        if now.saturating_duration_since(self.state.last_score_decay)
            > self.config.score_decay_interval()
        {
            self.state.fatigue.decay(self.config.score_decay_rate);
            self.state.last_score_decay = now;
        }
    }

    fn check_fatigue(&mut self, now: Instant, events: &mut Vec<DetectorEvent>) {
        let score = self.state.fatigue.value();
        if score >= self.config.drowsiness_score_threshold
            && elapsed_since(
                self.state.last_fatigue_alert,
                now,
                self.config.drowsiness_alert_debounce(),
            )
        {
            warn!("Fatigue score {} reached alert threshold", score);
            events.push(DetectorEvent::FatigueAlert { score });
            self.state.last_fatigue_alert = Some(now);
        }
    }

    fn analysis(
        &self,
        features: Option<FrameFeatures>,
        on_break: bool,
        events: Vec<DetectorEvent>,
    ) -> FrameAnalysis {
        FrameAnalysis {
            face_detected: features.is_some(),
            on_break,
            features,
            gaze_centered: self.state.gaze_centered,
            head_tilted_down: self.state.head_tilted_down,
            eye_state: self.state.eye_state,
            blink_rate_bpm: self.state.blink_rate_bpm,
            fatigue_score: self.state.fatigue.value(),
            status: self.state.status,
            events,
        }
    }
}

/// True when `last` is unset or older than `debounce`
fn elapsed_since(last: Option<Instant>, now: Instant, debounce: Duration) -> bool {
    last.map_or(true, |t| now.saturating_duration_since(t) > debounce)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::EventType;
    use proptest::prelude::*;

    const FRAME: Duration = Duration::from_millis(100);

    fn profile() -> CalibrationProfile {
        CalibrationProfile {
            ear_threshold: 0.2,
            avg_open_ear: 0.3,
            avg_face_height: 0.5,
            avg_center_gaze: 0.5,
            avg_nose_y: 0.5,
        }
    }

    fn centered(ear: f64) -> FrameFeatures {
        FrameFeatures {
            avg_ear: ear,
            mar: 0.2,
            gaze_ratio: 0.5,
            nose_y: 0.5,
            face_height: 0.5,
        }
    }

    fn nodding(ear: f64) -> FrameFeatures {
        // 0.15 / 0.5 = 0.3 face heights down
        FrameFeatures {
            nose_y: 0.65,
            ..centered(ear)
        }
    }

    struct Harness {
        detector: FatigueDetector,
        now: Instant,
    }

    impl Harness {
        fn new() -> Self {
            let now = Instant::now();
            Self {
                detector: FatigueDetector::new(DetectorConfig::default(), Some(&profile()), now),
                now,
            }
        }

        fn step(&mut self, features: Option<FrameFeatures>) -> FrameAnalysis {
            self.now += FRAME;
            self.detector.process(features.as_ref(), self.now)
        }

        fn step_after(&mut self, gap: Duration, features: Option<FrameFeatures>) -> FrameAnalysis {
            self.now += gap;
            self.detector.process(features.as_ref(), self.now)
        }

        /// Centered open-eye frames until blink detection is armed
        fn stabilize(&mut self) {
            for _ in 0..=DetectorConfig::default().gaze_stability_frames {
                self.step(Some(centered(0.3)));
            }
        }

        /// One full close/reopen cycle; the blink lands on the second frame
        fn blink(&mut self) -> Vec<DetectorEvent> {
            [centered(0.25), centered(0.15), centered(0.3)]
                .iter()
                .flat_map(|f| self.step(Some(*f)).events)
                .collect()
        }

        fn count(&mut self, frames: &[FrameFeatures], event_type: EventType) -> usize {
            frames
                .iter()
                .map(|f| self.step(Some(*f)))
                .flat_map(|a| a.events)
                .filter(|e| e.event_type() == event_type)
                .count()
        }
    }

    #[test]
    fn test_single_blink_cycle() {
        let mut h = Harness::new();
        h.stabilize();

        assert_eq!(h.step(Some(centered(0.25))).eye_state, EyeState::Closing);
        let closed = h.step(Some(centered(0.15)));
        assert_eq!(closed.eye_state, EyeState::Closed);
        assert_eq!(closed.events, vec![DetectorEvent::Blink]);

        // inside the hysteresis band: still closed
        assert_eq!(h.step(Some(centered(0.21))).eye_state, EyeState::Closed);
        let reopened = h.step(Some(centered(0.3)));
        assert_eq!(reopened.eye_state, EyeState::Open);
        assert!(!reopened.contains(EventType::Blink));
    }

    #[test]
    fn test_no_blink_before_gaze_is_stable() {
        let mut h = Harness::new();
        let frames = [centered(0.3), centered(0.25), centered(0.1), centered(0.3)];
        assert_eq!(h.count(&frames, EventType::Blink), 0);
    }

    #[test]
    fn test_look_away_resets_eye_state() {
        let mut h = Harness::new();
        h.stabilize();
        h.step(Some(centered(0.25)));
        h.step(Some(centered(0.15)));
        assert_eq!(h.detector.state().eye_state, EyeState::Closed);

        let away = FrameFeatures {
            gaze_ratio: 0.9,
            ..centered(0.15)
        };
        let analysis = h.step(Some(away));
        assert!(!analysis.gaze_centered);
        assert_eq!(analysis.eye_state, EyeState::Open);
        assert_eq!(h.detector.state().gaze_stable_frames, 0);
    }

    #[test]
    fn test_long_blink_with_head_nod_scores() {
        let mut h = Harness::new();
        h.stabilize();
        h.step(Some(centered(0.25)));
        h.step(Some(centered(0.15)));
        assert_eq!(h.detector.state().eye_state, EyeState::Closed);

        let analysis = h.step_after(Duration::from_millis(800), Some(nodding(0.3)));
        assert!(analysis.head_tilted_down);
        assert_eq!(analysis.eye_state, EyeState::Open);
        assert_eq!(analysis.fatigue_score, 5);
        assert!(matches!(
            analysis.events.as_slice(),
            [DetectorEvent::MicroSleep { duration_ms }] if *duration_ms > 700.0
        ));
    }

    #[test]
    fn test_short_blink_with_head_nod_is_plain_blink() {
        let mut h = Harness::new();
        h.stabilize();
        h.step(Some(centered(0.25)));
        h.step(Some(centered(0.15)));

        let analysis = h.step_after(Duration::from_millis(300), Some(nodding(0.3)));
        assert_eq!(analysis.eye_state, EyeState::Open);
        assert_eq!(analysis.fatigue_score, 0);
        assert!(analysis.events.is_empty());
    }

    #[test]
    fn test_long_blink_without_head_nod_is_ignored() {
        let mut h = Harness::new();
        h.stabilize();
        h.step(Some(centered(0.25)));
        h.step(Some(centered(0.15)));

        let analysis = h.step_after(Duration::from_millis(800), Some(centered(0.3)));
        assert_eq!(analysis.eye_state, EyeState::Open);
        assert_eq!(analysis.fatigue_score, 0);
        assert!(analysis.events.is_empty());
    }

    #[test]
    fn test_head_nod_reads_as_tilted_down() {
        let mut h = Harness::new();
        let analysis = h.step(Some(nodding(0.3)));
        assert!(analysis.head_tilted_down);
        assert!(!analysis.gaze_centered);
    }

    fn yawn_trace(h: &mut Harness, open_for: Duration) -> Vec<FrameAnalysis> {
        let wide = FrameFeatures {
            mar: 0.7,
            ..centered(0.3)
        };
        let mut out = vec![h.step(Some(wide))];
        let mut elapsed = Duration::ZERO;
        while elapsed < open_for {
            elapsed += FRAME;
            out.push(h.step(Some(wide)));
        }
        out.push(h.step(Some(centered(0.3))));
        out
    }

    #[test]
    fn test_short_mouth_opening_is_not_a_yawn() {
        let mut h = Harness::new();
        let trace = yawn_trace(&mut h, Duration::from_millis(1400));
        assert!(trace.iter().all(|a| !a.contains(EventType::YawnDetected)));
        assert_eq!(trace.last().unwrap().fatigue_score, 0);
    }

    #[test]
    fn test_sustained_mouth_opening_is_one_yawn() {
        let mut h = Harness::new();
        let trace = yawn_trace(&mut h, Duration::from_millis(1600));
        let yawns = trace
            .iter()
            .filter(|a| a.contains(EventType::YawnDetected))
            .count();
        assert_eq!(yawns, 1);
        assert_eq!(trace.last().unwrap().fatigue_score, 3);
    }

    #[test]
    fn test_yawn_locked_until_mouth_closes() {
        let mut h = Harness::new();
        let trace = yawn_trace(&mut h, Duration::from_secs(5));
        let yawns = trace
            .iter()
            .filter(|a| a.contains(EventType::YawnDetected))
            .count();
        assert_eq!(yawns, 1);
        assert_eq!(h.detector.state().yawn, YawnTimer::Idle);
    }

    #[test]
    fn test_score_decays_on_interval() {
        let mut h = Harness::new();
        yawn_trace(&mut h, Duration::from_millis(1600));
        let before = h.detector.state().fatigue.value();
        assert_eq!(before, 3);

        let analysis = h.step_after(Duration::from_secs(11), Some(centered(0.3)));
        assert_eq!(analysis.fatigue_score, before - 1);

        // next tick not due yet
        assert_eq!(h.step(Some(centered(0.3))).fatigue_score, before - 1);
    }

    fn fatigue_alerts(trace: &[FrameAnalysis]) -> Vec<DetectorEvent> {
        trace
            .iter()
            .flat_map(|a| a.events.iter().copied())
            .filter(|e| e.event_type() == EventType::FatigueScoreAlert)
            .collect()
    }

    #[test]
    fn test_fatigue_alert_debounced() {
        let mut h = Harness::new();
        let mut trace = Vec::new();
        for _ in 0..3 {
            trace.extend(yawn_trace(&mut h, Duration::from_millis(1600)));
        }
        // 3 yawns = 9 points; the first decay tick has not elapsed
        assert_eq!(h.detector.state().fatigue.value(), 9);
        let alerts = fatigue_alerts(&trace);
        assert_eq!(alerts, vec![DetectorEvent::FatigueAlert { score: 9 }]);
        assert_eq!(alerts[0].value(), Some(9.0));

        // a fourth yawn inside the debounce window raises the score silently
        let trace = yawn_trace(&mut h, Duration::from_millis(1600));
        assert!(fatigue_alerts(&trace).is_empty());
        assert_eq!(h.detector.state().fatigue.value(), 12);

        // past the 10s debounce, one decay tick leaves the score above threshold
        let analysis = h.step_after(Duration::from_secs(9), Some(centered(0.3)));
        assert_eq!(analysis.fatigue_score, 11);
        assert_eq!(
            fatigue_alerts(std::slice::from_ref(&analysis)),
            vec![DetectorEvent::FatigueAlert { score: 11 }]
        );

        let analysis = h.step(Some(centered(0.3)));
        assert!(!analysis.contains(EventType::FatigueScoreAlert));
    }

    fn low_bpm_alerts(events: &[DetectorEvent]) -> Vec<DetectorEvent> {
        events
            .iter()
            .copied()
            .filter(|e| e.event_type() == EventType::LowBpmAlertTriggered)
            .collect()
    }

    #[test]
    fn test_low_blink_rate_alert() {
        let mut h = Harness::new();
        h.stabilize();
        h.step_after(Duration::from_secs(29), Some(centered(0.3)));
        assert!(h.blink().contains(&DetectorEvent::Blink));
        h.step_after(Duration::from_secs(5), Some(centered(0.3)));
        assert!(h.blink().contains(&DetectorEvent::Blink));

        // two blinks in the last minute, more than a minute since the break
        let analysis = h.step_after(Duration::from_secs(26), Some(centered(0.3)));
        assert!((analysis.blink_rate_bpm - 2.0).abs() < 1e-9);
        let alerts = low_bpm_alerts(&analysis.events);
        assert!(matches!(
            alerts.as_slice(),
            [DetectorEvent::LowBlinkRate { bpm }] if (*bpm - 2.0).abs() < 1e-9
        ));

        // both blinks are still in the window, but the 30s debounce holds
        let analysis = h.step_after(Duration::from_secs(10), Some(centered(0.3)));
        assert!((analysis.blink_rate_bpm - 2.0).abs() < 1e-9);
        assert!(low_bpm_alerts(&analysis.events).is_empty());
    }

    #[test]
    fn test_single_blink_is_not_a_low_rate() {
        let mut h = Harness::new();
        h.stabilize();
        h.step_after(Duration::from_secs(29), Some(centered(0.3)));
        h.blink();

        let analysis = h.step_after(Duration::from_secs(32), Some(centered(0.3)));
        assert!((analysis.blink_rate_bpm - 1.0).abs() < 1e-9);
        assert!(low_bpm_alerts(&analysis.events).is_empty());
    }

    #[test]
    fn test_low_blink_rate_waits_a_full_window_after_break() {
        let mut h = Harness::new();
        h.stabilize();
        h.blink();
        h.step_after(Duration::from_secs(5), Some(centered(0.3)));
        h.blink();

        let analysis = h.step_after(Duration::from_secs(40), Some(centered(0.3)));
        assert!((analysis.blink_rate_bpm - 2.0).abs() < 1e-9);
        assert!(low_bpm_alerts(&analysis.events).is_empty());
    }

    #[test]
    fn test_stare_alert_after_no_blink() {
        let mut h = Harness::new();
        h.stabilize();
        let analysis = h.step_after(Duration::from_secs(11), Some(centered(0.3)));
        assert!(matches!(
            analysis.events.as_slice(),
            [DetectorEvent::StareAlert { seconds_since_blink }] if *seconds_since_blink > 10.0
        ));

        // debounced for 30s
        let analysis = h.step_after(Duration::from_secs(5), Some(centered(0.3)));
        assert!(!analysis.contains(EventType::StareAlertTriggered));
    }

    #[test]
    fn test_idle_round_trip() {
        let mut h = Harness::new();
        let start = h.now;
        h.step(Some(centered(0.3)));

        let mut idle_at = None;
        for _ in 0..460 {
            let analysis = h.step(None);
            if let Some(DetectorEvent::UserIdle { active_secs }) = analysis.events.first() {
                idle_at = Some((h.now, *active_secs));
            }
        }
        let (idle_at, active_secs) = idle_at.expect("user should go idle");
        assert_eq!(h.detector.state().status, UserStatus::Idle);

        let analysis = h.step(Some(centered(0.3)));
        let Some(DetectorEvent::UserActive { idle_secs }) = analysis.events.first().copied() else {
            panic!("expected resume event, got {:?}", analysis.events);
        };
        assert_eq!(analysis.status, UserStatus::Active);

        let total = h.now.duration_since(start).as_secs_f64();
        assert!((active_secs - idle_at.duration_since(start).as_secs_f64()).abs() < 1e-6);
        assert!((active_secs + idle_secs - total).abs() < 1e-6);
    }

    #[test]
    fn test_break_suspends_detection() {
        let now = Instant::now();
        let mut detector = FatigueDetector::new(DetectorConfig::default(), Some(&profile()), now);
        detector.set_work_duration(Duration::from_secs(60));

        let t = now + Duration::from_secs(61);
        let analysis = detector.process(Some(&centered(0.3)), t);
        assert_eq!(analysis.events, vec![DetectorEvent::BreakTaken]);
        assert!(detector.state().on_break());

        let during = detector.process(Some(&centered(0.3)), t + Duration::from_secs(10));
        assert!(during.on_break);
        assert!(during.events.is_empty());

        let after = detector.process(Some(&centered(0.3)), t + Duration::from_secs(21));
        assert!(!after.on_break);
        assert_eq!(detector.state().last_break, t + Duration::from_secs(21));
    }

    #[test]
    fn test_uncalibrated_never_centered() {
        let now = Instant::now();
        let mut detector = FatigueDetector::new(DetectorConfig::default(), None, now);
        assert_eq!(detector.ear_threshold(), 0.20);
        let analysis = detector.process(Some(&centered(0.3)), now + FRAME);
        assert!(!analysis.gaze_centered);
        assert!(!analysis.head_tilted_down);
    }

    #[test]
    fn test_legacy_profile_falls_back_to_default_threshold() {
        let legacy = CalibrationProfile {
            ear_threshold: 0.25,
            avg_open_ear: 0.3,
            avg_face_height: 0.0,
            avg_center_gaze: 0.0,
            avg_nose_y: 0.0,
        };
        let detector = FatigueDetector::new(DetectorConfig::default(), Some(&legacy), Instant::now());
        assert_eq!(detector.ear_threshold(), 0.20);
    }

    proptest! {
        #[test]
        fn score_never_negative_and_decays_exactly(
            frames in proptest::collection::vec((0.0f64..0.4, 0.0f64..1.0, 0u64..3000), 1..200)
        ) {
            let mut h = Harness::new();
            let decay = DetectorConfig::default().score_decay_rate;
            for (ear, mar, gap_ms) in frames {
                let before = h.detector.state().fatigue.value();
                let last_decay = h.detector.state().last_score_decay;
                let features = FrameFeatures { mar, ..centered(ear) };
                let analysis = h.step_after(Duration::from_millis(gap_ms), Some(features));
                let after = analysis.fatigue_score;

                if h.detector.state().last_score_decay != last_decay && !analysis.has_events() {
                    prop_assert_eq!(after, before.saturating_sub(decay));
                }
                if before == 0 && !analysis.has_events() {
                    prop_assert_eq!(after, 0);
                }
            }
        }
    }
}

//! Single-flight run control
//!
//! At most one monitoring session or calibration run owns the landmark
//! feed at a time.

use crate::monitor::{run_calibration, run_monitoring, MonitorContext, SessionOutcome};
use crate::source::{ChannelSource, LandmarkSource};
use crate::SessionError;
use detector::CalibrationProfile;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// What the controller is doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerMode {
    Idle,
    Monitoring,
    Calibrating,
}

impl fmt::Display for ControllerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ControllerMode::Idle => "idle",
            ControllerMode::Monitoring => "monitoring",
            ControllerMode::Calibrating => "calibration",
        })
    }
}

enum RunState {
    Idle,
    Monitoring {
        stop: watch::Sender<bool>,
        task: JoinHandle<Result<SessionOutcome, SessionError>>,
    },
    Calibrating,
}

impl RunState {
    fn mode(&self) -> ControllerMode {
        match self {
            RunState::Idle => ControllerMode::Idle,
            // the feed ended on its own; nobody has collected the result yet
            RunState::Monitoring { task, .. } if task.is_finished() => ControllerMode::Idle,
            RunState::Monitoring { .. } => ControllerMode::Monitoring,
            RunState::Calibrating => ControllerMode::Calibrating,
        }
    }
}

struct Inner<S> {
    state: Mutex<RunState>,
    source: Arc<Mutex<S>>,
    ctx: MonitorContext,
}

/// Cloneable handle over the shared run state
pub struct Controller<S: LandmarkSource = ChannelSource> {
    inner: Arc<Inner<S>>,
}

impl<S: LandmarkSource> Clone for Controller<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: LandmarkSource> Controller<S> {
    pub fn new(ctx: MonitorContext, source: S) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(RunState::Idle),
                source: Arc::new(Mutex::new(source)),
                ctx,
            }),
        }
    }

    pub fn context(&self) -> &MonitorContext {
        &self.inner.ctx
    }

    pub async fn mode(&self) -> ControllerMode {
        self.inner.state.lock().await.mode()
    }

    /// Start a monitoring session in the background
    pub async fn start_monitoring(&self) -> Result<(), SessionError> {
        let mut state = self.inner.state.lock().await;
        match state.mode() {
            ControllerMode::Monitoring => return Err(SessionError::AlreadyActive),
            ControllerMode::Calibrating => {
                return Err(SessionError::Conflict(ControllerMode::Calibrating))
            }
            ControllerMode::Idle => reap(&mut state).await,
        }

        let (stop, stop_rx) = watch::channel(false);
        let source = self.inner.source.clone();
        let ctx = self.inner.ctx.clone();
        let task = tokio::spawn(async move {
            let mut source = source.lock().await;
            run_monitoring(&ctx, &mut *source, stop_rx).await
        });

        *state = RunState::Monitoring { stop, task };
        info!("Monitoring started");
        Ok(())
    }

    /// Signal the running session to stop and wait for it to close
    ///
    /// Returns the id of the session that ended.
    pub async fn stop_monitoring(&self) -> Result<i64, SessionError> {
        let mut state = self.inner.state.lock().await;
        match std::mem::replace(&mut *state, RunState::Idle) {
            RunState::Monitoring { stop, task } => {
                if stop.send(true).is_err() {
                    debug!("Monitoring loop had already exited");
                }
                let outcome = task
                    .await
                    .map_err(|e| SessionError::Task(e.to_string()))??;
                info!("Monitoring stopped, session {}", outcome.session_id);
                Ok(outcome.session_id)
            }
            other => {
                *state = other;
                Err(SessionError::NotMonitoring)
            }
        }
    }

    /// Run a calibration over the feed and save the resulting profile
    ///
    /// A non-empty `user_name` is stored in settings first. The run
    /// completes even if the caller stops waiting for it.
    pub async fn calibrate(&self, user_name: Option<String>) -> Result<CalibrationProfile, SessionError> {
        {
            let mut state = self.inner.state.lock().await;
            match state.mode() {
                ControllerMode::Idle => reap(&mut state).await,
                busy => return Err(SessionError::Conflict(busy)),
            }
            *state = RunState::Calibrating;
        }

        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            let result = inner.calibrate(user_name).await;
            *inner.state.lock().await = RunState::Idle;
            result
        });

        match task.await {
            Ok(result) => result,
            Err(e) => {
                *self.inner.state.lock().await = RunState::Idle;
                Err(SessionError::Task(e.to_string()))
            }
        }
    }
}

impl<S: LandmarkSource> Inner<S> {
    async fn calibrate(&self, user_name: Option<String>) -> Result<CalibrationProfile, SessionError> {
        if let Some(name) = user_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            if let Err(e) = self.ctx.repo.set_user_name(name).await {
                warn!("Could not save user name: {}", e);
            }
        }

        let profile = {
            let mut source = self.source.lock().await;
            run_calibration(&self.ctx.config, &mut *source).await?
        };
        self.ctx.profiles.save(&profile).await?;
        Ok(profile)
    }
}

/// Collect the result of a monitoring run that ended without a stop
async fn reap(state: &mut RunState) {
    if let RunState::Monitoring { task, .. } = std::mem::replace(state, RunState::Idle) {
        match task.await {
            Ok(Ok(outcome)) => debug!("Collected finished session {}", outcome.session_id),
            Ok(Err(e)) => error!("Previous monitoring run failed: {}", e),
            Err(e) => error!("Previous monitoring task failed: {}", e),
        }
    }
}

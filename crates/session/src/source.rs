//! Landmark feed

use crate::SessionError;
use feature_engine::FaceLandmarks;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

/// One captured frame: the face mesh, or `None` when no face was found
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LandmarkFrame {
    #[serde(default)]
    pub landmarks: Option<FaceLandmarks>,
}

impl LandmarkFrame {
    pub fn face(landmarks: FaceLandmarks) -> Self {
        Self {
            landmarks: Some(landmarks),
        }
    }

    pub fn no_face() -> Self {
        Self { landmarks: None }
    }
}

/// Ordered stream of frames consumed one at a time
pub trait LandmarkSource: Send + 'static {
    /// Next frame, or `None` once the feed has ended
    fn next_frame(&mut self) -> impl Future<Output = Option<LandmarkFrame>> + Send;

    /// Drop frames queued before a run started
    fn discard_pending(&mut self) {}
}

/// Receiving end of a bounded frame channel
pub struct ChannelSource {
    rx: mpsc::Receiver<LandmarkFrame>,
}

impl LandmarkSource for ChannelSource {
    async fn next_frame(&mut self) -> Option<LandmarkFrame> {
        self.rx.recv().await
    }

    fn discard_pending(&mut self) {
        let mut dropped = 0usize;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("Discarded {} stale frames", dropped);
        }
    }
}

/// Producer handle for a [`ChannelSource`]
#[derive(Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<LandmarkFrame>,
}

impl FrameSender {
    /// Queue a frame without waiting
    pub fn push(&self, frame: LandmarkFrame) -> Result<(), SessionError> {
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => SessionError::FeedFull,
            TrySendError::Closed(_) => SessionError::FeedClosed,
        })
    }
}

pub fn frame_channel(capacity: usize) -> (FrameSender, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (FrameSender { tx }, ChannelSource { rx })
}

//! Detection stage over an upstream frame stream.
//!
//! Consumes a [`Frames`] subscription, runs each frame through a
//! [`Classify`] collaborator on the blocking pool, and re-emits the frame
//! paired with its detections. Per-frame classifier failure is
//! skip-and-continue: the failure surfaces as a [`DetectionEvent::FrameError`]
//! and the stream keeps flowing. Upstream terminal events stay terminal.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task;
use tracing::warn;

use crate::classify::{Classify, DetectOptions};
use crate::error::Error;
use crate::geom::Rect;
use crate::matrix::Matrix;
use crate::stream::core::StateMachine;
use crate::stream::{Frames, StreamEvent, SUBSCRIPTION_DEPTH};

/// Events surfaced by a detection stream.
#[derive(Debug)]
pub enum DetectionEvent {
    /// One classified frame: rectangles plus the frame they came from.
    /// The frame may alias storage the consumer already holds.
    Detections { objects: Vec<Rect>, frame: Matrix },
    /// The classifier failed on one frame; the stream continues.
    FrameError(Error),
    /// Terminal: upstream ended cleanly.
    End,
    /// Terminal: upstream failed.
    Error(Error),
}

/// Consumer subscription to a detection stream.
pub struct Detections {
    rx: mpsc::Receiver<DetectionEvent>,
}

impl Detections {
    /// Next event; `None` once a terminal event has been taken.
    pub async fn next(&mut self) -> Option<DetectionEvent> {
        self.rx.recv().await
    }
}

/// Control handle for a detection stream.
///
/// There is no `pause()`/`resume()` surface: this stage takes at most one
/// frame from upstream at a time, so pausing the upstream `VideoStream`
/// pauses the whole pipeline — backpressure propagates the suspension
/// through the capacity-1 subscriptions without a second control path.
pub struct ObjectDetectionStream {
    ctrl: mpsc::UnboundedSender<()>,
}

impl ObjectDetectionStream {
    /// Spawn the stage over `upstream`. Backpressure composes: this stage
    /// holds at most one frame from upstream while the consumer lags.
    pub fn new(
        upstream: Frames,
        classifier: Arc<dyn Classify>,
        options: DetectOptions,
    ) -> (ObjectDetectionStream, Detections) {
        let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(SUBSCRIPTION_DEPTH);
        task::spawn(drive(upstream, classifier, options, ctrl_rx, event_tx));
        (
            ObjectDetectionStream { ctrl: ctrl_tx },
            Detections { rx: event_rx },
        )
    }

    /// Tear the stage down without a terminal event. The upstream
    /// subscription is dropped, which tears the upstream driver down too.
    pub fn release(&self) {
        let _ = self.ctrl.send(());
    }
}

impl Drop for ObjectDetectionStream {
    fn drop(&mut self) {
        let _ = self.ctrl.send(());
    }
}

async fn drive(
    mut upstream: Frames,
    classifier: Arc<dyn Classify>,
    options: DetectOptions,
    mut ctrl: mpsc::UnboundedReceiver<()>,
    events: mpsc::Sender<DetectionEvent>,
) {
    let mut sm = StateMachine::new();
    sm.resume();
    loop {
        let upstream_event = tokio::select! {
            biased;
            _ = ctrl.recv() => {
                sm.release();
                return;
            }
            ev = upstream.next() => ev,
        };
        let event = match upstream_event {
            Some(StreamEvent::Frame(frame)) => {
                sm.begin_request();
                let worker = classifier.clone();
                let scan = frame.alias();
                let result =
                    task::spawn_blocking(move || worker.detect(&scan, &options)).await;
                sm.complete_request();
                match result {
                    Ok(Ok(objects)) => DetectionEvent::Detections { objects, frame },
                    Ok(Err(e)) => {
                        warn!(error = %e, "classifier failed on one frame, continuing");
                        DetectionEvent::FrameError(e)
                    }
                    Err(e) => DetectionEvent::FrameError(Error::DeviceOrIo(format!(
                        "classifier task failed: {e}"
                    ))),
                }
            }
            Some(StreamEvent::End) | None => {
                if sm.finish(false) {
                    let _ = events.send(DetectionEvent::End).await;
                }
                return;
            }
            Some(StreamEvent::Error(e)) => {
                if sm.finish(true) {
                    let _ = events.send(DetectionEvent::Error(e)).await;
                }
                return;
            }
        };
        tokio::select! {
            biased;
            _ = ctrl.recv() => {
                sm.release();
                return;
            }
            sent = events.send(event) => {
                if sent.is_err() {
                    // Consumer gone; dropping upstream tears it down too.
                    sm.release();
                    return;
                }
            }
        }
    }
}

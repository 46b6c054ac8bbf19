//! Asynchronous frame pipelines.
//!
//! Each stream is driven by one tokio task that talks to a blocking
//! collaborator (capture device, codec, classifier) through
//! `spawn_blocking`, one request at a time. Consumers attach through a
//! subscription handle backed by a bounded channel of capacity one: the
//! driver cannot produce a second frame until the consumer has taken the
//! first. That single-flight + single-slot arrangement is the
//! backpressure contract.
//!
//! A stream emits at most one terminal event ([`StreamEvent::End`] or
//! [`StreamEvent::Error`]) in its lifetime; `release()` tears the driver
//! down without emitting anything further. Dropping a subscription handle
//! has the same teardown effect as `release()`.
//!
//! Frames delivered by a stream may alias storage with views the consumer
//! has derived from them; in-place mutation through one handle is visible
//! through all of them. Consumers needing isolation clone the frame.

mod core;
mod decode;
mod detect;
mod video;

pub use self::core::Lifecycle;
pub use self::decode::ImageDecodeStream;
pub use self::detect::{DetectionEvent, Detections, ObjectDetectionStream};
pub use self::video::VideoStream;

use tokio::sync::mpsc;

use crate::error::Error;
use crate::matrix::Matrix;

/// Capacity of every subscription channel. One slot: the driver stalls
/// until the consumer takes the previous event.
pub(crate) const SUBSCRIPTION_DEPTH: usize = 1;

/// Events surfaced by frame-producing streams.
#[derive(Debug)]
pub enum StreamEvent {
    /// One decoded/captured frame, in production order.
    Frame(Matrix),
    /// Terminal: the source is cleanly exhausted.
    End,
    /// Terminal: the source failed.
    Error(Error),
}

/// Consumer subscription to a frame stream.
pub struct Frames {
    rx: mpsc::Receiver<StreamEvent>,
}

impl Frames {
    pub(crate) fn new(rx: mpsc::Receiver<StreamEvent>) -> Frames {
        Frames { rx }
    }

    /// Next event; `None` once a terminal event has been taken (or the
    /// stream was released).
    pub async fn next(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }
}

pub(crate) fn subscription() -> (mpsc::Sender<StreamEvent>, Frames) {
    let (tx, rx) = mpsc::channel(SUBSCRIPTION_DEPTH);
    (tx, Frames::new(rx))
}

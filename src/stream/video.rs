//! Capture-backed frame stream.
//!
//! One driver task per stream. Each production request is exactly one
//! blocking `read_frame` on the source, run on the blocking pool; the
//! source travels into the closure and back with the result so the driver
//! can keep issuing strictly sequential reads. Delivery order is capture
//! order. A result arriving while paused is held and delivered exactly
//! once after `resume()`. `release()` (or dropping either handle) closes
//! the source exactly once and suppresses all further events.

use tokio::sync::{mpsc, watch};
use tokio::task::{self, JoinHandle};
use tracing::{debug, warn};

use crate::capture::CaptureSource;
use crate::error::Error;
use crate::matrix::Matrix;
use crate::stream::core::{Lifecycle, StateMachine};
use crate::stream::{subscription, Frames, StreamEvent};

enum Ctrl {
    Pause,
    Resume,
    Release,
}

/// Control handle for a capture-backed stream. Frames arrive on the
/// [`Frames`] subscription returned alongside it.
pub struct VideoStream {
    ctrl: mpsc::UnboundedSender<Ctrl>,
    state: watch::Receiver<Lifecycle>,
}

impl VideoStream {
    /// Spawn the driver over `source`. The stream starts flowing
    /// immediately: the subscription is the consumer attachment.
    pub fn new(source: impl CaptureSource + 'static) -> (VideoStream, Frames) {
        let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(Lifecycle::Idle);
        let (event_tx, frames) = subscription();
        task::spawn(drive(Box::new(source), ctrl_rx, event_tx, state_tx));
        (
            VideoStream {
                ctrl: ctrl_tx,
                state: state_rx,
            },
            frames,
        )
    }

    /// Current lifecycle state, as last published by the driver.
    pub fn state(&self) -> Lifecycle {
        *self.state.borrow()
    }

    /// Suspend delivery. An in-flight read keeps running; its frame is
    /// held for the next `resume()`.
    pub fn pause(&self) {
        let _ = self.ctrl.send(Ctrl::Pause);
    }

    /// Resume delivery.
    pub fn resume(&self) {
        let _ = self.ctrl.send(Ctrl::Resume);
    }

    /// Tear the stream down: close the source exactly once and emit no
    /// further events. Safe to call at any time, including mid-read.
    pub fn release(&self) {
        let _ = self.ctrl.send(Ctrl::Release);
    }
}

impl Drop for VideoStream {
    fn drop(&mut self) {
        let _ = self.ctrl.send(Ctrl::Release);
    }
}

type ReadResult = (Box<dyn CaptureSource>, Result<Option<Matrix>, Error>);

async fn drive(
    source: Box<dyn CaptureSource>,
    mut ctrl: mpsc::UnboundedReceiver<Ctrl>,
    events: mpsc::Sender<StreamEvent>,
    state: watch::Sender<Lifecycle>,
) {
    let mut sm = StateMachine::new();
    sm.resume();
    let _ = state.send(sm.state());
    let mut source_slot: Option<Box<dyn CaptureSource>> = Some(source);
    let mut in_flight: Option<JoinHandle<ReadResult>> = None;
    let mut held: Option<Result<Option<Matrix>, Error>> = None;

    loop {
        // Issue at most one production request, only with nothing held.
        if sm.can_request() && held.is_none() {
            if let Some(mut src) = source_slot.take() {
                sm.begin_request();
                in_flight = Some(task::spawn_blocking(move || {
                    let result = src.read_frame();
                    (src, result)
                }));
            }
        }

        // Deliver the held result while flowing.
        if sm.state() == Lifecycle::Flowing {
            match held.take() {
                Some(Ok(Some(frame))) => {
                    if !deliver(&events, &mut ctrl, &mut sm, &state, frame).await {
                        break;
                    }
                    continue;
                }
                Some(Ok(None)) => {
                    if sm.finish(false) {
                        let _ = events.send(StreamEvent::End).await;
                    }
                    break;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "capture source failed");
                    if sm.finish(true) {
                        let _ = events.send(StreamEvent::Error(e)).await;
                    }
                    break;
                }
                None => {}
            }
        }

        tokio::select! {
            biased;
            cmd = ctrl.recv() => {
                let keep_going = apply(cmd, &mut sm);
                let _ = state.send(sm.state());
                if !keep_going {
                    break;
                }
            }
            joined = async { in_flight.as_mut().expect("polled without a read").await },
                if in_flight.is_some() =>
            {
                in_flight = None;
                sm.complete_request();
                match joined {
                    Ok((src, result)) => {
                        source_slot = Some(src);
                        held = Some(result);
                    }
                    Err(e) => held = Some(Err(Error::DeviceOrIo(format!(
                        "capture task failed: {e}"
                    )))),
                }
            }
        }
    }

    teardown(&mut sm, in_flight, source_slot).await;
    let _ = state.send(sm.state());
}

/// Apply one control message; false means the stream was released (or all
/// control handles vanished).
fn apply(cmd: Option<Ctrl>, sm: &mut StateMachine) -> bool {
    match cmd {
        Some(Ctrl::Pause) => {
            sm.pause();
            true
        }
        Some(Ctrl::Resume) => {
            sm.resume();
            true
        }
        Some(Ctrl::Release) | None => false,
    }
}

/// Push one frame under backpressure, staying responsive to control
/// messages. Returns false on release or consumer loss.
async fn deliver(
    events: &mpsc::Sender<StreamEvent>,
    ctrl: &mut mpsc::UnboundedReceiver<Ctrl>,
    sm: &mut StateMachine,
    state: &watch::Sender<Lifecycle>,
    frame: Matrix,
) -> bool {
    loop {
        tokio::select! {
            biased;
            cmd = ctrl.recv() => {
                let keep_going = apply(cmd, sm);
                let _ = state.send(sm.state());
                if !keep_going {
                    return false;
                }
            }
            permit = events.reserve(), if sm.state() == Lifecycle::Flowing => {
                match permit {
                    Ok(permit) => {
                        permit.send(StreamEvent::Frame(frame));
                        return true;
                    }
                    // Consumer dropped its subscription.
                    Err(_) => return false,
                }
            }
        }
    }
}

/// Settle any outstanding read and close the source exactly once.
async fn teardown(
    sm: &mut StateMachine,
    in_flight: Option<JoinHandle<ReadResult>>,
    mut source_slot: Option<Box<dyn CaptureSource>>,
) {
    if let Some(handle) = in_flight {
        if let Ok((src, _)) = handle.await {
            source_slot = Some(src);
        }
    }
    if sm.release() {
        if let Some(mut src) = source_slot {
            src.close();
            debug!("capture source closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::MatType;
    use crate::geom::Scalar;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    /// Route driver lifecycle logs through the test harness, filtered by
    /// `RUST_LOG`. Safe to call from every test; only the first init wins.
    fn trace_init() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    /// Emits `frames` numbered matrices, then a clean end.
    struct Counting {
        remaining: u32,
        next_value: f64,
        reads: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    }

    impl Counting {
        fn new(frames: u32) -> (Self, Arc<AtomicUsize>, Arc<AtomicUsize>) {
            let reads = Arc::new(AtomicUsize::new(0));
            let closes = Arc::new(AtomicUsize::new(0));
            (
                Counting {
                    remaining: frames,
                    next_value: 1.0,
                    reads: reads.clone(),
                    closes: closes.clone(),
                },
                reads,
                closes,
            )
        }
    }

    impl CaptureSource for Counting {
        fn read_frame(&mut self) -> Result<Option<Matrix>, Error> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            let value = self.next_value;
            self.next_value += 1.0;
            Ok(Some(Matrix::new_with_scalar(
                2,
                2,
                MatType::U8C1,
                Scalar::all(value),
            )?))
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Blocks every read until the test permits it.
    struct Gated {
        gate: std::sync::mpsc::Receiver<Result<Option<Matrix>, Error>>,
    }

    impl CaptureSource for Gated {
        fn read_frame(&mut self) -> Result<Option<Matrix>, Error> {
            self.gate.recv().unwrap_or(Ok(None))
        }

        fn close(&mut self) {}
    }

    struct Broken;

    impl CaptureSource for Broken {
        fn read_frame(&mut self) -> Result<Option<Matrix>, Error> {
            Err(Error::DeviceOrIo("sensor unplugged".into()))
        }

        fn close(&mut self) {}
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delivers_frames_in_capture_order_then_ends() {
        trace_init();
        let (source, _, closes) = Counting::new(3);
        let (_stream, mut frames) = VideoStream::new(source);
        for expected in [1.0, 2.0, 3.0] {
            match frames.next().await {
                Some(StreamEvent::Frame(m)) => assert_eq!(m.get(0, 0).unwrap(), expected),
                other => panic!("expected frame, got {other:?}"),
            }
        }
        assert!(matches!(frames.next().await, Some(StreamEvent::End)));
        assert!(frames.next().await.is_none());
        // Source closed exactly once at teardown.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn source_error_is_a_single_terminal_event() {
        let (_stream, mut frames) = VideoStream::new(Broken);
        match frames.next().await {
            Some(StreamEvent::Error(Error::DeviceOrIo(msg))) => {
                assert!(msg.contains("unplugged"));
            }
            other => panic!("expected terminal error, got {other:?}"),
        }
        assert!(frames.next().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn backpressure_limits_read_ahead() {
        let (source, reads, _) = Counting::new(100);
        let (_stream, mut frames) = VideoStream::new(source);
        // Do not consume anything: one frame can sit in the channel and one
        // read may be in flight, no more.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(reads.load(Ordering::SeqCst) <= 2);
        // Consuming one frame allows exactly one more production request.
        let before = reads.load(Ordering::SeqCst);
        assert!(matches!(frames.next().await, Some(StreamEvent::Frame(_))));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(reads.load(Ordering::SeqCst) <= before + 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pause_holds_in_flight_result_until_resume() {
        trace_init();
        let (gate_tx, gate_rx) = std::sync::mpsc::channel();
        let (stream, mut frames) = VideoStream::new(Gated { gate: gate_rx });
        // Let the driver issue its read, then pause with the read pending.
        tokio::time::sleep(Duration::from_millis(20)).await;
        stream.pause();
        tokio::time::sleep(Duration::from_millis(10)).await;
        // The read completes while paused.
        let frame = Matrix::new_with_scalar(2, 2, MatType::U8C1, Scalar::all(42.0)).unwrap();
        gate_tx.send(Ok(Some(frame))).unwrap();
        // Nothing is delivered mid-pause.
        assert!(timeout(Duration::from_millis(60), frames.next()).await.is_err());
        // After resume the held frame arrives exactly once.
        stream.resume();
        match timeout(Duration::from_millis(200), frames.next()).await {
            Ok(Some(StreamEvent::Frame(m))) => assert_eq!(m.get(0, 0).unwrap(), 42.0),
            other => panic!("expected held frame after resume, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn release_mid_read_closes_source_once_and_silences_stream() {
        trace_init();
        let (gate_tx, gate_rx) = std::sync::mpsc::channel();
        let (stream, mut frames) = VideoStream::new(Gated { gate: gate_rx });
        tokio::time::sleep(Duration::from_millis(20)).await;
        stream.release();
        stream.release(); // idempotent
        // The outstanding read settles after release; its frame must not
        // surface.
        let frame = Matrix::zeros(2, 2, MatType::U8C1);
        gate_tx.send(Ok(Some(frame))).unwrap();
        match timeout(Duration::from_millis(200), frames.next()).await {
            Ok(None) => {}
            Ok(Some(ev)) => panic!("event after release: {ev:?}"),
            Err(_) => {} // channel still open but silent also satisfies the contract
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn state_observer_tracks_pause_and_end() {
        let (gate_tx, gate_rx) = std::sync::mpsc::channel();
        let (stream, mut frames) = VideoStream::new(Gated { gate: gate_rx });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(stream.state(), Lifecycle::Flowing);
        stream.pause();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(stream.state(), Lifecycle::Paused);
        stream.resume();
        gate_tx.send(Ok(None)).unwrap();
        assert!(matches!(frames.next().await, Some(StreamEvent::End)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(stream.state(), Lifecycle::Ended);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dropping_subscription_tears_the_driver_down() {
        let (source, _, closes) = Counting::new(1000);
        let (_stream, frames) = VideoStream::new(source);
        drop(frames);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}

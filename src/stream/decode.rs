//! Incremental decode stream.
//!
//! Bytes are appended in arbitrary chunk sizes; the driver accumulates
//! them, probes for complete images, and emits one decoded frame per
//! complete image in input order. `end()` with leftover bytes that never
//! formed a complete image is a terminal [`Error::TruncatedInput`], never
//! a silent end.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task;
use tracing::{debug, warn};

use crate::codec::{ImageCodec, Probe};
use crate::error::Error;
use crate::matrix::Matrix;
use crate::stream::core::StateMachine;
use crate::stream::{subscription, Frames, StreamEvent};

enum Input {
    Chunk(Vec<u8>),
    End,
}

/// Writer half of a decode stream. Frames arrive on the [`Frames`]
/// subscription returned alongside it.
///
/// There is no `pause()`/`resume()` surface: production is push-driven by
/// the writer, so the consumer throttles it by not taking events (the
/// capacity-1 subscription stalls the driver) and the writer stops it by
/// not writing. Pausing would add a third party to that two-sided
/// contract without changing what either side can already do.
pub struct ImageDecodeStream {
    tx: mpsc::UnboundedSender<Input>,
}

impl ImageDecodeStream {
    pub fn new(codec: Arc<dyn ImageCodec>) -> (ImageDecodeStream, Frames) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (event_tx, frames) = subscription();
        task::spawn(drive(codec, rx, event_tx));
        (ImageDecodeStream { tx }, frames)
    }

    /// Append a chunk of encoded bytes.
    pub fn write(&self, chunk: &[u8]) -> Result<(), Error> {
        self.tx
            .send(Input::Chunk(chunk.to_vec()))
            .map_err(|_| Error::SourceExhausted)
    }

    /// Signal end of input. Any buffered residue becomes a terminal
    /// truncation error.
    pub fn end(&self) -> Result<(), Error> {
        self.tx.send(Input::End).map_err(|_| Error::SourceExhausted)
    }
}

async fn drive(
    codec: Arc<dyn ImageCodec>,
    mut input: mpsc::UnboundedReceiver<Input>,
    events: mpsc::Sender<StreamEvent>,
) {
    let mut sm = StateMachine::new();
    sm.resume();
    let mut buf: Vec<u8> = Vec::new();

    while let Some(msg) = input.recv().await {
        match msg {
            Input::Chunk(chunk) => {
                buf.extend_from_slice(&chunk);
                loop {
                    let image_len = match codec.probe(&buf) {
                        Ok(Probe::NeedMore) => break,
                        Ok(Probe::Complete(n)) => n,
                        Err(e) => {
                            warn!(codec = codec.name(), error = %e, "probe failed");
                            if sm.finish(true) {
                                let _ = events.send(StreamEvent::Error(e)).await;
                            }
                            return;
                        }
                    };
                    // The decode is a blocking collaborator call.
                    let bytes: Vec<u8> = buf.drain(..image_len).collect();
                    let decoder = codec.clone();
                    sm.begin_request();
                    let decoded =
                        task::spawn_blocking(move || decoder.decode(&bytes)).await;
                    sm.complete_request();
                    let frame = match decoded {
                        Ok(Ok(image)) => image.into_matrix(),
                        Ok(Err(e)) => Err(e),
                        Err(e) => Err(Error::DeviceOrIo(format!("decode task failed: {e}"))),
                    };
                    match frame {
                        Ok(frame) => {
                            if events.send(StreamEvent::Frame(frame)).await.is_err() {
                                // Consumer gone.
                                sm.release();
                                return;
                            }
                        }
                        Err(e) => {
                            warn!(codec = codec.name(), error = %e, "decode failed");
                            if sm.finish(true) {
                                let _ = events.send(StreamEvent::Error(e)).await;
                            }
                            return;
                        }
                    }
                }
            }
            Input::End => {
                if buf.is_empty() {
                    if sm.finish(false) {
                        let _ = events.send(StreamEvent::End).await;
                    }
                } else {
                    debug!(buffered = buf.len(), "input ended mid-image");
                    if sm.finish(true) {
                        let _ = events
                            .send(StreamEvent::Error(Error::TruncatedInput {
                                buffered: buf.len(),
                            }))
                            .await;
                    }
                }
                return;
            }
        }
    }
    // Writer dropped without an explicit end(): same contract as end().
    if sm.finish(!buf.is_empty()) {
        let ev = if buf.is_empty() {
            StreamEvent::End
        } else {
            StreamEvent::Error(Error::TruncatedInput {
                buffered: buf.len(),
            })
        };
        let _ = events.send(ev).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::MatType;
    use crate::codec::{EncodeOptions, ImageFormat, RawFrameCodec};
    use crate::geom::Scalar;

    fn encoded(fill: f64) -> Vec<u8> {
        Matrix::new_with_scalar(2, 2, MatType::U8C1, Scalar::all(fill))
            .unwrap()
            .encode_to(&RawFrameCodec, &EncodeOptions::new(ImageFormat::RawFrame))
            .unwrap()
    }

    fn stream() -> (ImageDecodeStream, Frames) {
        ImageDecodeStream::new(Arc::new(RawFrameCodec))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn one_frame_per_complete_image_across_chunk_boundaries() {
        let mut bytes = encoded(10.0);
        bytes.extend(encoded(20.0));
        let (writer, mut frames) = stream();
        // Dribble the input in 5-byte chunks.
        for chunk in bytes.chunks(5) {
            writer.write(chunk).unwrap();
        }
        writer.end().unwrap();
        for expected in [10.0, 20.0] {
            match frames.next().await {
                Some(StreamEvent::Frame(m)) => assert_eq!(m.get(0, 0).unwrap(), expected),
                other => panic!("expected frame, got {other:?}"),
            }
        }
        assert!(matches!(frames.next().await, Some(StreamEvent::End)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn one_write_with_many_images_emits_each() {
        let mut bytes = encoded(1.0);
        bytes.extend(encoded(2.0));
        bytes.extend(encoded(3.0));
        let (writer, mut frames) = stream();
        writer.write(&bytes).unwrap();
        writer.end().unwrap();
        let mut seen = Vec::new();
        while let Some(ev) = frames.next().await {
            match ev {
                StreamEvent::Frame(m) => seen.push(m.get(0, 0).unwrap()),
                StreamEvent::End => break,
                StreamEvent::Error(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(seen, vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn end_with_residue_is_truncated_input() {
        let bytes = encoded(10.0);
        let (writer, mut frames) = stream();
        writer.write(&bytes[..bytes.len() - 3]).unwrap();
        writer.end().unwrap();
        match frames.next().await {
            Some(StreamEvent::Error(Error::TruncatedInput { buffered })) => {
                assert_eq!(buffered, bytes.len() - 3);
            }
            other => panic!("expected truncation error, got {other:?}"),
        }
        assert!(frames.next().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn garbage_input_is_a_terminal_error() {
        let (writer, mut frames) = stream();
        writer.write(b"definitely not a frame").unwrap();
        match frames.next().await {
            Some(StreamEvent::Error(_)) => {}
            other => panic!("expected terminal error, got {other:?}"),
        }
        assert!(frames.next().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn write_after_terminal_is_rejected() {
        let (writer, mut frames) = stream();
        writer.end().unwrap();
        assert!(matches!(frames.next().await, Some(StreamEvent::End)));
        // The driver is gone; late writes fail loudly.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(matches!(
            writer.write(b"late"),
            Err(Error::SourceExhausted)
        ));
    }
}

//! Minimal display surface.
//!
//! Windowing is out of scope beyond one synchronous primitive: push a
//! frame at a named surface, then optionally block for a key. The actual
//! surface (X11 window, web canvas, test recorder) lives behind
//! [`DisplaySink`].

use crate::error::Error;
use crate::matrix::Matrix;

/// External display collaborator.
pub trait DisplaySink {
    /// Present `frame` on the surface registered under `name`.
    fn show(&mut self, name: &str, frame: &Matrix) -> Result<(), Error>;

    /// Block up to `timeout_ms` (0 = indefinitely) for a key press.
    /// `Ok(None)` on timeout.
    fn wait_key(&mut self, timeout_ms: u64) -> Result<Option<u32>, Error>;
}

/// A named handle over a display sink.
pub struct NamedWindow<S> {
    name: String,
    sink: S,
}

impl<S: DisplaySink> NamedWindow<S> {
    pub fn new(name: impl Into<String>, sink: S) -> Self {
        Self {
            name: name.into(),
            sink,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Present one frame.
    pub fn show(&mut self, frame: &Matrix) -> Result<(), Error> {
        self.sink.show(&self.name, frame)
    }

    /// Wait for a key press after the last shown frame.
    pub fn wait_key(&mut self, timeout_ms: u64) -> Result<Option<u32>, Error> {
        self.sink.wait_key(timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::MatType;
    use crate::geom::Size;

    #[derive(Default)]
    struct Recorder {
        shown: Vec<(String, Size)>,
        key: Option<u32>,
    }

    impl DisplaySink for Recorder {
        fn show(&mut self, name: &str, frame: &Matrix) -> Result<(), Error> {
            self.shown.push((name.to_string(), frame.size()));
            Ok(())
        }

        fn wait_key(&mut self, _timeout_ms: u64) -> Result<Option<u32>, Error> {
            Ok(self.key.take())
        }
    }

    #[test]
    fn show_routes_to_sink_under_window_name() {
        let mut w = NamedWindow::new("preview", Recorder::default());
        let frame = Matrix::zeros(4, 6, MatType::U8C1);
        w.show(&frame).unwrap();
        w.show(&frame).unwrap();
        assert_eq!(w.sink.shown.len(), 2);
        assert_eq!(w.sink.shown[0], ("preview".to_string(), Size::new(6, 4)));
    }

    #[test]
    fn wait_key_reports_timeout_as_none() {
        let mut w = NamedWindow::new(
            "preview",
            Recorder {
                key: Some(27),
                ..Recorder::default()
            },
        );
        assert_eq!(w.wait_key(10).unwrap(), Some(27));
        assert_eq!(w.wait_key(10).unwrap(), None);
    }
}

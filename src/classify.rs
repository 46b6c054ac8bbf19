//! Object classifier boundary.
//!
//! Cascade classifiers and friends are external collaborators: this crate
//! hands them a frame plus scan options and takes back plain rectangles.

use crate::error::Error;
use crate::geom::{Rect, Size};
use crate::matrix::Matrix;

/// Multi-scale scan options handed to a classifier.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectOptions {
    /// Scale step between pyramid levels.
    pub scale_factor: f64,
    /// Minimum neighboring hits required to keep a candidate.
    pub min_neighbors: u32,
    /// Candidates smaller than this are discarded.
    pub min_size: Size,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 3,
            min_size: Size::new(0, 0),
        }
    }
}

/// External detector collaborator. One call scans one frame.
pub trait Classify: Send + Sync {
    fn detect(&self, frame: &Matrix, options: &DetectOptions) -> Result<Vec<Rect>, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::MatType;

    struct FixedHits(Vec<Rect>);

    impl Classify for FixedHits {
        fn detect(&self, _frame: &Matrix, options: &DetectOptions) -> Result<Vec<Rect>, Error> {
            Ok(self
                .0
                .iter()
                .copied()
                .filter(|r| {
                    r.width >= options.min_size.width && r.height >= options.min_size.height
                })
                .collect())
        }
    }

    #[test]
    fn default_options_are_permissive() {
        let o = DetectOptions::default();
        assert_eq!(o.min_size, Size::new(0, 0));
        assert!(o.scale_factor > 1.0);
    }

    #[test]
    fn min_size_filters_candidates() {
        let c = FixedHits(vec![Rect::new(0, 0, 4, 4), Rect::new(2, 2, 16, 16)]);
        let frame = Matrix::zeros(32, 32, MatType::U8C1);
        let opts = DetectOptions {
            min_size: Size::new(8, 8),
            ..DetectOptions::default()
        };
        let hits = c.detect(&frame, &opts).unwrap();
        assert_eq!(hits, vec![Rect::new(2, 2, 16, 16)]);
    }
}

//! Batch inference: one model call per block, then the inverse-link transform.
use ndarray::ArrayView2;

use crate::error::{Error, Result};

/// A trained regression model that scores a whole feature matrix at once.
///
/// Implementations must return predictions in input row order and must not
/// keep per-call state, since the same model instance serves every block.
pub trait Regressor {
    /// Number of input columns the model was trained on.
    fn num_features(&self) -> usize;

    /// Write one raw output per row of `features` into `out`.
    fn predict_raw(&self, features: ArrayView2<'_, f32>, out: &mut [f32]) -> Result<()>;
}

impl<R: Regressor + ?Sized> Regressor for &R {
    fn num_features(&self) -> usize {
        (**self).num_features()
    }

    fn predict_raw(&self, features: ArrayView2<'_, f32>, out: &mut [f32]) -> Result<()> {
        (**self).predict_raw(features, out)
    }
}

impl<R: Regressor + ?Sized> Regressor for Box<R> {
    fn num_features(&self) -> usize {
        (**self).num_features()
    }

    fn predict_raw(&self, features: ArrayView2<'_, f32>, out: &mut [f32]) -> Result<()> {
        (**self).predict_raw(features, out)
    }
}

/// Undo the log transform the model's target was trained on.
///
/// Extreme raw scores are not clamped: large outputs overflow to infinity.
#[inline]
pub fn inverse_link(raw: f32) -> f32 {
    raw.exp()
}

/// Owns the loaded model for the whole run and turns feature matrices into
/// final pixel values.
pub struct InferenceAdapter<M> {
    model: M,
}

impl<M: Regressor> InferenceAdapter<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    /// Predict every row of `features` into `out` as one batch.
    ///
    /// Any mismatch or model failure is an [`Error::Inference`], which the
    /// caller must treat as fatal.
    pub fn predict_into(&self, features: ArrayView2<'_, f32>, out: &mut [f32]) -> Result<()> {
        let (rows, cols) = features.dim();
        if cols != self.model.num_features() {
            return Err(Error::Inference(format!(
                "feature matrix has {} columns, model expects {}",
                cols,
                self.model.num_features()
            )));
        }
        if out.len() != rows {
            return Err(Error::Inference(format!(
                "prediction buffer holds {} values for {} rows",
                out.len(),
                rows
            )));
        }
        self.model.predict_raw(features, out).map_err(|e| match e {
            Error::Inference(msg) => Error::Inference(msg),
            other => Error::inference(other),
        })?;
        for value in out.iter_mut() {
            *value = inverse_link(*value);
        }
        Ok(())
    }

    /// Allocating variant of [`InferenceAdapter::predict_into`].
    pub fn predict(&self, features: ArrayView2<'_, f32>) -> Result<Vec<f32>> {
        let mut out = vec![0.0f32; features.nrows()];
        self.predict_into(features, &mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{Array2, array};
    use std::cell::Cell;

    /// Returns a fixed linear combination of the first column.
    pub(crate) struct LinearStub {
        pub width: usize,
        pub slope: f32,
        pub calls: Cell<usize>,
    }

    impl LinearStub {
        pub(crate) fn new(width: usize, slope: f32) -> Self {
            Self {
                width,
                slope,
                calls: Cell::new(0),
            }
        }
    }

    impl Regressor for LinearStub {
        fn num_features(&self) -> usize {
            self.width
        }

        fn predict_raw(&self, features: ArrayView2<'_, f32>, out: &mut [f32]) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            for (row, o) in features.rows().into_iter().zip(out.iter_mut()) {
                *o = row[0] * self.slope;
            }
            Ok(())
        }
    }

    struct Broken;

    impl Regressor for Broken {
        fn num_features(&self) -> usize {
            2
        }

        fn predict_raw(&self, _: ArrayView2<'_, f32>, _: &mut [f32]) -> Result<()> {
            Err(Error::Config("booster state corrupted".into()))
        }
    }

    #[test]
    fn exp_transform_of_known_outputs() {
        assert_eq!(inverse_link(0.0), 1.0);
        assert_relative_eq!(inverse_link(std::f32::consts::LN_2), 2.0, epsilon = 1e-6);
    }

    #[test]
    fn large_scores_are_not_clamped() {
        assert!(inverse_link(200.0).is_infinite());
        assert_eq!(inverse_link(-200.0), 0.0);
    }

    #[test]
    fn whole_block_is_one_batch() {
        let adapter = InferenceAdapter::new(LinearStub::new(2, 1.0));
        let features = array![[0.0f32, 9.0], [std::f32::consts::LN_2, 9.0], [1.0, 9.0]];
        let out = adapter.predict(features.view()).unwrap();
        assert_eq!(adapter.model().calls.get(), 1);
        assert_eq!(out[0], 1.0);
        assert_relative_eq!(out[1], 2.0, epsilon = 1e-6);
        assert_relative_eq!(out[2], std::f32::consts::E, epsilon = 1e-6);
    }

    #[test]
    fn width_mismatch_is_inference_error() {
        let adapter = InferenceAdapter::new(LinearStub::new(18, 1.0));
        let features = Array2::<f32>::zeros((4, 3));
        let err = adapter.predict(features.view()).unwrap_err();
        assert!(matches!(err, Error::Inference(_)), "{err}");
        assert!(err.is_fatal());
    }

    #[test]
    fn model_failure_surfaces_as_inference_error() {
        let adapter = InferenceAdapter::new(Broken);
        let features = Array2::<f32>::zeros((1, 2));
        let err = adapter.predict(features.view()).unwrap_err();
        assert!(matches!(err, Error::Inference(ref m) if m.contains("corrupted")), "{err}");
    }

    #[test]
    fn short_output_buffer_is_rejected() {
        let adapter = InferenceAdapter::new(LinearStub::new(2, 1.0));
        let features = Array2::<f32>::zeros((4, 2));
        let mut out = vec![0.0f32; 3];
        assert!(adapter.predict_into(features.view(), &mut out).is_err());
        assert_eq!(adapter.model().calls.get(), 0);
    }
}

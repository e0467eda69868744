//! Per-feature standardization coefficients produced at training time.
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::types::FEATURE_COUNT;

/// Mean/scale pair for every model input, loaded once and shared read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct Scaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

/// On-disk layout of the scaler parameter artifact.
#[derive(Deserialize)]
struct ScalerFile {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl Scaler {
    /// Build from explicit coefficients. Both vectors must hold
    /// `FEATURE_COUNT` values that stay finite in `f32`, and no scale may
    /// narrow to zero.
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self> {
        let scaler = Self { mean, scale };
        scaler.validate()?;
        Ok(scaler)
    }

    /// The no-op scaler: mean 0, scale 1 for every feature.
    pub fn identity() -> Self {
        Self {
            mean: vec![0.0; FEATURE_COUNT],
            scale: vec![1.0; FEATURE_COUNT],
        }
    }

    /// Parse the `{"mean": [...], "scale": [...]}` parameter artifact.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: ScalerFile = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("malformed scaler parameters: {e}")))?;
        Self::new(file.mean, file.scale)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read scaler file {}: {e}", path.display()))
        })?;
        let scaler = Self::from_json_str(&json)?;
        info!("Loaded scaler parameters from {:?}", path);
        Ok(scaler)
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    /// Coefficients narrowed to single precision, in feature order.
    pub fn narrowed(&self) -> ([f32; FEATURE_COUNT], [f32; FEATURE_COUNT]) {
        let mut mean = [0.0f32; FEATURE_COUNT];
        let mut scale = [1.0f32; FEATURE_COUNT];
        for k in 0..FEATURE_COUNT {
            mean[k] = self.mean[k] as f32;
            scale[k] = self.scale[k] as f32;
        }
        (mean, scale)
    }

    fn validate(&self) -> Result<()> {
        if self.mean.len() != self.scale.len() {
            return Err(Error::Config(format!(
                "scaler mean has {} entries but scale has {}",
                self.mean.len(),
                self.scale.len()
            )));
        }
        if self.mean.len() != FEATURE_COUNT {
            return Err(Error::Config(format!(
                "scaler covers {} features, model expects {}",
                self.mean.len(),
                FEATURE_COUNT
            )));
        }
        // Standardization runs in single precision, so check the narrowed values.
        if let Some(k) = self.mean.iter().position(|&m| !(m as f32).is_finite()) {
            return Err(Error::Config(format!(
                "scaler mean[{k}] is not finite in single precision, got {}",
                self.mean[k]
            )));
        }
        if let Some(k) = self.scale.iter().position(|&s| {
            let narrowed = s as f32;
            !narrowed.is_finite() || narrowed == 0.0
        }) {
            return Err(Error::Config(format!(
                "scaler scale[{k}] must be finite and non-zero, got {}",
                self.scale[k]
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn coefficients(value: f64) -> String {
        serde_json::to_string(&vec![value; FEATURE_COUNT]).unwrap()
    }

    #[test]
    fn loads_parameter_file() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        write!(
            file,
            r#"{{"mean": {}, "scale": {}}}"#,
            coefficients(0.25),
            coefficients(2.0)
        )
        .unwrap();

        let scaler = Scaler::load(file.path()).unwrap();
        assert_eq!(scaler.mean(), &[0.25; FEATURE_COUNT]);
        assert_eq!(scaler.scale(), &[2.0; FEATURE_COUNT]);
    }

    #[test]
    fn rejects_length_mismatch() {
        let json = format!(r#"{{"mean": {}, "scale": [1.0, 2.0]}}"#, coefficients(0.0));
        let err = Scaler::from_json_str(&json).unwrap_err();
        assert!(matches!(err, Error::Config(_)), "{err}");
    }

    #[test]
    fn rejects_wrong_feature_count() {
        let err = Scaler::new(vec![0.0; 11], vec![1.0; 11]).unwrap_err();
        assert!(err.to_string().contains("11 features"), "{err}");
    }

    #[test]
    fn rejects_zero_scale() {
        let mut scale = vec![1.0; FEATURE_COUNT];
        scale[7] = 0.0;
        let err = Scaler::new(vec![0.0; FEATURE_COUNT], scale).unwrap_err();
        assert!(err.to_string().contains("scale[7]"), "{err}");
    }

    #[test]
    fn rejects_scale_that_underflows_single_precision() {
        let mut scale = vec![1.0; FEATURE_COUNT];
        scale[3] = 1e-50;
        let err = Scaler::new(vec![0.0; FEATURE_COUNT], scale).unwrap_err();
        assert!(err.to_string().contains("scale[3]"), "{err}");
    }

    #[test]
    fn rejects_mean_that_overflows_single_precision() {
        let mut mean = vec![0.0; FEATURE_COUNT];
        mean[12] = 1e300;
        let err = Scaler::new(mean, vec![1.0; FEATURE_COUNT]).unwrap_err();
        assert!(err.to_string().contains("mean[12]"), "{err}");
    }

    #[test]
    fn rejects_malformed_artifact() {
        assert!(matches!(
            Scaler::from_json_str(r#"{"mean": "oops"}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Scaler::load("/nonexistent/scaler_params.json"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn narrowing_keeps_feature_order() {
        let mean: Vec<f64> = (0..FEATURE_COUNT).map(|k| k as f64 * 0.5).collect();
        let scaler = Scaler::new(mean, vec![3.0; FEATURE_COUNT]).unwrap();
        let (mean, scale) = scaler.narrowed();
        assert_eq!(mean[17], 8.5);
        assert_eq!(scale[0], 3.0);
    }
}

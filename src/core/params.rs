use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::DEFAULT_BLOCK_ROWS;

/// Run configuration suitable for config files and the CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineParams {
    /// 11-band source raster
    pub input: PathBuf,
    /// Destination raster, created fresh
    pub output: PathBuf,
    /// XGBoost model saved as JSON
    pub model: PathBuf,
    /// Scaler parameters (`mean` / `scale` arrays)
    pub scaler: PathBuf,
    /// Rows per block
    pub block_rows: usize,
    /// Prediction threads; 0 uses every available core
    pub threads: usize,
    /// Feature value treated as missing by the model, besides NaN
    pub missing_value: Option<f32>,
    /// GDAL driver used to create the destination
    pub driver: String,
    /// GDAL configuration options applied once at startup
    pub gdal_options: Vec<(String, String)>,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            input: PathBuf::from("input.tif"),
            output: PathBuf::from("output_prediction.tif"),
            model: PathBuf::from("model/xgb_model.json"),
            scaler: PathBuf::from("model/scaler_params.json"),
            block_rows: DEFAULT_BLOCK_ROWS,
            threads: 0,
            missing_value: Some(-1.0),
            driver: "GTiff".to_string(),
            gdal_options: vec![("GTIFF_SRS_SOURCE".to_string(), "GEOKEYS".to_string())],
        }
    }
}

impl PipelineParams {
    /// Parse a config file without validating it, so callers can still
    /// override fields before calling [`PipelineParams::validate`].
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        serde_json::from_str(&json)
            .map_err(|e| Error::Config(format!("invalid config file {}: {e}", path.display())))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let params = Self::read(path)?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_rows == 0 {
            return Err(Error::InvalidArgument {
                arg: "block_rows",
                value: "0".into(),
            });
        }
        if self.driver.trim().is_empty() {
            return Err(Error::InvalidArgument {
                arg: "driver",
                value: self.driver.clone(),
            });
        }
        if self.input == self.output {
            return Err(Error::InvalidArgument {
                arg: "output",
                value: self.output.display().to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn partial_config_file_falls_back_to_defaults() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        write!(
            file,
            r#"{{"input": "scene.tif", "block_rows": 128, "gdal_options": [["GDAL_CACHEMAX", "512"]]}}"#
        )
        .unwrap();

        let params = PipelineParams::load(file.path()).unwrap();
        assert_eq!(params.input, PathBuf::from("scene.tif"));
        assert_eq!(params.block_rows, 128);
        assert_eq!(params.threads, 0);
        assert_eq!(params.missing_value, Some(-1.0));
        assert_eq!(
            params.gdal_options,
            vec![("GDAL_CACHEMAX".to_string(), "512".to_string())]
        );
    }

    #[test]
    fn read_defers_validation_to_load() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        write!(file, r#"{{"block_rows": 0}}"#).unwrap();

        assert_eq!(PipelineParams::read(file.path()).unwrap().block_rows, 0);
        assert!(matches!(
            PipelineParams::load(file.path()),
            Err(Error::InvalidArgument { arg: "block_rows", .. })
        ));
    }

    #[test]
    fn rejects_zero_block_rows() {
        let params = PipelineParams {
            block_rows: 0,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(Error::InvalidArgument { arg: "block_rows", .. })
        ));
    }

    #[test]
    fn rejects_output_overwriting_input() {
        let params = PipelineParams {
            output: PathBuf::from("input.tif"),
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }
}

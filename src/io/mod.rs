//! I/O layer: row-strip raster traits with GDAL and in-memory backends, and
//! the XGBoost model reader.
pub mod raster;
pub use raster::{BandReader, PredictionWriter};

pub mod gdal;
pub use self::gdal::{GdalBandReader, GdalContext, GdalEnvironment, GdalError, GdalPredictionWriter};

pub mod memory;
pub use memory::MemoryRaster;

pub mod xgboost;
pub use xgboost::{ModelError, XgbModel, XgbRegressor};

use gdal::errors::GdalError as GdalCrateError;
use gdal::{Dataset, DriverManager};
use gdal::raster::Buffer;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::error::Result;
use crate::io::raster::{BandReader, PredictionWriter};
use crate::types::RasterMetadata;

/// Errors encountered when talking to GDAL
#[derive(Debug, Error)]
pub enum GdalError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] GdalCrateError),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Band count mismatch: expected {expected}, found {found}")]
    BandCount { expected: usize, found: usize },
}

/// Process-wide GDAL settings, applied once before any dataset is opened.
#[derive(Debug, Clone, Default)]
pub struct GdalEnvironment {
    options: Vec<(String, String)>,
}

/// Proof that [`GdalEnvironment::initialize`] ran; required to open datasets.
#[derive(Debug)]
pub struct GdalContext {
    applied: Vec<(String, String)>,
}

impl GdalEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment used for GeoTIFF sources: spatial reference read from GeoKeys.
    pub fn geotiff_defaults() -> Self {
        Self::new().with_option("GTIFF_SRS_SOURCE", "GEOKEYS")
    }

    /// Set a GDAL configuration option. Later values for the same key win.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.options.retain(|(k, _)| *k != key);
        self.options.push((key, value.into()));
        self
    }

    pub fn options(&self) -> &[(String, String)] {
        &self.options
    }

    pub fn initialize(self) -> std::result::Result<GdalContext, GdalError> {
        for (key, value) in &self.options {
            gdal::config::set_config_option(key, value)?;
            debug!("GDAL config {}={}", key, value);
        }
        DriverManager::register_all();
        info!(
            "GDAL initialized with {} configuration option(s)",
            self.options.len()
        );
        Ok(GdalContext {
            applied: self.options,
        })
    }
}

impl GdalContext {
    pub fn applied_options(&self) -> &[(String, String)] {
        &self.applied
    }
}

/// Source raster read through GDAL, one band strip at a time
pub struct GdalBandReader {
    pub dataset: Dataset,
    pub metadata: RasterMetadata,
}

impl GdalBandReader {
    /// Open a GDAL-supported dataset and check it carries `expected_bands` bands.
    pub fn open<P: AsRef<Path>>(
        _ctx: &GdalContext,
        path: P,
        expected_bands: usize,
    ) -> std::result::Result<Self, GdalError> {
        let dataset = Dataset::open(path.as_ref())?;
        let (width, height) = dataset.raster_size();
        let band_count = dataset.raster_count() as usize;
        if band_count == 0 {
            return Err(GdalError::UnsupportedFormat("No raster bands found".into()));
        }
        if band_count != expected_bands {
            return Err(GdalError::BandCount {
                expected: expected_bands,
                found: band_count,
            });
        }
        let geotransform = dataset.geo_transform().ok();
        let projection = dataset.projection();
        info!(
            "Opened source {:?}: {}x{} pixels, {} bands",
            path.as_ref(),
            width,
            height,
            band_count
        );
        Ok(GdalBandReader {
            dataset,
            metadata: RasterMetadata {
                width,
                height,
                geotransform,
                projection,
                band_count,
            },
        })
    }
}

impl BandReader for GdalBandReader {
    fn metadata(&self) -> &RasterMetadata {
        &self.metadata
    }

    fn read_rows(
        &mut self,
        band: usize,
        row_start: usize,
        rows: usize,
        out: &mut [f32],
    ) -> Result<()> {
        let width = self.metadata.width;
        let raster_band = self.dataset.rasterband(band + 1).map_err(GdalError::from)?;
        raster_band
            .read_into_slice::<f32>(
                (0, row_start as isize),
                (width, rows),
                (width, rows),
                out,
                None,
            )
            .map_err(GdalError::from)?;
        Ok(())
    }
}

/// Single-band Float32 destination with the source's size and spatial reference
pub struct GdalPredictionWriter {
    pub dataset: Dataset,
    width: usize,
    scratch: Vec<f32>,
}

impl GdalPredictionWriter {
    /// Create a fresh dataset with `driver` and copy geotransform/projection
    /// from `source` before any pixels are written.
    pub fn create<P: AsRef<Path>>(
        _ctx: &GdalContext,
        driver: &str,
        path: P,
        source: &RasterMetadata,
    ) -> std::result::Result<Self, GdalError> {
        let driver = DriverManager::get_driver_by_name(driver)?;
        let mut dataset =
            driver.create_with_band_type::<f32, _>(path.as_ref(), source.width, source.height, 1)?;
        if let Some(gt) = source.geotransform {
            dataset.set_geo_transform(&gt)?;
        }
        if !source.projection.is_empty() {
            dataset.set_projection(&source.projection)?;
        }
        info!(
            "Created destination {:?}: {}x{} Float32",
            path.as_ref(),
            source.width,
            source.height
        );
        Ok(GdalPredictionWriter {
            dataset,
            width: source.width,
            scratch: Vec::new(),
        })
    }
}

impl PredictionWriter for GdalPredictionWriter {
    fn write_rows(&mut self, row_start: usize, rows: usize, values: &[f32]) -> Result<()> {
        // Buffer wants ownership; recycle the same allocation for every block
        let mut data = std::mem::take(&mut self.scratch);
        data.clear();
        data.extend_from_slice(values);
        let mut buf = Buffer::new((self.width, rows), data);
        let mut band = self.dataset.rasterband(1).map_err(GdalError::from)?;
        let written = band.write((0, row_start as isize), (self.width, rows), &mut buf);
        self.scratch = buf.into_shape_and_vec().1;
        written.map_err(GdalError::from)?;
        Ok(())
    }
}

//! Shared types and constants used across BANDCAST.
//! Includes the fixed band/feature counts, `RasterMetadata`, and the
//! `RowWindow` describing one horizontal strip of a raster.

/// Number of raw spectral bands the source raster must carry.
pub const BAND_COUNT: usize = 11;

/// Raw bands plus derived spectral indices fed to the model.
pub const FEATURE_COUNT: usize = 18;

/// Digital numbers are reflectance multiplied by this factor.
pub const REFLECTANCE_SCALE: f32 = 10_000.0;

/// Default strip height used by the streamer.
pub const DEFAULT_BLOCK_ROWS: usize = 300;

/// Spatial description of a raster, copied verbatim from source to destination.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterMetadata {
    /// Width (pixels) of the raster
    pub width: usize,
    /// Height (lines) of the raster
    pub height: usize,
    /// Affine geotransform coefficients ([origin_x, pixel_width, rot_x, origin_y, rot_y, pixel_height]),
    /// absent when the source carries none
    pub geotransform: Option<[f64; 6]>,
    /// Projection in WKT format, empty when unknown
    pub projection: String,
    /// Number of raster bands
    pub band_count: usize,
}

impl RasterMetadata {
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }
}

/// A contiguous run of rows `[row_start, row_start + rows)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RowWindow {
    pub index: usize,
    pub row_start: usize,
    pub rows: usize,
}

impl RowWindow {
    pub fn row_end(&self) -> usize {
        self.row_start + self.rows
    }

    pub fn pixel_count(&self, width: usize) -> usize {
        self.rows * width
    }
}

impl std::fmt::Display for RowWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "block {} [{}, {})",
            self.index,
            self.row_start,
            self.row_end()
        )
    }
}

//! Row-strip access to source and destination rasters.
//!
//! The streamer only ever asks for "N rows of one band starting at row R", so
//! any backend that can answer that (GDAL, memory) can drive a run.
use crate::error::Result;
use crate::types::RasterMetadata;

/// Multi-band source raster.
pub trait BandReader {
    fn metadata(&self) -> &RasterMetadata;

    /// Read `rows` full-width rows of 0-based `band` starting at `row_start`
    /// into `out`, converting samples to `f32`. `out.len()` equals
    /// `rows * width`.
    fn read_rows(&mut self, band: usize, row_start: usize, rows: usize, out: &mut [f32])
    -> Result<()>;
}

/// Single-band destination raster.
pub trait PredictionWriter {
    /// Write `rows` full-width rows starting at `row_start`.
    fn write_rows(&mut self, row_start: usize, rows: usize, values: &[f32]) -> Result<()>;
}

impl<R: BandReader + ?Sized> BandReader for &mut R {
    fn metadata(&self) -> &RasterMetadata {
        (**self).metadata()
    }

    fn read_rows(
        &mut self,
        band: usize,
        row_start: usize,
        rows: usize,
        out: &mut [f32],
    ) -> Result<()> {
        (**self).read_rows(band, row_start, rows, out)
    }
}

impl<W: PredictionWriter + ?Sized> PredictionWriter for &mut W {
    fn write_rows(&mut self, row_start: usize, rows: usize, values: &[f32]) -> Result<()> {
        (**self).write_rows(row_start, rows, values)
    }
}

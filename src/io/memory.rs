//! In-memory rasters for embedding the pipeline without GDAL datasets.
use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::io::raster::{BandReader, PredictionWriter};
use crate::types::RasterMetadata;

/// Band-major raster held in a single `Vec<f32>`.
///
/// Reads or writes starting at a row registered with [`MemoryRaster::fail_reads_at`]
/// or [`MemoryRaster::fail_writes_at`] return an error, which lets callers
/// rehearse partial failures.
#[derive(Debug, Clone)]
pub struct MemoryRaster {
    metadata: RasterMetadata,
    data: Vec<f32>,
    failing_reads: BTreeSet<usize>,
    failing_writes: BTreeSet<usize>,
}

impl MemoryRaster {
    /// Zero-filled raster with the given layout.
    pub fn new(metadata: RasterMetadata) -> Self {
        let len = metadata.pixel_count() * metadata.band_count;
        Self {
            metadata,
            data: vec![0.0; len],
            failing_reads: BTreeSet::new(),
            failing_writes: BTreeSet::new(),
        }
    }

    /// Build from per-band sample vectors, each `width * height` long.
    pub fn from_bands(
        width: usize,
        height: usize,
        geotransform: Option<[f64; 6]>,
        projection: &str,
        bands: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if let Some(b) = bands.iter().position(|band| band.len() != width * height) {
            return Err(Error::Dataset(format!(
                "band {} holds {} samples, expected {}x{}",
                b + 1,
                bands[b].len(),
                width,
                height
            )));
        }
        let metadata = RasterMetadata {
            width,
            height,
            geotransform,
            projection: projection.to_string(),
            band_count: bands.len(),
        };
        Ok(Self {
            metadata,
            data: bands.concat(),
            failing_reads: BTreeSet::new(),
            failing_writes: BTreeSet::new(),
        })
    }

    /// Single-band destination sharing `source`'s size and spatial reference.
    pub fn like(source: &RasterMetadata) -> Self {
        Self::new(RasterMetadata {
            band_count: 1,
            ..source.clone()
        })
    }

    pub fn fail_reads_at(&mut self, row_start: usize) -> &mut Self {
        self.failing_reads.insert(row_start);
        self
    }

    pub fn fail_writes_at(&mut self, row_start: usize) -> &mut Self {
        self.failing_writes.insert(row_start);
        self
    }

    /// Samples of 0-based `band`.
    pub fn band(&self, band: usize) -> &[f32] {
        let len = self.metadata.pixel_count();
        &self.data[band * len..(band + 1) * len]
    }

    fn check_window(&self, band: usize, row_start: usize, rows: usize, len: usize) -> Result<()> {
        if band >= self.metadata.band_count {
            return Err(Error::Dataset(format!("band index {} out of range", band + 1)));
        }
        if row_start + rows > self.metadata.height {
            return Err(Error::Dataset(format!(
                "rows [{}, {}) exceed raster height {}",
                row_start,
                row_start + rows,
                self.metadata.height
            )));
        }
        if len != rows * self.metadata.width {
            return Err(Error::Dataset(format!(
                "buffer holds {} samples for {} rows of width {}",
                len, rows, self.metadata.width
            )));
        }
        Ok(())
    }

    fn offset(&self, band: usize, row_start: usize) -> usize {
        band * self.metadata.pixel_count() + row_start * self.metadata.width
    }
}

impl BandReader for MemoryRaster {
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
        if self.failing_reads.contains(&row_start) {
            return Err(Error::Dataset(format!("injected read failure at row {row_start}")));
        }
        self.check_window(band, row_start, rows, out.len())?;
        let start = self.offset(band, row_start);
        out.copy_from_slice(&self.data[start..start + out.len()]);
        Ok(())
    }
}

impl PredictionWriter for MemoryRaster {
    fn write_rows(&mut self, row_start: usize, rows: usize, values: &[f32]) -> Result<()> {
        if self.failing_writes.contains(&row_start) {
            return Err(Error::Dataset(format!("injected write failure at row {row_start}")));
        }
        self.check_window(0, row_start, rows, values.len())?;
        let start = self.offset(0, row_start);
        self.data[start..start + values.len()].copy_from_slice(values);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_row_strip_of_requested_band() {
        let mut raster = MemoryRaster::from_bands(
            2,
            3,
            None,
            "",
            vec![vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![10.0; 6]],
        )
        .unwrap();
        let mut out = [0.0f32; 4];
        raster.read_rows(0, 1, 2, &mut out).unwrap();
        assert_eq!(out, [3.0, 4.0, 5.0, 6.0]);
        raster.read_rows(1, 0, 2, &mut out).unwrap();
        assert_eq!(out, [10.0; 4]);
    }

    #[test]
    fn rejects_rows_past_height() {
        let mut raster = MemoryRaster::from_bands(2, 3, None, "", vec![vec![0.0; 6]]).unwrap();
        let mut out = [0.0f32; 4];
        assert!(raster.read_rows(0, 2, 2, &mut out).is_err());
    }

    #[test]
    fn injected_failures_fire_only_at_their_row() {
        let source = RasterMetadata {
            width: 2,
            height: 4,
            geotransform: None,
            projection: String::new(),
            band_count: 1,
        };
        let mut raster = MemoryRaster::like(&source);
        raster.fail_writes_at(2);
        assert!(raster.write_rows(0, 2, &[1.0; 4]).is_ok());
        assert!(raster.write_rows(2, 2, &[2.0; 4]).is_err());
        assert_eq!(raster.band(0), &[1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
    }
}

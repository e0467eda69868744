//! Strip-by-strip driver: read bands, derive features, predict, write.
//!
//! Blocks run strictly one after another on the calling thread. All three
//! working buffers are sized for a full block once and reused, so peak memory
//! is bounded by `block_rows * width * BAND_COUNT` plus the feature matrix.
use ndarray::{ArrayView2, ArrayViewMut2};
use tracing::{debug, info, warn};

use crate::core::features::compute_features_into;
use crate::core::inference::{InferenceAdapter, Regressor};
use crate::core::scaler::Scaler;
use crate::error::{BlockIoError, BlockIoKind, Error, Result};
use crate::io::raster::{BandReader, PredictionWriter};
use crate::types::{BAND_COUNT, FEATURE_COUNT, RasterMetadata, RowWindow};

/// Iterator over the row windows covering `[0, height)`.
///
/// Every window has `block_rows` rows except the last, which is clipped to
/// the remaining height.
#[derive(Debug, Clone)]
pub struct BlockPlan {
    height: usize,
    block_rows: usize,
    next_row: usize,
    next_index: usize,
}

pub fn plan_blocks(height: usize, block_rows: usize) -> BlockPlan {
    assert!(block_rows > 0, "block height must be positive");
    BlockPlan {
        height,
        block_rows,
        next_row: 0,
        next_index: 0,
    }
}

impl Iterator for BlockPlan {
    type Item = RowWindow;

    fn next(&mut self) -> Option<RowWindow> {
        if self.next_row >= self.height {
            return None;
        }
        let window = RowWindow {
            index: self.next_index,
            row_start: self.next_row,
            rows: self.block_rows.min(self.height - self.next_row),
        };
        self.next_row += window.rows;
        self.next_index += 1;
        Some(window)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.height - self.next_row.min(self.height)).div_ceil(self.block_rows);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for BlockPlan {}

/// Emits each 10% milestone of total rows at most once, in increasing order.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    height: usize,
    last_decile: Option<u32>,
}

impl ProgressTracker {
    pub fn new(height: usize) -> Self {
        Self {
            height,
            last_decile: None,
        }
    }

    /// Percent milestones newly reached by a block starting at `row_start`.
    pub fn advance(&mut self, row_start: usize) -> Vec<u32> {
        if self.height == 0 {
            return Vec::new();
        }
        let decile = (row_start.min(self.height) * 10 / self.height) as u32;
        let first = match self.last_decile {
            None => 0,
            Some(last) if decile > last => last + 1,
            Some(_) => return Vec::new(),
        };
        self.last_decile = Some(decile);
        (first..=decile).map(|d| d * 10).collect()
    }
}

/// Stage the streamer is currently in.
///
/// Each block walks `Idle -> Reading -> FeatureExtracting -> Predicting ->
/// Writing` and returns to `Idle`, whether it was written or skipped. A
/// completed pass ends in `Done`; a fatal error leaves the failing stage.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StreamerState {
    Idle,
    Reading,
    FeatureExtracting,
    Predicting,
    Writing,
    Done,
}

/// Outcome of a full pass over the raster.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamReport {
    /// Blocks visited, including failed ones
    pub blocks: usize,
    /// Blocks whose predictions reached the destination
    pub blocks_written: usize,
    pub failed_blocks: Vec<BlockIoError>,
    pub milestones: Vec<u32>,
}

pub struct BlockStreamer {
    width: usize,
    height: usize,
    block_rows: usize,
    bands: Vec<f32>,
    features: Vec<f32>,
    predictions: Vec<f32>,
    state: StreamerState,
}

fn block_error(
    kind: BlockIoKind,
    window: RowWindow,
    band: Option<usize>,
    source: Error,
) -> Error {
    Error::BlockIo(BlockIoError {
        kind,
        block_index: window.index,
        row_start: window.row_start,
        rows: window.rows,
        band,
        message: source.to_string(),
    })
}

impl BlockStreamer {
    /// Allocate block buffers for a raster described by `metadata`.
    pub fn new(metadata: &RasterMetadata, block_rows: usize) -> Result<Self> {
        if block_rows == 0 {
            return Err(Error::InvalidArgument {
                arg: "block_rows",
                value: block_rows.to_string(),
            });
        }
        let buffered_rows = block_rows.min(metadata.height);
        let pixels = buffered_rows * metadata.width;
        debug!(
            "Allocating block buffers: {} rows x {} px ({} band samples, {} feature cells)",
            buffered_rows,
            metadata.width,
            pixels * BAND_COUNT,
            pixels * FEATURE_COUNT
        );
        Ok(Self {
            width: metadata.width,
            height: metadata.height,
            block_rows,
            bands: vec![0.0; pixels * BAND_COUNT],
            features: vec![0.0; pixels * FEATURE_COUNT],
            predictions: vec![0.0; pixels],
            state: StreamerState::Idle,
        })
    }

    pub fn state(&self) -> StreamerState {
        self.state
    }

    pub fn block_rows(&self) -> usize {
        self.block_rows
    }

    /// Stream every block of `reader` through the model into `writer`.
    ///
    /// Block read/write failures are logged and collected in the report;
    /// inference failures abort the pass immediately.
    pub fn run<R, W, M>(
        &mut self,
        reader: &mut R,
        writer: &mut W,
        scaler: &Scaler,
        adapter: &InferenceAdapter<M>,
    ) -> Result<StreamReport>
    where
        R: BandReader + ?Sized,
        W: PredictionWriter + ?Sized,
        M: Regressor,
    {
        let meta = reader.metadata();
        if meta.width != self.width || meta.height != self.height {
            return Err(Error::Dataset(format!(
                "reader is {}x{} but buffers were sized for {}x{}",
                meta.width, meta.height, self.width, self.height
            )));
        }

        let mut report = StreamReport::default();
        let mut progress = ProgressTracker::new(self.height);
        for window in plan_blocks(self.height, self.block_rows) {
            report.blocks += 1;
            match self.step(window, reader, writer, scaler, adapter)? {
                None => report.blocks_written += 1,
                Some(e) => report.failed_blocks.push(e),
            }
            for pct in progress.advance(window.row_start) {
                info!("Progress: {}%", pct);
                report.milestones.push(pct);
            }
        }
        self.state = StreamerState::Done;
        Ok(report)
    }

    /// Run one block and settle the state machine. A skipped block returns
    /// its error and leaves the streamer `Idle`; a fatal error leaves the
    /// state at the stage that failed.
    fn step<R, W, M>(
        &mut self,
        window: RowWindow,
        reader: &mut R,
        writer: &mut W,
        scaler: &Scaler,
        adapter: &InferenceAdapter<M>,
    ) -> Result<Option<BlockIoError>>
    where
        R: BandReader + ?Sized,
        W: PredictionWriter + ?Sized,
        M: Regressor,
    {
        match self.process_block(window, reader, writer, scaler, adapter) {
            Ok(()) => {
                self.state = StreamerState::Idle;
                Ok(None)
            }
            Err(Error::BlockIo(e)) => {
                warn!("Skipping {}: {}", window, e);
                self.state = StreamerState::Idle;
                Ok(Some(e))
            }
            Err(e) => Err(e),
        }
    }

    fn process_block<R, W, M>(
        &mut self,
        window: RowWindow,
        reader: &mut R,
        writer: &mut W,
        scaler: &Scaler,
        adapter: &InferenceAdapter<M>,
    ) -> Result<()>
    where
        R: BandReader + ?Sized,
        W: PredictionWriter + ?Sized,
        M: Regressor,
    {
        let n = window.pixel_count(self.width);

        self.state = StreamerState::Reading;
        for band in 0..BAND_COUNT {
            let slot = &mut self.bands[band * n..(band + 1) * n];
            reader
                .read_rows(band, window.row_start, window.rows, slot)
                .map_err(|e| block_error(BlockIoKind::Read, window, Some(band), e))?;
        }

        self.state = StreamerState::FeatureExtracting;
        let bands = ArrayView2::from_shape((BAND_COUNT, n), &self.bands[..BAND_COUNT * n])
            .map_err(|e| Error::Inference(format!("band block for {window}: {e}")))?;
        let mut features =
            ArrayViewMut2::from_shape((n, FEATURE_COUNT), &mut self.features[..n * FEATURE_COUNT])
                .map_err(|e| Error::Inference(format!("feature matrix for {window}: {e}")))?;
        compute_features_into(bands, scaler, features.view_mut());

        self.state = StreamerState::Predicting;
        let predictions = &mut self.predictions[..n];
        adapter.predict_into(features.view(), predictions)?;

        self.state = StreamerState::Writing;
        writer
            .write_rows(window.row_start, window.rows, predictions)
            .map_err(|e| block_error(BlockIoKind::Write, window, None, e))?;

        debug!("Wrote {}", window);
        Ok(())
    }
}

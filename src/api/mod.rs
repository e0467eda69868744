//! High-level entry points: load the model and scaler once, open the source,
//! create an aligned destination, stream every block, and release everything.
//! Prefer these over the low-level `core` modules when embedding BANDCAST.
use std::path::Path;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::core::inference::{InferenceAdapter, Regressor};
use crate::core::params::PipelineParams;
use crate::core::scaler::Scaler;
use crate::core::streamer::BlockStreamer;
use crate::error::{BlockIoError, Error, Result};
use crate::io::gdal::{GdalBandReader, GdalContext, GdalEnvironment, GdalPredictionWriter};
use crate::io::raster::{BandReader, PredictionWriter};
use crate::io::xgboost::XgbRegressor;
use crate::types::BAND_COUNT;

/// Summary of a finished run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub width: usize,
    pub height: usize,
    pub blocks: usize,
    pub blocks_written: usize,
    pub failed_blocks: Vec<BlockIoError>,
    pub milestones: Vec<u32>,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl RunReport {
    /// True when every block reached the destination.
    pub fn is_complete(&self) -> bool {
        self.failed_blocks.is_empty()
    }
}

/// Stream `reader` into `writer` with an already-loaded scaler and model.
pub fn run_with<R, W, M>(
    reader: &mut R,
    writer: &mut W,
    scaler: &Scaler,
    adapter: &InferenceAdapter<M>,
    block_rows: usize,
) -> Result<RunReport>
where
    R: BandReader + ?Sized,
    W: PredictionWriter + ?Sized,
    M: Regressor,
{
    let started_at = Utc::now();
    let clock = Instant::now();
    let meta = reader.metadata().clone();
    if meta.band_count != BAND_COUNT {
        return Err(Error::Dataset(format!(
            "source has {} bands, expected {}",
            meta.band_count, BAND_COUNT
        )));
    }

    let mut streamer = BlockStreamer::new(&meta, block_rows)?;
    let stream = streamer.run(reader, writer, scaler, adapter)?;

    let report = RunReport {
        width: meta.width,
        height: meta.height,
        blocks: stream.blocks,
        blocks_written: stream.blocks_written,
        failed_blocks: stream.failed_blocks,
        milestones: stream.milestones,
        started_at,
        elapsed: clock.elapsed(),
    };
    if report.is_complete() {
        info!(
            "Streamed {} blocks ({}x{}) in {:.2?}",
            report.blocks, report.width, report.height, report.elapsed
        );
    } else {
        warn!(
            "Streamed {} blocks ({}x{}) in {:.2?}; {} block(s) failed and were left unwritten",
            report.blocks,
            report.width,
            report.height,
            report.elapsed,
            report.failed_blocks.len()
        );
    }
    Ok(report)
}

/// Wires GDAL datasets, the scaler and the model together for one run.
pub struct Orchestrator {
    ctx: GdalContext,
    params: PipelineParams,
}

impl Orchestrator {
    pub fn new(ctx: GdalContext, params: PipelineParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { ctx, params })
    }

    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    /// Load the scaler and XGBoost model named in the params, then run.
    pub fn run(&self) -> Result<RunReport> {
        let scaler = Scaler::load(&self.params.scaler)?;
        let model = XgbRegressor::load(
            &self.params.model,
            self.params.threads,
            self.params.missing_value,
        )?;
        self.run_with_model(&scaler, model)
    }

    /// Run with a caller-supplied model. The model is dropped, and both
    /// datasets closed, before this returns on every path.
    pub fn run_with_model<M: Regressor>(&self, scaler: &Scaler, model: M) -> Result<RunReport> {
        let adapter = InferenceAdapter::new(model);
        let mut reader = open_source(&self.ctx, &self.params.input)?;
        let mut writer = GdalPredictionWriter::create(
            &self.ctx,
            &self.params.driver,
            &self.params.output,
            &reader.metadata,
        )
        .map_err(|e| {
            Error::Dataset(format!(
                "cannot create destination {}: {e}",
                self.params.output.display()
            ))
        })?;

        let result = run_with(
            &mut reader,
            &mut writer,
            scaler,
            &adapter,
            self.params.block_rows,
        );
        drop(writer);
        drop(reader);
        result
    }
}

fn open_source(ctx: &GdalContext, path: &Path) -> Result<GdalBandReader> {
    GdalBandReader::open(ctx, path, BAND_COUNT).map_err(|e| {
        Error::Dataset(format!("cannot open source raster {}: {e}", path.display()))
    })
}

/// Initialize GDAL from `params.gdal_options` and run the whole pipeline.
pub fn run_pipeline(params: &PipelineParams) -> Result<RunReport> {
    let env = params
        .gdal_options
        .iter()
        .fold(GdalEnvironment::new(), |env, (k, v)| env.with_option(k, v));
    let ctx = env.initialize().map_err(Error::config)?;
    Orchestrator::new(ctx, params.clone())?.run()
}

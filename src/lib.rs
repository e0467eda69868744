#![doc = r#"
BANDCAST: bounded-memory raster inference for multi-band reflectance imagery.

This crate turns an 11-band reflectance raster into a single-band Float32
prediction raster. It reads the source in fixed-height row blocks, derives 18
features per pixel (the scaled bands plus seven spectral indices), standardizes
them with training-time scaler parameters, scores each block in one batch with
a gradient-boosted regression model, and writes `exp(prediction)` to a
destination that shares the source's size, geotransform and projection.

Requirements
------------
- GDAL development headers and runtime available on your system.
- Rust 2024 edition toolchain.

Quick start: run the full pipeline
----------------------------------
```rust,no_run
use bandcast::{PipelineParams, run_pipeline};

fn main() -> bandcast::Result<()> {
    let params = PipelineParams {
        input: "scene.tif".into(),
        output: "prediction.tif".into(),
        model: "model/xgb_model.json".into(),
        scaler: "model/scaler_params.json".into(),
        block_rows: 300,
        threads: 0,
        ..Default::default()
    };

    let report = run_pipeline(&params)?;
    println!(
        "blocks={} written={} failed={}",
        report.blocks,
        report.blocks_written,
        report.failed_blocks.len()
    );
    Ok(())
}
```

Explicit GDAL initialization
----------------------------
GDAL configuration options are applied once, up front, and the resulting
context is handed to the orchestrator rather than read from global state.

```rust,no_run
use bandcast::{GdalEnvironment, Orchestrator, PipelineParams};

fn main() -> bandcast::Result<()> {
    let ctx = GdalEnvironment::geotiff_defaults()
        .with_option("GDAL_CACHEMAX", "512")
        .initialize()?;
    let report = Orchestrator::new(ctx, PipelineParams::default())?.run()?;
    assert!(report.is_complete());
    Ok(())
}
```

Bring your own model or rasters
-------------------------------
Anything implementing [`Regressor`] can score blocks, and anything
implementing [`BandReader`] / [`PredictionWriter`] can feed and receive them.

```rust
use bandcast::{
    BAND_COUNT, InferenceAdapter, MemoryRaster, Regressor, Scaler, run_with,
};
use ndarray::ArrayView2;

struct Constant(f32);

impl Regressor for Constant {
    fn num_features(&self) -> usize {
        bandcast::FEATURE_COUNT
    }

    fn predict_raw(&self, _: ArrayView2<'_, f32>, out: &mut [f32]) -> bandcast::Result<()> {
        out.fill(self.0);
        Ok(())
    }
}

fn main() -> bandcast::Result<()> {
    let bands = vec![vec![1200.0f32; 8 * 5]; BAND_COUNT];
    let mut src = MemoryRaster::from_bands(8, 5, None, "", bands)?;
    let mut dst = MemoryRaster::like(bandcast::BandReader::metadata(&src));
    let adapter = InferenceAdapter::new(Constant(0.0));

    let report = run_with(&mut src, &mut dst, &Scaler::identity(), &adapter, 2)?;
    assert_eq!(report.blocks, 3);
    assert!(dst.band(0).iter().all(|&v| v == 1.0));
    Ok(())
}
```

Error handling
--------------
All public functions return `bandcast::Result<T>`. Configuration, dataset and
inference errors are fatal. A block whose bands cannot be read, or whose
predictions cannot be written, is skipped and recorded in
[`RunReport::failed_blocks`] instead of failing the run.

Useful modules
--------------
- [`api`]: orchestration entry points.
- [`core`]: scaler, feature engine, inference adapter and block streamer.
- [`io`]: raster traits, GDAL and in-memory backends, XGBoost model reader.
- [`error`]: crate-level `Error` and `Result`.
"#]

pub mod api;
pub mod core;
pub mod error;
pub mod io;
pub mod types;

// Curated public API surface
// Types
pub use crate::core::params::PipelineParams;
pub use error::{BlockIoError, BlockIoKind, Error, Result};
pub use types::{BAND_COUNT, DEFAULT_BLOCK_ROWS, FEATURE_COUNT, RasterMetadata, RowWindow};

// Pipeline stages
pub use crate::core::features::{
    IndexFormula, SPECTRAL_INDICES, SpectralIndex, compute_features, compute_features_into,
};
pub use crate::core::inference::{InferenceAdapter, Regressor, inverse_link};
pub use crate::core::scaler::Scaler;
pub use crate::core::streamer::{BlockStreamer, ProgressTracker, StreamReport, plan_blocks};

// I/O
pub use io::{
    BandReader, GdalBandReader, GdalContext, GdalEnvironment, GdalError, GdalPredictionWriter,
    MemoryRaster, ModelError, PredictionWriter, XgbModel, XgbRegressor,
};

// High-level API re-exports
pub use api::{Orchestrator, RunReport, run_pipeline, run_with};

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "bandcast", version, about = "BANDCAST raster inference CLI")]
pub struct CliArgs {
    /// JSON run configuration; flags given on the command line override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Input 11-band raster
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Output prediction raster (created fresh)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// XGBoost model saved as JSON
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Scaler parameters JSON with `mean` and `scale` arrays
    #[arg(short, long)]
    pub scaler: Option<PathBuf>,

    /// Rows per processing block
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub block_rows: Option<u64>,

    /// Prediction threads (0 = all available cores)
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,

    /// Feature value the model treats as missing, besides NaN
    #[arg(long, allow_hyphen_values = true, conflicts_with = "no_missing")]
    pub missing: Option<f32>,

    /// Treat only NaN as missing
    #[arg(long, default_value_t = false)]
    pub no_missing: bool,

    /// GDAL driver for the output raster
    #[arg(long)]
    pub driver: Option<String>,

    /// Directory with GDAL support files (sets GDAL_DATA)
    #[arg(long)]
    pub gdal_data: Option<PathBuf>,

    /// Directory with PROJ support files (sets PROJ_LIB)
    #[arg(long)]
    pub proj_lib: Option<PathBuf>,

    /// Extra GDAL configuration option, KEY=VALUE (repeatable)
    #[arg(long = "gdal-option", value_name = "KEY=VALUE")]
    pub gdal_options: Vec<String>,

    /// Verbose (debug-level) logging
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}


use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use bandcast::{PipelineParams, run_pipeline};

use super::args::CliArgs;
use super::errors::AppError;

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn split_option(option: &str) -> Result<(String, String), AppError> {
    match option.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(AppError::InvalidGdalOption {
            option: option.to_string(),
        }),
    }
}

fn set_option(options: &mut Vec<(String, String)>, key: String, value: String) {
    options.retain(|(k, _)| *k != key);
    options.push((key, value));
}

/// Merge the optional config file with command-line overrides.
pub fn resolve_params(args: &CliArgs) -> Result<PipelineParams, AppError> {
    let mut params = match &args.config {
        Some(path) => PipelineParams::read(path)?,
        None => PipelineParams::default(),
    };

    if let Some(input) = &args.input {
        params.input = input.clone();
    }
    if let Some(output) = &args.output {
        params.output = output.clone();
    }
    if let Some(model) = &args.model {
        params.model = model.clone();
    }
    if let Some(scaler) = &args.scaler {
        params.scaler = scaler.clone();
    }
    if let Some(rows) = args.block_rows {
        params.block_rows =
            usize::try_from(rows).map_err(|_| AppError::BlockRowsOverflow { rows })?;
    }
    if let Some(threads) = args.threads {
        params.threads = threads;
    }
    if args.no_missing {
        params.missing_value = None;
    } else if let Some(missing) = args.missing {
        params.missing_value = Some(missing);
    }
    if let Some(driver) = &args.driver {
        params.driver = driver.clone();
    }
    if let Some(dir) = &args.gdal_data {
        set_option(
            &mut params.gdal_options,
            "GDAL_DATA".into(),
            dir.display().to_string(),
        );
    }
    if let Some(dir) = &args.proj_lib {
        set_option(
            &mut params.gdal_options,
            "PROJ_LIB".into(),
            dir.display().to_string(),
        );
    }
    for option in &args.gdal_options {
        let (key, value) = split_option(option)?;
        set_option(&mut params.gdal_options, key, value);
    }

    params.validate()?;
    Ok(params)
}

pub fn run(args: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(args.verbose);

    let params = resolve_params(&args)?;
    info!("Input: {:?}", params.input);
    info!("Output: {:?}", params.output);
    info!("Model: {:?}", params.model);
    info!("Scaler: {:?}", params.scaler);
    info!(
        "Block rows: {}, prediction threads: {}",
        params.block_rows,
        if params.threads == 0 {
            "all".to_string()
        } else {
            params.threads.to_string()
        }
    );

    match run_pipeline(&params) {
        Ok(report) => {
            for failure in &report.failed_blocks {
                warn!("Unwritten block: {}", failure);
            }
            if report.is_complete() {
                info!("[Success] Processing completed!");
            } else {
                info!(
                    "[Success] Processing completed with {} failed block(s)",
                    report.failed_blocks.len()
                );
            }
            Ok(())
        }
        Err(e) => {
            error!("Runtime Error: {}", e);
            Err(AppError::from(e).into())
        }
    }
}

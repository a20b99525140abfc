//! g2r: gridded forecast messages to target raster maps.
//!
//! Reads a message dump, aggregates the selected parameter in time,
//! interpolates every step onto the configured raster and writes one map
//! per output step.

mod dump;
mod raster;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use grid_common::{AttrValue, Criteria};
use intertable::InterpolationTableCache;
use pipeline::{Pipeline, RunConfig};

use dump::DumpReader;
use raster::RasterWriter;

#[derive(Parser, Debug)]
#[command(name = "g2r")]
#[command(about = "Convert gridded forecast messages to target raster maps")]
struct Args {
    /// Message dump to read (JSON, `.gz` for gzip)
    #[arg(short, long, env = "G2R_INPUT")]
    input: PathBuf,

    /// Run configuration (YAML); defaults and G2R_* variables otherwise
    #[arg(short, long, env = "G2R_CONFIG")]
    config: Option<PathBuf>,

    /// Parameter short name to convert
    #[arg(short, long)]
    short_name: Option<String>,

    /// Additional selection as key=value, comma-separated values match any
    #[arg(long = "select", value_parser = parse_key_value)]
    select: Vec<(String, String)>,

    /// First forecast hour of the output window
    #[arg(long)]
    tstart: Option<u32>,

    /// Last forecast hour of the output window
    #[arg(long)]
    tend: Option<u32>,

    /// Output directory for maps
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Directory of persisted interpolation tables
    #[arg(long)]
    table_dir: Option<PathBuf>,

    /// Worker threads for interpolation and aggregation
    #[arg(long, env = "G2R_THREADS")]
    threads: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() && !value.is_empty() => {
            Ok((key.to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}

/// Numbers select numerically, anything else by text.
fn attr_value(raw: &str) -> AttrValue {
    if let Ok(v) = raw.parse::<i64>() {
        AttrValue::from(v)
    } else if let Ok(v) = raw.parse::<f64>() {
        AttrValue::from(v)
    } else {
        AttrValue::from(raw)
    }
}

fn build_criteria(args: &Args) -> Criteria {
    let mut criteria = Criteria::new();
    if let Some(name) = &args.short_name {
        criteria = criteria.equals("shortName", name.as_str());
    }
    for (key, value) in &args.select {
        let values: Vec<AttrValue> = value.split(',').map(attr_value).collect();
        criteria = match values.len() {
            1 => criteria.equals(key.as_str(), values[0].clone()),
            _ => criteria.one_of(key.as_str(), values),
        };
    }
    criteria
}

fn load_config(args: &Args) -> Result<RunConfig> {
    let mut config = match &args.config {
        Some(path) => RunConfig::from_yaml_file(path)
            .with_context(|| format!("loading {}", path.display()))?
            .with_env(),
        None => RunConfig::from_env(),
    };

    if args.tstart.is_some() {
        config.time.tstart = args.tstart;
    }
    if args.tend.is_some() {
        config.time.tend = args.tend;
    }
    if let Some(dir) = &args.output_dir {
        config.output.dir = dir.clone();
    }
    if let Some(dir) = &args.table_dir {
        config.interpolation.table_dir = Some(dir.clone());
    }

    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    if args.json_logs {
        fmt().with_env_filter(filter).with_target(true).json().init();
    } else {
        fmt().with_env_filter(filter).with_target(true).init();
    }

    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("configuring worker threads")?;
    }

    let config = load_config(&args)?;
    let criteria = build_criteria(&args);
    info!(
        input = %args.input.display(),
        selection = %criteria,
        method = %config.interpolation.method,
        aggregation = ?config.aggregation,
        "Starting conversion"
    );

    let cache = match &config.interpolation.table_dir {
        Some(dir) => InterpolationTableCache::new(dir)
            .with_context(|| format!("opening table store {}", dir.display()))?,
        None => InterpolationTableCache::in_memory(),
    };

    let mut reader = DumpReader::open(&args.input)?;
    let mut writer = RasterWriter::new(&config.output)?;
    let pipeline = Pipeline::new(config, Arc::new(cache))?;

    let report = pipeline.run(&mut reader, &mut writer, &criteria)?;

    info!(
        maps = report.maps_written,
        first = %report.first_step.map(|s| s.to_string()).unwrap_or_default(),
        last = %report.last_step.map(|s| s.to_string()).unwrap_or_default(),
        resolution_switch = %report.resolution_switch.map(|s| s.to_string()).unwrap_or_default(),
        tables = report.tables.len(),
        output = %writer.dir().display(),
        "Conversion finished"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("level=500").unwrap(),
            ("level".to_string(), "500".to_string())
        );
        assert!(parse_key_value("level").is_err());
        assert!(parse_key_value("=500").is_err());
    }

    #[test]
    fn test_criteria_from_args() {
        let args = Args::parse_from([
            "g2r",
            "--input",
            "dump.json",
            "--short-name",
            "tp",
            "--select",
            "level=0,500",
            "--select",
            "dataType=fc",
        ]);
        let criteria = build_criteria(&args);

        let matches = |level: i64, data_type: &'static str| {
            criteria.matches(move |key: &str| match key {
                "shortName" => Some(AttrValue::from("tp")),
                "level" => Some(AttrValue::from(level)),
                "dataType" => Some(AttrValue::from(data_type)),
                _ => None,
            })
        };
        assert!(matches(500, "fc"));
        assert!(matches(0, "fc"));
        assert!(!matches(850, "fc"));
        assert!(!matches(500, "an"));
    }
}
